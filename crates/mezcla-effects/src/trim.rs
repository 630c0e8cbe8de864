//! Stream windowing.
//!
//! `trim START [LENGTH]` discards audio before `START` and, when `LENGTH`
//! is given, ends the stream after that much audio has passed. Positions are
//! `[[hh:]mm:]ss[.frac]` times or wide-sample counts with an `s` suffix.
//!
//! When trim is the first effect over a single seekable input, the scheduler
//! asks for the start offset via [`EffectHandler::seek_hint`] and satisfies
//! the skip with a codec seek instead of decoded reads.

use mezcla_core::{
    EffectError, EffectFlags, EffectHandler, FlowOutcome, FlowStatus, Placement, Sample, Started,
};

/// Usage text for the `trim` effect.
pub const USAGE: &str = "START [LENGTH] (times as [[hh:]mm:]ss[.frac], or sample counts as Ns)";

/// A position argument, before the signal's rate and channels are known.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    /// Wide-sample count (`123s`).
    Samples(u64),
    /// Seconds.
    Seconds(f64),
}

impl Position {
    /// Resolve to a raw (interleaved) sample count.
    fn resolve(self, rate: u32, channels: u32) -> u64 {
        let wide = match self {
            Position::Samples(n) => n,
            Position::Seconds(t) => (t * rate as f64).round() as u64,
        };
        wide * channels as u64
    }
}

/// Parse `[[hh:]mm:]ss[.frac]` or `Ns`.
fn parse_position(arg: &str) -> Result<Position, EffectError> {
    let bad = || EffectError::usage("trim", USAGE, format!("bad position `{arg}'"));

    if let Some(samples) = arg.strip_suffix('s') {
        return samples.parse().map(Position::Samples).map_err(|_| bad());
    }

    let mut seconds = 0.0;
    let parts: Vec<&str> = arg.split(':').collect();
    if parts.len() > 3 || parts.is_empty() {
        return Err(bad());
    }
    for part in &parts {
        if part.is_empty() {
            return Err(bad());
        }
        let v: f64 = part.parse().map_err(|_| bad())?;
        if v < 0.0 {
            return Err(bad());
        }
        seconds = seconds * 60.0 + v;
    }
    Ok(Position::Seconds(seconds))
}

/// Start/length windowing of the stream.
#[derive(Debug, Clone, Default)]
pub struct Trim {
    start: Option<Position>,
    length: Option<Position>,
    /// Raw samples still to discard before passing audio.
    skip_remaining: u64,
    /// Raw samples still to pass, when a length was given.
    pass_remaining: Option<u64>,
}

impl EffectHandler for Trim {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    fn flags(&self) -> EffectFlags {
        EffectFlags::MULTICHAN | EffectFlags::LENGTH
    }

    fn getopts(&mut self, args: &[String]) -> Result<(), EffectError> {
        match args {
            [start] => {
                self.start = Some(parse_position(start)?);
                self.length = None;
                Ok(())
            }
            [start, length] => {
                self.start = Some(parse_position(start)?);
                self.length = Some(parse_position(length)?);
                Ok(())
            }
            _ => Err(EffectError::usage(
                "trim",
                USAGE,
                "expected one or two arguments",
            )),
        }
    }

    fn start(&mut self, placement: &Placement) -> Result<Started, EffectError> {
        let sig = placement.input;
        let start = self
            .start
            .ok_or_else(|| EffectError::failed("trim", "no start position given"))?;
        self.skip_remaining = start.resolve(sig.rate, sig.channels);
        self.pass_remaining = self.length.map(|l| l.resolve(sig.rate, sig.channels));
        Ok(Started::Ready)
    }

    fn flow(&mut self, input: &[Sample], output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        let skip = (self.skip_remaining.min(input.len() as u64)) as usize;
        self.skip_remaining -= skip as u64;
        let input = &input[skip..];

        let mut n = input.len().min(output.len());
        if let Some(remaining) = self.pass_remaining {
            n = n.min(remaining as usize);
        }
        output[..n].copy_from_slice(&input[..n]);

        let status = match &mut self.pass_remaining {
            Some(remaining) => {
                *remaining -= n as u64;
                if *remaining == 0 {
                    FlowStatus::Eof
                } else {
                    FlowStatus::More
                }
            }
            None => FlowStatus::More,
        };
        Ok(FlowOutcome {
            consumed: skip + n,
            produced: n,
            status,
        })
    }

    fn duplicate(&self) -> Box<dyn EffectHandler> {
        Box::new(self.clone())
    }

    fn seek_hint(&self) -> Option<u64> {
        (self.skip_remaining > 0).then_some(self.skip_remaining)
    }

    fn clear_seek(&mut self) {
        self.skip_remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::LogicalSignal;

    fn started(args: &[&str], rate: u32, channels: u32) -> Trim {
        let mut trim = Trim::default();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        trim.getopts(&args).unwrap();
        let s = LogicalSignal::new(rate, channels);
        trim.start(&Placement {
            input: s,
            output: s,
        })
        .unwrap();
        trim
    }

    #[test]
    fn parses_time_forms() {
        assert_eq!(parse_position("10").unwrap(), Position::Seconds(10.0));
        assert_eq!(parse_position("0:30").unwrap(), Position::Seconds(30.0));
        assert_eq!(
            parse_position("1:02:03.5").unwrap(),
            Position::Seconds(3723.5)
        );
        assert_eq!(parse_position("441s").unwrap(), Position::Samples(441));
        assert!(parse_position("abc").is_err());
        assert!(parse_position("1:2:3:4").is_err());
        assert!(parse_position("").is_err());
    }

    #[test]
    fn skips_start_then_passes() {
        let mut trim = started(&["2s"], 8000, 1);
        let mut out = [0; 8];
        let o = trim.flow(&[10, 11, 12, 13], &mut out).unwrap();
        assert_eq!(o.consumed, 4);
        assert_eq!(o.produced, 2);
        assert_eq!(&out[..2], &[12, 13]);
        assert_eq!(o.status, FlowStatus::More);
    }

    #[test]
    fn skip_spans_multiple_blocks() {
        let mut trim = started(&["3s"], 8000, 1);
        let mut out = [0; 8];
        let o = trim.flow(&[1, 2], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (2, 0));
        let o = trim.flow(&[3, 4, 5], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (3, 2));
        assert_eq!(&out[..2], &[4, 5]);
    }

    #[test]
    fn length_limits_and_reports_eof() {
        let mut trim = started(&["1s", "2s"], 8000, 1);
        let mut out = [0; 8];
        let o = trim.flow(&[1, 2, 3, 4, 5, 6], &mut out).unwrap();
        assert_eq!(o.produced, 2);
        assert_eq!(&out[..2], &[2, 3]);
        assert_eq!(o.status, FlowStatus::Eof);
    }

    #[test]
    fn seconds_scale_by_rate_and_channels() {
        let trim = started(&["2"], 100, 2);
        // 2 seconds at 100 Hz stereo = 400 raw samples.
        assert_eq!(trim.seek_hint(), Some(400));
    }

    #[test]
    fn seek_hint_cleared_after_scheduler_seek() {
        let mut trim = started(&["5s"], 8000, 2);
        assert_eq!(trim.seek_hint(), Some(10));
        trim.clear_seek();
        assert_eq!(trim.seek_hint(), None);
        let mut out = [0; 4];
        let o = trim.flow(&[1, 2, 3, 4], &mut out).unwrap();
        // Nothing further skipped.
        assert_eq!(o.produced, 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn zero_start_needs_no_seek() {
        let trim = started(&["0"], 8000, 2);
        assert_eq!(trim.seek_hint(), None);
    }
}
