//! Channel-count conversion.
//!
//! The default channel converter inserted by the chain builder when the
//! combined input and the output disagree on channel count. Downmixing
//! averages source channels; upmixing duplicates them. With equal counts the
//! effect reports itself as a no-op and is removed from the chain.
//!
//! Supported conversions: any N to 1, 1 to any N, and stride conversions
//! where one count divides the other (e.g. 4 to 2 averages front/back
//! pairs, 2 to 4 duplicates each side).

use mezcla_core::{
    EffectError, EffectFlags, EffectHandler, FlowOutcome, FlowStatus, Placement, Sample, Started,
};

/// Usage text for the `mixer` effect.
pub const USAGE: &str = "(no arguments; channel counts come from the chain)";

/// Channel-count converter.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    in_channels: usize,
    out_channels: usize,
}

impl EffectHandler for Mixer {
    fn name(&self) -> &'static str {
        "mixer"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    fn flags(&self) -> EffectFlags {
        EffectFlags::MULTICHAN | EffectFlags::CHAN
    }

    fn start(&mut self, placement: &Placement) -> Result<Started, EffectError> {
        self.in_channels = placement.input.channels as usize;
        self.out_channels = placement.output.channels as usize;
        if self.in_channels == self.out_channels {
            return Ok(Started::NoOp);
        }
        if self.in_channels % self.out_channels != 0 && self.out_channels % self.in_channels != 0 {
            return Err(EffectError::failed(
                "mixer",
                format!(
                    "cannot convert {} channels to {}",
                    self.in_channels, self.out_channels
                ),
            ));
        }
        Ok(Started::Ready)
    }

    fn flow(&mut self, input: &[Sample], output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        let (ic, oc) = (self.in_channels, self.out_channels);
        let frames = (input.len() / ic).min(output.len() / oc);

        if ic > oc {
            // Average strided groups: out[c] = mean(in[c], in[c+oc], ...).
            let group = (ic / oc) as i64;
            for f in 0..frames {
                let inf = &input[f * ic..(f + 1) * ic];
                let outf = &mut output[f * oc..(f + 1) * oc];
                for (c, out) in outf.iter_mut().enumerate() {
                    let sum: i64 = inf.iter().skip(c).step_by(oc).map(|&s| s as i64).sum();
                    *out = (sum / group) as Sample;
                }
            }
        } else {
            for f in 0..frames {
                let inf = &input[f * ic..(f + 1) * ic];
                let outf = &mut output[f * oc..(f + 1) * oc];
                for (c, out) in outf.iter_mut().enumerate() {
                    *out = inf[c % ic];
                }
            }
        }

        Ok(FlowOutcome {
            consumed: frames * ic,
            produced: frames * oc,
            status: FlowStatus::More,
        })
    }

    fn duplicate(&self) -> Box<dyn EffectHandler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezcla_core::LogicalSignal;

    fn started(in_ch: u32, out_ch: u32) -> Mixer {
        let mut mixer = Mixer::default();
        let outcome = mixer
            .start(&Placement {
                input: LogicalSignal::new(44100, in_ch),
                output: LogicalSignal::new(44100, out_ch),
            })
            .unwrap();
        assert_eq!(outcome, Started::Ready);
        mixer
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut mixer = started(2, 1);
        let mut out = [0; 4];
        let o = mixer.flow(&[10, 20, -10, 30], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (4, 2));
        assert_eq!(&out[..2], &[15, 10]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mut mixer = started(1, 2);
        let mut out = [0; 6];
        let o = mixer.flow(&[7, 8, 9], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (3, 6));
        assert_eq!(out, [7, 7, 8, 8, 9, 9]);
    }

    #[test]
    fn quad_to_stereo_averages_front_back() {
        let mut mixer = started(4, 2);
        let mut out = [0; 2];
        let o = mixer.flow(&[10, 20, 30, 40], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (4, 2));
        // left = avg(ch0, ch2), right = avg(ch1, ch3)
        assert_eq!(out, [20, 30]);
    }

    #[test]
    fn partial_frames_are_left_unconsumed() {
        let mut mixer = started(2, 1);
        let mut out = [0; 8];
        let o = mixer.flow(&[1, 3, 5], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (2, 1));
    }

    #[test]
    fn output_space_limits_consumption() {
        let mut mixer = started(1, 2);
        let mut out = [0; 3];
        let o = mixer.flow(&[1, 2, 3, 4], &mut out).unwrap();
        assert_eq!((o.consumed, o.produced), (1, 2));
    }

    #[test]
    fn equal_channels_is_noop() {
        let mut mixer = Mixer::default();
        let sig = LogicalSignal::new(44100, 2);
        let outcome = mixer
            .start(&Placement {
                input: sig,
                output: sig,
            })
            .unwrap();
        assert_eq!(outcome, Started::NoOp);
    }

    #[test]
    fn incompatible_counts_fail_at_start() {
        let mut mixer = Mixer::default();
        let result = mixer.start(&Placement {
            input: LogicalSignal::new(44100, 3),
            output: LogicalSignal::new(44100, 2),
        });
        assert!(result.is_err());
    }
}
