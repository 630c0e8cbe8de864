//! Sample-rate conversion.
//!
//! The default rate converter inserted by the chain builder. A streaming
//! linear interpolator: a fractional read position advances through the
//! input by `in_rate / out_rate` per output sample. The effect processes a
//! single channel; on multi-channel streams the scheduler runs one instance
//! per channel through the stereo splitter.

use mezcla_core::{
    EffectError, EffectFlags, EffectHandler, FlowOutcome, FlowStatus, Placement, Sample, Started,
};

/// Usage text for the `resample` effect.
pub const USAGE: &str = "(no arguments; rates come from the chain)";

/// Streaming linear-interpolation rate converter.
#[derive(Debug, Clone, Default)]
pub struct Resample {
    /// Input samples advanced per output sample.
    step: f64,
    /// Fractional position between `x0` and the next input sample.
    frac: f64,
    /// The input sample at the current integer position.
    x0: Option<Sample>,
}

impl EffectHandler for Resample {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    fn flags(&self) -> EffectFlags {
        // Output length depends on the interpolator's phase, not just the
        // rate ratio, so predicted stream lengths stop being exact.
        EffectFlags::RATE | EffectFlags::LENGTH
    }

    fn start(&mut self, placement: &Placement) -> Result<Started, EffectError> {
        let (from, to) = (placement.input.rate, placement.output.rate);
        if from == 0 || to == 0 {
            return Err(EffectError::failed("resample", "sample rate must be positive"));
        }
        if from == to {
            return Ok(Started::NoOp);
        }
        self.step = from as f64 / to as f64;
        self.frac = 0.0;
        self.x0 = None;
        Ok(Started::Ready)
    }

    fn flow(&mut self, input: &[Sample], output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        let mut i = 0;
        let mut produced = 0;

        let mut x0 = match self.x0 {
            Some(x0) => x0,
            None => {
                if input.is_empty() {
                    return Ok(FlowOutcome {
                        consumed: 0,
                        produced: 0,
                        status: FlowStatus::More,
                    });
                }
                i = 1;
                input[0]
            }
        };

        while produced < output.len() {
            // Advance the integer position while the fraction has crossed it.
            let mut starved = false;
            while self.frac >= 1.0 {
                if i >= input.len() {
                    starved = true;
                    break;
                }
                x0 = input[i];
                i += 1;
                self.frac -= 1.0;
            }
            if starved || i >= input.len() {
                break;
            }
            let x1 = input[i];
            let v = x0 as f64 + self.frac * (x1 as f64 - x0 as f64);
            output[produced] = v.round() as Sample;
            produced += 1;
            self.frac += self.step;
        }

        self.x0 = Some(x0);
        Ok(FlowOutcome {
            consumed: i,
            produced,
            status: FlowStatus::More,
        })
    }

    fn drain(&mut self, output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        // The interpolator still owes output between the final input sample
        // and the end of the stream; hold the last sample flat.
        let mut produced = 0;
        if let Some(x0) = self.x0 {
            while self.frac < 1.0 && produced < output.len() {
                output[produced] = x0;
                produced += 1;
                self.frac += self.step;
            }
        }
        let status = if self.x0.is_none() || self.frac >= 1.0 {
            FlowStatus::Eof
        } else {
            FlowStatus::More
        };
        Ok(FlowOutcome {
            consumed: 0,
            produced,
            status,
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

    fn started(from: u32, to: u32) -> Resample {
        let mut r = Resample::default();
        let outcome = r
            .start(&Placement {
                input: LogicalSignal::new(from, 1),
                output: LogicalSignal::new(to, 1),
            })
            .unwrap();
        assert_eq!(outcome, Started::Ready);
        r
    }

    /// Push a whole signal through flow + drain, with a small output buffer
    /// to exercise the streaming paths.
    fn run_all(r: &mut Resample, input: &[Sample]) -> Vec<Sample> {
        let mut result = Vec::new();
        let mut consumed = 0;
        let mut out = [0; 7];
        while consumed < input.len() {
            let o = r.flow(&input[consumed..], &mut out).unwrap();
            consumed += o.consumed;
            result.extend_from_slice(&out[..o.produced]);
            assert!(o.consumed + o.produced > 0, "resample stalled");
        }
        loop {
            let o = r.drain(&mut out).unwrap();
            result.extend_from_slice(&out[..o.produced]);
            if o.status == FlowStatus::Eof {
                break;
            }
        }
        result
    }

    #[test]
    fn same_rate_is_noop() {
        let mut r = Resample::default();
        let sig = LogicalSignal::new(44100, 1);
        let outcome = r
            .start(&Placement {
                input: sig,
                output: sig,
            })
            .unwrap();
        assert_eq!(outcome, Started::NoOp);
    }

    #[test]
    fn downsample_halves_length() {
        let mut r = started(8000, 4000);
        let input: Vec<Sample> = (0..100).collect();
        let output = run_all(&mut r, &input);
        assert!((output.len() as i64 - 50).abs() <= 1, "got {}", output.len());
        // Every output lands on an even input position.
        for (k, &v) in output.iter().enumerate() {
            assert_eq!(v, 2 * k as Sample);
        }
    }

    #[test]
    fn upsample_doubles_length() {
        let mut r = started(4000, 8000);
        let input: Vec<Sample> = (0..50).map(|i| i * 10).collect();
        let output = run_all(&mut r, &input);
        assert!(
            (output.len() as i64 - 100).abs() <= 1,
            "got {}",
            output.len()
        );
        // Interpolated midpoints sit halfway between neighbours.
        assert_eq!(output[0], 0);
        assert_eq!(output[1], 5);
        assert_eq!(output[2], 10);
    }

    #[test]
    fn fractional_ratio_length() {
        let mut r = started(48000, 44100);
        let input: Vec<Sample> = vec![0; 48000];
        let output = run_all(&mut r, &input);
        assert!(
            (output.len() as i64 - 44100).abs() <= 2,
            "got {}",
            output.len()
        );
    }

    #[test]
    fn constant_signal_stays_constant() {
        let mut r = started(44100, 48000);
        let input = vec![12345; 4410];
        let output = run_all(&mut r, &input);
        assert!(output.iter().all(|&s| s == 12345));
    }
}
