//! Volume adjustment.
//!
//! Multiplies every sample by a constant factor, saturating to the canonical
//! range and counting each saturation. A negative factor inverts phase.

use mezcla_core::{
    EffectError, EffectFlags, EffectHandler, FlowOutcome, FlowStatus, Placement, Sample, Started,
    round_clip,
};

/// Usage text for the `vol` effect.
pub const USAGE: &str = "FACTOR (linear gain; may be negative)";

/// Saturating volume adjustment.
#[derive(Debug, Clone)]
pub struct Vol {
    factor: f64,
    clips: u64,
}

impl Default for Vol {
    fn default() -> Self {
        Vol {
            factor: 1.0,
            clips: 0,
        }
    }
}

impl Vol {
    /// Create a volume effect with the given linear factor.
    pub fn new(factor: f64) -> Self {
        Vol { factor, clips: 0 }
    }
}

impl EffectHandler for Vol {
    fn name(&self) -> &'static str {
        "vol"
    }

    fn usage(&self) -> &'static str {
        USAGE
    }

    fn flags(&self) -> EffectFlags {
        EffectFlags::MULTICHAN
    }

    fn getopts(&mut self, args: &[String]) -> Result<(), EffectError> {
        match args {
            [factor] => {
                self.factor = factor
                    .parse()
                    .map_err(|_| EffectError::usage("vol", USAGE, "FACTOR is not a number"))?;
                if self.factor < 0.0 {
                    tracing::info!("volume adjustment is negative; this inverts phase");
                }
                Ok(())
            }
            _ => Err(EffectError::usage("vol", USAGE, "expected one argument")),
        }
    }

    fn start(&mut self, _placement: &Placement) -> Result<Started, EffectError> {
        self.clips = 0;
        if self.factor == 1.0 {
            return Ok(Started::NoOp);
        }
        Ok(Started::Ready)
    }

    fn flow(&mut self, input: &[Sample], output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        let n = input.len().min(output.len());
        for (out, &inp) in output[..n].iter_mut().zip(&input[..n]) {
            *out = round_clip(self.factor * inp as f64, &mut self.clips);
        }
        Ok(FlowOutcome {
            consumed: n,
            produced: n,
            status: FlowStatus::More,
        })
    }

    fn clips(&self) -> u64 {
        self.clips
    }

    fn duplicate(&self) -> Box<dyn EffectHandler> {
        Box::new(self.clone())
    }
}
