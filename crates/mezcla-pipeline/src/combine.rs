//! Input combination methods and their compatibility rules.
//!
//! The combiner fuses N inputs into one logical stream:
//!
//! - `sequence`: one input after another, tearing the chain down between
//!   inputs; a seamless segue requires matching rate and channels.
//! - `concatenate`: end-to-end as a single stream; all inputs must match.
//! - `mix`: saturating per-channel sum; output channels = max over inputs.
//! - `merge`: channels side by side; output channels = sum over inputs.
//!
//! Compatibility is checked before the output file is opened, so a fatal
//! mismatch never creates an output.

use crate::input::InputFile;
use crate::{Error, Result};
use mezcla_core::LogicalSignal;

/// How multiple inputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMethod {
    /// Process inputs one after another, rebuilding the chain between them.
    Sequence,
    /// Process inputs end-to-end as one stream.
    #[default]
    Concatenate,
    /// Sum all inputs sample by sample.
    Mix,
    /// Interleave all inputs' channels side by side.
    Merge,
}

impl CombineMethod {
    /// True for the methods that read one input at a time.
    pub fn is_serial(self) -> bool {
        matches!(self, CombineMethod::Sequence | CombineMethod::Concatenate)
    }

    /// Minimum number of inputs the method makes sense with.
    pub fn min_inputs(self) -> usize {
        if self.is_serial() { 1 } else { 2 }
    }

    /// The method's command-line name.
    pub fn name(self) -> &'static str {
        match self {
            CombineMethod::Sequence => "sequence",
            CombineMethod::Concatenate => "concatenate",
            CombineMethod::Mix => "mix",
            CombineMethod::Merge => "merge",
        }
    }
}

/// The combiner's resolved output signal and length prediction.
#[derive(Debug, Clone, Copy)]
pub struct CombinedSignal {
    /// Signal entering the effects chain.
    pub signal: LogicalSignal,
    /// Predicted stream length in wide samples; 0 if unknown.
    pub wide_length: u64,
}

/// Check input compatibility for `method` and resolve the combined signal.
///
/// `current` is the input a serial run is positioned at. For parallel
/// methods every input participates and the rates must agree; `mix` with
/// differing channel counts only warns, `concatenate` mismatch is fatal.
pub fn combined_signal(
    method: CombineMethod,
    inputs: &[InputFile],
    current: usize,
) -> Result<CombinedSignal> {
    if method == CombineMethod::Sequence {
        let info = inputs[current].info();
        return Ok(CombinedSignal {
            signal: LogicalSignal::new(info.rate, info.channels),
            wide_length: 0,
        });
    }

    let mut total_channels = 0u32;
    let mut min_channels = u32::MAX;
    let mut max_channels = 0u32;
    let mut min_rate = u32::MAX;
    let mut max_rate = 0u32;
    let mut known_length = true;
    let mut wide_length = 0u64;

    for input in inputs {
        let info = input.info();
        total_channels += info.channels;
        min_channels = min_channels.min(info.channels);
        max_channels = max_channels.max(info.channels);
        min_rate = min_rate.min(info.rate);
        max_rate = max_rate.max(info.rate);
        known_length = known_length && info.length != 0;
        if method == CombineMethod::Concatenate {
            wide_length += info.wide_length();
        } else {
            wide_length = wide_length.max(info.wide_length());
        }
    }

    if min_rate != max_rate {
        return Err(Error::Usage(
            "input files must have the same sample rate".to_string(),
        ));
    }
    if min_channels != max_channels {
        match method {
            CombineMethod::Concatenate => {
                return Err(Error::Usage(
                    "input files must have the same number of channels".to_string(),
                ));
            }
            CombineMethod::Mix => {
                tracing::warn!("input files don't have the same number of channels");
            }
            _ => {}
        }
    }

    let channels = if method == CombineMethod::Merge {
        total_channels
    } else {
        max_channels
    };
    Ok(CombinedSignal {
        signal: LogicalSignal::new(max_rate, channels),
        wide_length: if known_length { wide_length } else { 0 },
    })
}

/// Whether a serial run may splice seamlessly from input `i - 1` into
/// input `i`: rate and channel count must agree.
pub fn can_segue(inputs: &[InputFile], i: usize) -> bool {
    let a = inputs[i - 1].info();
    let b = inputs[i].info();
    a.channels == b.channels && a.rate == b.rate
}
