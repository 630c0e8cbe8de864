//! The effect plug-in contract.
//!
//! Every effect implements [`EffectHandler`]. The scheduler drives effects
//! exclusively through this trait:
//!
//! 1. `getopts` parses effect-specific arguments at chain-build time.
//! 2. `start` finalizes parameters from the effect's [`Placement`] in the
//!    chain; it may report [`Started::NoOp`] to have itself removed.
//! 3. `flow` consumes input samples and produces output samples, each up to
//!    the supplied slice capacities, reporting actual counts.
//! 4. `drain` emits buffered residue after the input stream ends.
//! 5. `stop` releases per-run state; final resource release is `Drop`.
//!
//! Default method implementations mirror the "nothing" handlers of classic
//! effect engines: `flow` is a passthrough copy, `drain` produces nothing.

use crate::sample::Sample;
use crate::signal::LogicalSignal;
use std::fmt;
use std::ops::BitOr;

/// Capability flags describing what an effect can do to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectFlags(u32);

impl EffectFlags {
    /// Handles interleaved multi-channel data directly; without this flag a
    /// multi-channel stream is split and the effect is run once per channel.
    pub const MULTICHAN: EffectFlags = EffectFlags(1 << 0);
    /// Changes the channel count. At most one per chain.
    pub const CHAN: EffectFlags = EffectFlags(1 << 1);
    /// Changes the sample rate.
    pub const RATE: EffectFlags = EffectFlags(1 << 2);
    /// Changes the stream length, making output length unpredictable.
    pub const LENGTH: EffectFlags = EffectFlags(1 << 3);
    /// Always a no-op; removed from every chain at start.
    pub const NULL: EffectFlags = EffectFlags(1 << 4);
    /// Deprecated; warns when used.
    pub const DEPRECATED: EffectFlags = EffectFlags(1 << 5);

    /// The empty flag set.
    pub fn empty() -> Self {
        EffectFlags(0)
    }

    /// True if every flag in `other` is set in `self`.
    pub fn contains(self, other: EffectFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EffectFlags {
    type Output = EffectFlags;

    fn bitor(self, rhs: EffectFlags) -> EffectFlags {
        EffectFlags(self.0 | rhs.0)
    }
}

/// Errors surfaced by effect handlers.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// Bad effect arguments; a usage error at the command line.
    #[error("{effect}: {message}\nusage: {effect} {usage}")]
    Usage {
        /// Effect name.
        effect: &'static str,
        /// What was wrong.
        message: String,
        /// The effect's usage string.
        usage: &'static str,
    },
    /// The effect cannot run in this configuration.
    #[error("{effect}: {message}")]
    Failed {
        /// Effect name.
        effect: &'static str,
        /// What went wrong.
        message: String,
    },
}

impl EffectError {
    /// Build a usage error for `effect`.
    pub fn usage(effect: &'static str, usage: &'static str, message: impl fmt::Display) -> Self {
        EffectError::Usage {
            effect,
            message: message.to_string(),
            usage,
        }
    }

    /// Build a runtime failure for `effect`.
    pub fn failed(effect: &'static str, message: impl fmt::Display) -> Self {
        EffectError::Failed {
            effect,
            message: message.to_string(),
        }
    }
}

/// Whether an effect has more output to give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// The effect will accept and/or produce more samples.
    More,
    /// The effect will not process any more samples; it becomes the chain's
    /// new pull point.
    Eof,
}

/// Result of one `flow` or `drain` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowOutcome {
    /// Input samples consumed.
    pub consumed: usize,
    /// Output samples produced.
    pub produced: usize,
    /// Whether the effect has reached end-of-stream.
    pub status: FlowStatus,
}

impl FlowOutcome {
    /// An outcome that consumed and produced nothing and has ended.
    pub fn eof() -> Self {
        FlowOutcome {
            consumed: 0,
            produced: 0,
            status: FlowStatus::Eof,
        }
    }
}

/// Where an effect sits in the chain: the resolved signals on either side.
///
/// For rate- and channel-changing effects the two sides differ; everything
/// else sees identical input and output signals.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    /// Signal entering the effect.
    pub input: LogicalSignal,
    /// Signal leaving the effect.
    pub output: LogicalSignal,
}

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// The effect is configured and will process samples.
    Ready,
    /// The effect is a no-op in this configuration and may be removed from
    /// the chain.
    NoOp,
}

/// The effect plug-in contract.
///
/// Implementations must be `Send` so chains can be handed to worker threads.
/// All methods other than `name`, `flags` and `duplicate` have defaults that
/// make a bare implementation a passthrough.
pub trait EffectHandler: Send {
    /// The effect's command-line name.
    fn name(&self) -> &'static str;

    /// One-line usage text for the effect's arguments.
    fn usage(&self) -> &'static str {
        ""
    }

    /// Capability flags.
    fn flags(&self) -> EffectFlags {
        EffectFlags::empty()
    }

    /// Parse effect-specific arguments. Called once, at chain-build time.
    fn getopts(&mut self, args: &[String]) -> Result<(), EffectError> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(EffectError::usage(
                self.name(),
                self.usage(),
                "takes no arguments",
            ))
        }
    }

    /// Finalize parameters from the effect's placement in the chain.
    fn start(&mut self, _placement: &Placement) -> Result<Started, EffectError> {
        Ok(Started::Ready)
    }

    /// Consume up to `input.len()` samples, produce up to `output.len()`.
    ///
    /// The default is a passthrough copy of as many samples as both slices
    /// allow.
    fn flow(&mut self, input: &[Sample], output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(FlowOutcome {
            consumed: n,
            produced: n,
            status: FlowStatus::More,
        })
    }

    /// Emit buffered residue after the input stream has ended.
    fn drain(&mut self, _output: &mut [Sample]) -> Result<FlowOutcome, EffectError> {
        Ok(FlowOutcome::eof())
    }

    /// Release per-run state. May still emit warnings.
    fn stop(&mut self) {}

    /// Saturations performed internally by this instance so far.
    fn clips(&self) -> u64 {
        0
    }

    /// Clone this instance, configuration included.
    ///
    /// Used to materialize the right-channel twin of a non-`MULTICHAN`
    /// effect, and to re-instantiate user effects when a chain is rebuilt
    /// between sequenced inputs. Called only before `start`.
    fn duplicate(&self) -> Box<dyn EffectHandler>;

    /// If this effect would begin by discarding input, the number of raw
    /// samples it wants skipped. The scheduler may satisfy the skip with a
    /// codec seek and then call [`clear_seek`](Self::clear_seek).
    fn seek_hint(&self) -> Option<u64> {
        None
    }

    /// The scheduler has performed the skip reported by `seek_hint`.
    fn clear_seek(&mut self) {}
}
