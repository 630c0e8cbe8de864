//! Mezcla Pipeline - the pull-based effects engine
//!
//! This crate orchestrates sample flow from inputs to output:
//!
//! ```text
//! Inputs[0..N) -> per-input balance -> Combiner -> Effect[1] .. Effect[M-1] -> Output
//! ```
//!
//! # Components
//!
//! - [`InputFile`] / [`OutputFile`] - file records with per-file options
//! - [`CombineMethod`] - sequence / concatenate / mix / merge semantics
//! - [`chain`] - chain assembly with automatic rate/channel conversion
//! - [`Scheduler`] - the backwards-pull flow loop with its drain phase
//! - [`Signals`] - abort and skip flags, polled cooperatively
//! - [`Run`] - one invocation's worth of state, from open to cleanup
//!
//! The scheduler is single-threaded and cooperative: samples move only when
//! a stage pulls from its predecessor, and every suspension point is a codec
//! read, a codec write, or an effect `flow`/`drain` call.

pub mod chain;
pub mod combine;
pub mod input;
pub mod run;
pub mod scheduler;
pub mod signals;
pub mod status;

pub use chain::Chain;
pub use combine::{CombineMethod, CombinedSignal};
pub use input::InputFile;
pub use run::{GlobalInfo, OutputFile, PlotMode, ReplayGainMode, Run, RunOutcome};
pub use scheduler::Scheduler;
pub use signals::Signals;
pub use status::Status;

/// Errors raised while assembling or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mistake in how the run was specified.
    #[error("{0}")]
    Usage(String),

    /// Opening or operating on a file failed.
    #[error(transparent)]
    Io(#[from] mezcla_io::Error),

    /// An effect reported a failure.
    #[error(transparent)]
    Effect(#[from] mezcla_core::EffectError),

    /// Livelock protection: an effect consumed and produced nothing.
    #[error("effect `{0}' took and gave no samples")]
    EffectStalled(&'static str),

    /// The left and right twins of a split effect disagreed.
    #[error("effect `{0}': left and right channels produced different sample counts")]
    SplitMismatch(&'static str),

    /// The output sink failed; the run stops without draining.
    #[error("error writing output: {0}")]
    Write(String),
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
