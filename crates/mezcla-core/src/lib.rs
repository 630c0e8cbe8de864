//! Mezcla Core - canonical sample model and effect contract
//!
//! This crate provides the foundational types shared by every stage of the
//! mezcla pipeline:
//!
//! # Core Abstractions
//!
//! ## Sample Model
//!
//! - [`Sample`] - the canonical signed 32-bit fixed-point sample used at
//!   every chain boundary
//! - [`round_clip`] - saturating conversion from `f64` with clip counting
//!
//! ## Signal Descriptors
//!
//! - [`SignalSpec`] - user-facing, partially-specified format description
//!   (rate, channels, sample size, encoding, byte/nibble/bit reversal)
//! - [`LogicalSignal`] - the resolved `(rate, channels)` pair describing the
//!   canonical stream between chain stages
//!
//! ## Effect Contract
//!
//! - [`EffectHandler`] - the plug-in trait every effect implements
//!   (`getopts` / `start` / `flow` / `drain` / `stop`)
//! - [`EffectFlags`] - capability bitset (`MULTICHAN`, `CHAN`, `RATE`, ...)
//! - [`Stage`] - one chain entry: a handler, its output buffer, and the
//!   `(olen, odone)` buffer-window bookkeeping
//!
//! # Design Principles
//!
//! - **Object-safe trait**: effects are driven through `dyn EffectHandler`
//!   so chains can be assembled at runtime from names
//! - **Explicit buffer windows**: a stage's consumable samples are exactly
//!   `obuf[odone..olen]`; the scheduler owns all movement

pub mod effect;
pub mod sample;
pub mod signal;
pub mod stage;

pub use effect::{
    EffectError, EffectFlags, EffectHandler, FlowOutcome, FlowStatus, Placement, Started,
};
pub use sample::{SAMPLE_MAX, SAMPLE_MIN, Sample, round_clip};
pub use signal::{Encoding, LogicalSignal, SampleSize, SignalSpec};
pub use stage::Stage;
