//! Mezcla Effects - bundled effect implementations
//!
//! This crate provides the effects shipped with the mezcla driver and a
//! small factory for creating them by command-line name:
//!
//! - [`Vol`] - saturating volume adjustment
//! - [`Trim`] - start/length windowing of the stream
//! - [`Mixer`] - channel-count conversion (the default channel converter)
//! - [`Resample`] - sample-rate conversion (the default rate converter)
//!
//! ## Example
//!
//! ```rust,ignore
//! use mezcla_effects::create;
//!
//! let mut vol = create("vol").unwrap();
//! vol.getopts(&["0.5".into()])?;
//! ```

pub mod mixer;
pub mod resample;
pub mod trim;
pub mod vol;

pub use mixer::Mixer;
pub use resample::Resample;
pub use trim::Trim;
pub use vol::Vol;

use mezcla_core::EffectHandler;

/// Describes a bundled effect for help listings.
#[derive(Debug, Clone, Copy)]
pub struct EffectDescriptor {
    /// Command-line name.
    pub name: &'static str,
    /// One-line usage text.
    pub usage: &'static str,
}

/// All bundled effects, in listing order.
pub fn all_effects() -> Vec<EffectDescriptor> {
    vec![
        EffectDescriptor {
            name: "mixer",
            usage: mixer::USAGE,
        },
        EffectDescriptor {
            name: "resample",
            usage: resample::USAGE,
        },
        EffectDescriptor {
            name: "trim",
            usage: trim::USAGE,
        },
        EffectDescriptor {
            name: "vol",
            usage: vol::USAGE,
        },
    ]
}

/// True if `name` names a bundled effect.
pub fn is_effect_name(name: &str) -> bool {
    create(name).is_some()
}

/// Create a bundled effect by name.
pub fn create(name: &str) -> Option<Box<dyn EffectHandler>> {
    match name {
        "vol" => Some(Box::new(Vol::default())),
        "trim" => Some(Box::new(Trim::default())),
        "mixer" => Some(Box::new(Mixer::default())),
        "resample" => Some(Box::new(Resample::default())),
        _ => None,
    }
}
