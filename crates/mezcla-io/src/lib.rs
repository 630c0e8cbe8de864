//! Audio I/O layer for the mezcla pipeline.
//!
//! This crate provides:
//!
//! - **The codec contract**: [`FormatHandler`], [`SampleReader`] and
//!   [`SampleWriter`], the uniform read/write/seek/close interface the
//!   scheduler drives
//! - **WAV files**: via `hound`, promoted to canonical 32-bit samples
//! - **Headerless RAW data**: every PCM width, float, µ-law and A-law,
//!   with byte/nibble/bit reversal
//! - **The null device**: `-n`, a phony source/sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mezcla_io::{open_read, resolve};
//!
//! let mut reader = open_read("input.wav", None, &SignalSpec::default())?;
//! let mut buf = vec![0i32; 8192];
//! let n = reader.read(&mut buf)?; // 0 = end of stream
//! ```

mod codec;
mod null;
mod raw;
mod wav;

pub use codec::{
    FormatFlags, FormatHandler, Instrument, LoopPoint, OutputSpec, SampleReader, SampleWriter,
    StreamInfo,
};
pub use null::NullFormat;
pub use raw::RawFormat;
pub use wav::WavFormat;

use mezcla_core::SignalSpec;

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No codec claims this file.
    #[error("`{0}': unknown file type; use -t to specify one")]
    UnknownFormat(String),

    /// The codec cannot express the requested parameters.
    #[error("{format}: {message}")]
    Unsupported {
        /// Codec name.
        format: &'static str,
        /// What was not supported.
        message: String,
    },

    /// A parameter the codec requires was not supplied.
    #[error("`{path}': {what} must be specified for this file type")]
    MissingParameter {
        /// File being opened.
        path: String,
        /// The missing parameter.
        what: &'static str,
    },

    /// The handle does not support seeking.
    #[error("`{0}': cannot seek on this input")]
    NotSeekable(String),

    /// The overwrite policy declined to replace an existing file.
    #[error("output file `{0}' already exists")]
    OverwriteDenied(String),

    /// WAV container error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The bundled format handlers, in resolution order.
pub fn formats() -> &'static [&'static dyn FormatHandler] {
    static WAV: WavFormat = WavFormat;
    static RAW: RawFormat = RawFormat;
    static NULL: NullFormat = NullFormat;
    static FORMATS: [&dyn FormatHandler; 3] = [&WAV, &RAW, &NULL];
    &FORMATS
}

/// Find a handler by registered name.
pub fn find_format(name: &str) -> Option<&'static dyn FormatHandler> {
    formats()
        .iter()
        .copied()
        .find(|f| f.names().contains(&name))
}

/// Resolve the handler for `path`: an explicit type hint wins, then the
/// special null name, then the file extension.
pub fn resolve(path: &str, type_hint: Option<&str>) -> Result<&'static dyn FormatHandler> {
    if let Some(hint) = type_hint {
        return find_format(hint).ok_or_else(|| Error::UnknownFormat(path.to_string()));
    }
    if path == "-n" {
        return Ok(find_format("null").expect("null format is bundled"));
    }
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    ext.as_deref()
        .and_then(find_format)
        .ok_or_else(|| Error::UnknownFormat(path.to_string()))
}

/// Open `path` for reading with the resolved handler.
pub fn open_read(
    path: &str,
    type_hint: Option<&str>,
    hints: &SignalSpec,
) -> Result<Box<dyn SampleReader>> {
    resolve(path, type_hint)?.open_read(path, hints)
}

/// Open `path` for writing with the resolved handler.
///
/// `overwrite` is consulted only when the target already exists as a
/// regular file; returning `false` aborts the open.
pub fn open_write(
    path: &str,
    type_hint: Option<&str>,
    spec: &OutputSpec,
    overwrite: &dyn Fn(&str) -> bool,
) -> Result<Box<dyn SampleWriter>> {
    let handler = resolve(path, type_hint)?;
    if !handler.flags().phony
        && path != "-"
        && std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
        && !overwrite(path)
    {
        return Err(Error::OverwriteDenied(path.to_string()));
    }
    handler.open_write(path, spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_type_hint() {
        let f = resolve("data.bin", Some("raw")).unwrap();
        assert!(f.names().contains(&"raw"));
    }

    #[test]
    fn resolve_by_extension() {
        assert!(resolve("x.wav", None).unwrap().names().contains(&"wav"));
        assert!(resolve("x.WAV", None).unwrap().names().contains(&"wav"));
        assert!(resolve("x.raw", None).unwrap().names().contains(&"raw"));
    }

    #[test]
    fn resolve_null_device() {
        let f = resolve("-n", None).unwrap();
        assert!(f.flags().phony);
    }

    #[test]
    fn resolve_unknown_fails() {
        assert!(resolve("mystery.xyz", None).is_err());
        assert!(resolve("noextension", None).is_err());
        assert!(resolve("x.wav", Some("nosuch")).is_err());
    }
}
