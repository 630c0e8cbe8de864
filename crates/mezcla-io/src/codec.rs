//! The codec contract.
//!
//! A format handler registers names and capability flags and opens handles.
//! Open handles speak canonical samples only; all container conversion
//! happens behind [`SampleReader::read`] and [`SampleWriter::write`].

use crate::Result;
use mezcla_core::{Encoding, Sample, SampleSize, SignalSpec};

/// Format-level capability flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatFlags {
    /// The format talks to an audio device rather than a file.
    pub device: bool,
    /// Handles of this format can seek.
    pub seekable: bool,
    /// The format produces no real output (null device).
    pub phony: bool,
    /// The format bypasses standard file I/O.
    pub no_stdio: bool,
}

/// Resolved stream parameters on an open handle.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Container sample width.
    pub size: SampleSize,
    /// Container sample encoding.
    pub encoding: Encoding,
    /// Total length in raw samples; 0 if unknown.
    pub length: u64,
    /// Whether this handle supports `seek`.
    pub seekable: bool,
}

impl StreamInfo {
    /// Length in wide samples (frames); 0 if unknown.
    pub fn wide_length(&self) -> u64 {
        if self.channels == 0 {
            0
        } else {
            self.length / self.channels as u64
        }
    }
}

/// A loop region carried in container metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopPoint {
    /// First sample of the loop.
    pub start: u64,
    /// Loop length in samples.
    pub length: u64,
    /// Repeat count; 0 = forever.
    pub count: u32,
    /// Container-specific loop type.
    pub kind: u8,
}

/// Instrument metadata carried by some containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Instrument {
    /// MIDI note of the recorded pitch.
    pub midi_note: i8,
    /// Low velocity bound.
    pub midi_low: i8,
    /// High velocity bound.
    pub midi_high: i8,
}

/// Everything a codec needs to open an output handle.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Container sample width.
    pub size: SampleSize,
    /// Container sample encoding.
    pub encoding: Encoding,
    /// Byte-order reversal relative to the format default (tri-state).
    pub reverse_bytes: Option<bool>,
    /// Nibble-order reversal (tri-state).
    pub reverse_nibbles: Option<bool>,
    /// Bit-order reversal (tri-state).
    pub reverse_bits: Option<bool>,
    /// Compression factor, for formats that use one.
    pub compression: Option<f64>,
    /// Comment text to embed, if the container can.
    pub comment: Option<String>,
    /// Expected length in wide samples; 0 if unknown.
    pub length_hint: u64,
    /// Loop metadata to carry over.
    pub loops: Vec<LoopPoint>,
    /// Instrument metadata to carry over.
    pub instrument: Option<Instrument>,
}

/// A registered file format.
pub trait FormatHandler: Sync {
    /// Names this format answers to (type hints and extensions).
    fn names(&self) -> &'static [&'static str];

    /// Capability flags.
    fn flags(&self) -> FormatFlags;

    /// Open `path` for reading. `hints` may override or supply parameters
    /// the container cannot provide. `-` means standard input.
    fn open_read(&self, path: &str, hints: &SignalSpec) -> Result<Box<dyn SampleReader>>;

    /// Open `path` for writing. `-` means standard output.
    fn open_write(&self, path: &str, spec: &OutputSpec) -> Result<Box<dyn SampleWriter>>;
}

/// An open input handle.
pub trait SampleReader: Send {
    /// Resolved stream parameters.
    fn info(&self) -> &StreamInfo;

    /// Container comment text, if any.
    fn comment(&self) -> Option<&str> {
        None
    }

    /// Loop metadata, if any.
    fn loops(&self) -> &[LoopPoint] {
        &[]
    }

    /// Instrument metadata, if any.
    fn instrument(&self) -> Option<Instrument> {
        None
    }

    /// Read up to `buf.len()` canonical samples. Returns the number read;
    /// 0 means end of stream.
    fn read(&mut self, buf: &mut [Sample]) -> Result<usize>;

    /// Seek to an absolute wide-sample offset.
    fn seek(&mut self, wide_offset: u64) -> Result<()>;

    /// Saturations performed converting container samples so far.
    fn clips(&self) -> u64 {
        0
    }
}

/// An open output handle.
pub trait SampleWriter: Send {
    /// Resolved stream parameters.
    fn info(&self) -> &StreamInfo;

    /// Write `buf` canonical samples. Returns the number written; 0 or an
    /// error means the sink has failed.
    fn write(&mut self, buf: &[Sample]) -> Result<usize>;

    /// Saturations performed converting to container samples so far.
    fn clips(&self) -> u64 {
        0
    }

    /// Flush and complete the container. Must be called before drop for the
    /// output to be valid.
    fn finalize(&mut self) -> Result<()>;
}
