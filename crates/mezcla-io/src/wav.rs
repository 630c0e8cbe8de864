//! WAV file reading and writing, via `hound`.
//!
//! Container samples are promoted to canonical 32-bit on read by shifting
//! into the high bits, and narrowed on write with rounding; narrowing
//! overflow at the positive rail is counted as an output clip.

use crate::codec::{
    FormatFlags, FormatHandler, OutputSpec, SampleReader, SampleWriter, StreamInfo,
};
use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use mezcla_core::{Encoding, Sample, SampleSize, SignalSpec, round_clip};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};

/// The WAV format handler.
pub struct WavFormat;

impl FormatHandler for WavFormat {
    fn names(&self) -> &'static [&'static str] {
        &["wav", "wave"]
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags {
            seekable: true,
            ..FormatFlags::default()
        }
    }

    fn open_read(&self, path: &str, hints: &SignalSpec) -> Result<Box<dyn SampleReader>> {
        if hints.rate.is_some() || hints.channels.is_some() {
            tracing::debug!("wav: rate/channel hints are ignored; the header decides");
        }
        let (source, seekable) = if path == "-" {
            let stdin: Box<dyn Read + Send> = Box::new(std::io::stdin());
            (WavSource::Stream(WavReader::new(stdin)?), false)
        } else {
            (WavSource::File(WavReader::open(path)?), true)
        };
        let spec = match &source {
            WavSource::File(r) => r.spec(),
            WavSource::Stream(r) => r.spec(),
        };
        let length = match &source {
            WavSource::File(r) => r.len() as u64,
            WavSource::Stream(r) => r.len() as u64,
        };
        let (size, encoding) = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => (SampleSize::DWord, Encoding::Float),
            (SampleFormat::Int, 8) => (SampleSize::Byte, Encoding::Unsigned),
            (SampleFormat::Int, 16) => (SampleSize::Word, Encoding::Signed),
            (SampleFormat::Int, 24) => (SampleSize::Bytes3, Encoding::Signed),
            (SampleFormat::Int, 32) => (SampleSize::DWord, Encoding::Signed),
            (format, bits) => {
                return Err(Error::Unsupported {
                    format: "wav",
                    message: format!("unsupported sample format {format:?} at {bits} bits"),
                });
            }
        };
        Ok(Box::new(WavReadHandle {
            path: path.to_string(),
            info: StreamInfo {
                rate: spec.sample_rate,
                channels: spec.channels as u32,
                size,
                encoding,
                length,
                seekable,
            },
            source,
            clips: 0,
        }))
    }

    fn open_write(&self, path: &str, spec: &OutputSpec) -> Result<Box<dyn SampleWriter>> {
        if path == "-" {
            return Err(Error::Unsupported {
                format: "wav",
                message: "cannot write WAV to standard output (the header must be patched)"
                    .to_string(),
            });
        }
        let (bits, format) = match (spec.encoding, spec.size) {
            (Encoding::Float, SampleSize::DWord) => (32, SampleFormat::Float),
            (Encoding::Unsigned, SampleSize::Byte) => (8, SampleFormat::Int),
            (Encoding::Signed, SampleSize::Word) => (16, SampleFormat::Int),
            (Encoding::Signed, SampleSize::Bytes3) => (24, SampleFormat::Int),
            (Encoding::Signed, SampleSize::DWord) => (32, SampleFormat::Int),
            (encoding, size) => {
                return Err(Error::Unsupported {
                    format: "wav",
                    message: format!(
                        "cannot encode {} at {} bytes per sample",
                        encoding.name(),
                        size.bytes()
                    ),
                });
            }
        };
        if spec.reverse_bytes == Some(true)
            || spec.reverse_nibbles == Some(true)
            || spec.reverse_bits == Some(true)
        {
            return Err(Error::Unsupported {
                format: "wav",
                message: "WAV data is always little-endian".to_string(),
            });
        }
        let hspec = hound::WavSpec {
            channels: spec.channels as u16,
            sample_rate: spec.rate,
            bits_per_sample: bits,
            sample_format: format,
        };
        let writer = WavWriter::create(path, hspec)?;
        Ok(Box::new(WavWriteHandle {
            info: StreamInfo {
                rate: spec.rate,
                channels: spec.channels,
                size: spec.size,
                encoding: spec.encoding,
                length: 0,
                seekable: true,
            },
            writer: Some(writer),
            bits: bits as u32,
            float: format == SampleFormat::Float,
            clips: 0,
        }))
    }
}

enum WavSource {
    File(WavReader<BufReader<File>>),
    Stream(WavReader<Box<dyn Read + Send>>),
}

struct WavReadHandle {
    path: String,
    info: StreamInfo,
    source: WavSource,
    clips: u64,
}

impl WavReadHandle {
    fn read_int<R: Read>(
        reader: &mut WavReader<R>,
        buf: &mut [Sample],
        shift: u32,
    ) -> Result<usize> {
        let mut n = 0;
        let mut samples = reader.samples::<i32>();
        while n < buf.len() {
            match samples.next() {
                Some(Ok(v)) => {
                    buf[n] = v << shift;
                    n += 1;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Ok(n)
    }

    fn read_float<R: Read>(
        reader: &mut WavReader<R>,
        buf: &mut [Sample],
        clips: &mut u64,
    ) -> Result<usize> {
        let mut n = 0;
        let mut samples = reader.samples::<f32>();
        while n < buf.len() {
            match samples.next() {
                Some(Ok(v)) => {
                    buf[n] = round_clip(v as f64 * -(Sample::MIN as f64), clips);
                    n += 1;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Ok(n)
    }
}

impl SampleReader for WavReadHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [Sample]) -> Result<usize> {
        let shift = 32 - self.info.size.bits();
        match (&mut self.source, self.info.encoding) {
            (WavSource::File(r), Encoding::Float) => {
                Self::read_float(r, buf, &mut self.clips)
            }
            (WavSource::File(r), _) => Self::read_int(r, buf, shift),
            (WavSource::Stream(r), Encoding::Float) => {
                Self::read_float(r, buf, &mut self.clips)
            }
            (WavSource::Stream(r), _) => Self::read_int(r, buf, shift),
        }
    }

    fn seek(&mut self, wide_offset: u64) -> Result<()> {
        match &mut self.source {
            WavSource::File(r) => {
                r.seek(wide_offset as u32)?;
                Ok(())
            }
            WavSource::Stream(_) => Err(Error::NotSeekable(self.path.clone())),
        }
    }

    fn clips(&self) -> u64 {
        self.clips
    }
}

struct WavWriteHandle {
    info: StreamInfo,
    writer: Option<WavWriter<BufWriter<File>>>,
    bits: u32,
    float: bool,
    clips: u64,
}

/// Narrow a canonical sample to `bits` with rounding; overflow at the
/// positive rail saturates and counts as a clip.
fn narrow_round(s: Sample, bits: u32, clips: &mut u64) -> i32 {
    let shift = 32 - bits;
    if shift == 0 {
        return s;
    }
    let half = 1i32 << (shift - 1);
    match s.checked_add(half) {
        Some(v) => v >> shift,
        None => {
            *clips += 1;
            Sample::MAX >> shift
        }
    }
}

impl SampleWriter for WavWriteHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn write(&mut self, buf: &[Sample]) -> Result<usize> {
        let writer = self.writer.as_mut().ok_or_else(|| Error::Unsupported {
            format: "wav",
            message: "write after finalize".to_string(),
        })?;
        for &s in buf {
            if self.float {
                writer.write_sample(s as f32 / -(Sample::MIN as f32))?;
            } else if self.bits == 8 {
                writer.write_sample(narrow_round(s, 8, &mut self.clips) as i8)?;
            } else {
                writer.write_sample(narrow_round(s, self.bits, &mut self.clips))?;
            }
        }
        self.info.length += buf.len() as u64;
        Ok(buf.len())
    }

    fn clips(&self) -> u64 {
        self.clips
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}
