//! The null device.
//!
//! `-n` on the command line. Reading yields immediate end-of-stream;
//! writing swallows everything. Phony: no file is created and nothing is
//! ever unlinked.

use crate::codec::{
    FormatFlags, FormatHandler, OutputSpec, SampleReader, SampleWriter, StreamInfo,
};
use crate::{Error, Result};
use mezcla_core::{Encoding, Sample, SampleSize, SignalSpec};

/// The null format handler.
pub struct NullFormat;

impl FormatHandler for NullFormat {
    fn names(&self) -> &'static [&'static str] {
        &["null"]
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags {
            phony: true,
            no_stdio: true,
            ..FormatFlags::default()
        }
    }

    fn open_read(&self, _path: &str, hints: &SignalSpec) -> Result<Box<dyn SampleReader>> {
        Ok(Box::new(NullHandle {
            info: StreamInfo {
                rate: hints.rate.unwrap_or(44100),
                channels: hints.channels.unwrap_or(2),
                size: hints.size.unwrap_or(SampleSize::DWord),
                encoding: hints.encoding.unwrap_or(Encoding::Signed),
                length: 0,
                seekable: false,
            },
        }))
    }

    fn open_write(&self, _path: &str, spec: &OutputSpec) -> Result<Box<dyn SampleWriter>> {
        Ok(Box::new(NullHandle {
            info: StreamInfo {
                rate: spec.rate,
                channels: spec.channels,
                size: spec.size,
                encoding: spec.encoding,
                length: 0,
                seekable: false,
            },
        }))
    }
}

struct NullHandle {
    info: StreamInfo,
}

impl SampleReader for NullHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read(&mut self, _buf: &mut [Sample]) -> Result<usize> {
        Ok(0)
    }

    fn seek(&mut self, _wide_offset: u64) -> Result<()> {
        Err(Error::NotSeekable("-n".to_string()))
    }
}

impl SampleWriter for NullHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn write(&mut self, buf: &[Sample]) -> Result<usize> {
        self.info.length += buf.len() as u64;
        Ok(buf.len())
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_eof_immediately() {
        let mut r = NullFormat
            .open_read("-n", &SignalSpec::default())
            .unwrap();
        let mut buf = [0; 16];
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        assert_eq!(r.info().rate, 44100);
        assert_eq!(r.info().channels, 2);
    }

    #[test]
    fn honors_hints() {
        let hints = SignalSpec {
            rate: Some(8000),
            channels: Some(1),
            ..SignalSpec::default()
        };
        let r = NullFormat.open_read("-n", &hints).unwrap();
        assert_eq!(r.info().rate, 8000);
        assert_eq!(r.info().channels, 1);
    }

    #[test]
    fn swallows_writes() {
        let spec = OutputSpec {
            rate: 44100,
            channels: 2,
            size: SampleSize::Word,
            encoding: Encoding::Signed,
            reverse_bytes: None,
            reverse_nibbles: None,
            reverse_bits: None,
            compression: None,
            comment: None,
            length_hint: 0,
            loops: Vec::new(),
            instrument: None,
        };
        let mut w = NullFormat.open_write("-n", &spec).unwrap();
        assert_eq!(w.write(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(w.info().length, 3);
        w.finalize().unwrap();
    }
}
