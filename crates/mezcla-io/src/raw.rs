//! Headerless (raw) audio data.
//!
//! Raw files carry no self-description, so rate, channels, sample size and
//! encoding must all be supplied by the caller. Signed and unsigned PCM at
//! 1/2/3/4/8 bytes, IEEE float at 4/8 bytes, and G.711 µ-law/A-law at 1
//! byte are supported, with optional byte-order, nibble-order and bit-order
//! reversal. The format's default byte order is little-endian.

use crate::codec::{
    FormatFlags, FormatHandler, OutputSpec, SampleReader, SampleWriter, StreamInfo,
};
use crate::{Error, Result};
use mezcla_core::{Encoding, Sample, SampleSize, SignalSpec, round_clip};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// The raw format handler.
pub struct RawFormat;

/// Check an encoding/size combination, shared between read and write.
fn check_params(encoding: Encoding, size: SampleSize) -> Result<()> {
    let ok = match encoding {
        Encoding::Signed | Encoding::Unsigned => true,
        Encoding::Float => matches!(size, SampleSize::DWord | SampleSize::QWord),
        Encoding::Ulaw | Encoding::Alaw => size == SampleSize::Byte,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Unsupported {
            format: "raw",
            message: format!(
                "cannot handle {} at {} bytes per sample",
                encoding.name(),
                size.bytes()
            ),
        })
    }
}

impl FormatHandler for RawFormat {
    fn names(&self) -> &'static [&'static str] {
        &["raw"]
    }

    fn flags(&self) -> FormatFlags {
        FormatFlags {
            seekable: true,
            ..FormatFlags::default()
        }
    }

    fn open_read(&self, path: &str, hints: &SignalSpec) -> Result<Box<dyn SampleReader>> {
        let missing = |what| Error::MissingParameter {
            path: path.to_string(),
            what,
        };
        let rate = hints.rate.ok_or_else(|| missing("sample rate"))?;
        let channels = hints.channels.ok_or_else(|| missing("channel count"))?;
        let encoding = hints.encoding.ok_or_else(|| missing("sample encoding"))?;
        let size = match hints.size {
            Some(size) => size,
            None if matches!(encoding, Encoding::Ulaw | Encoding::Alaw) => SampleSize::Byte,
            None => return Err(missing("sample size")),
        };
        check_params(encoding, size)?;

        let (src, length, seekable) = if path == "-" {
            let stdin: Box<dyn Read + Send> = Box::new(std::io::stdin());
            (RawSource::Stream(stdin), 0, false)
        } else {
            let file = File::open(path)?;
            let length = file.metadata()?.len() / size.bytes() as u64;
            (RawSource::File(BufReader::new(file)), length, true)
        };

        Ok(Box::new(RawReadHandle {
            path: path.to_string(),
            info: StreamInfo {
                rate,
                channels,
                size,
                encoding,
                length,
                seekable,
            },
            codec: RawCodec::new(size, encoding, hints),
            src,
            clips: 0,
        }))
    }

    fn open_write(&self, path: &str, spec: &OutputSpec) -> Result<Box<dyn SampleWriter>> {
        check_params(spec.encoding, spec.size)?;
        let dst: RawSink = if path == "-" {
            RawSink::Stream(Box::new(std::io::stdout()))
        } else {
            RawSink::File(BufWriter::new(File::create(path)?))
        };
        let hints = SignalSpec {
            reverse_bytes: spec.reverse_bytes,
            reverse_nibbles: spec.reverse_nibbles,
            reverse_bits: spec.reverse_bits,
            ..SignalSpec::default()
        };
        Ok(Box::new(RawWriteHandle {
            info: StreamInfo {
                rate: spec.rate,
                channels: spec.channels,
                size: spec.size,
                encoding: spec.encoding,
                length: 0,
                seekable: false,
            },
            codec: RawCodec::new(spec.size, spec.encoding, &hints),
            dst,
            clips: 0,
        }))
    }
}

enum RawSource {
    File(BufReader<File>),
    Stream(Box<dyn Read + Send>),
}

enum RawSink {
    File(BufWriter<File>),
    Stream(Box<dyn Write + Send>),
}

/// Sample <-> bytes conversion parameters.
#[derive(Clone, Copy)]
struct RawCodec {
    size: SampleSize,
    encoding: Encoding,
    big_endian: bool,
    reverse_nibbles: bool,
    reverse_bits: bool,
}

impl RawCodec {
    fn new(size: SampleSize, encoding: Encoding, hints: &SignalSpec) -> Self {
        RawCodec {
            size,
            encoding,
            big_endian: hints.reverse_bytes.unwrap_or(false),
            reverse_nibbles: hints.reverse_nibbles.unwrap_or(false),
            reverse_bits: hints.reverse_bits.unwrap_or(false),
        }
    }

    /// Per-byte bit/nibble transforms, applied symmetrically on both paths.
    fn fixup(&self, bytes: &mut [u8]) {
        if self.reverse_bits {
            for b in bytes.iter_mut() {
                *b = b.reverse_bits();
            }
        }
        if self.reverse_nibbles {
            for b in bytes.iter_mut() {
                *b = (*b >> 4) | (*b << 4);
            }
        }
    }

    /// Assemble an unsigned integer from container bytes.
    fn load(&self, bytes: &[u8]) -> u64 {
        let mut v = 0u64;
        if self.big_endian {
            for &b in bytes {
                v = (v << 8) | b as u64;
            }
        } else {
            for &b in bytes.iter().rev() {
                v = (v << 8) | b as u64;
            }
        }
        v
    }

    /// Scatter an unsigned integer into container bytes.
    fn store(&self, mut v: u64, bytes: &mut [u8]) {
        if self.big_endian {
            for b in bytes.iter_mut().rev() {
                *b = v as u8;
                v >>= 8;
            }
        } else {
            for b in bytes.iter_mut() {
                *b = v as u8;
                v >>= 8;
            }
        }
    }

    fn decode(&self, bytes: &mut [u8], clips: &mut u64) -> Sample {
        self.fixup(bytes);
        let bits = self.size.bits();
        let v = self.load(bytes);
        match self.encoding {
            Encoding::Ulaw => (ulaw_to_linear(v as u8) as Sample) << 16,
            Encoding::Alaw => (alaw_to_linear(v as u8) as Sample) << 16,
            Encoding::Float => {
                let f = if self.size == SampleSize::DWord {
                    f32::from_bits(v as u32) as f64
                } else {
                    f64::from_bits(v)
                };
                round_clip(f * -(Sample::MIN as f64), clips)
            }
            Encoding::Unsigned | Encoding::Signed => {
                // Offset-binary becomes two's complement by flipping the
                // sign bit; then left-justify into the canonical width.
                let v = if self.encoding == Encoding::Unsigned {
                    v ^ (1 << (bits - 1))
                } else {
                    v
                };
                let signed = ((v << (64 - bits)) as i64) >> (64 - bits);
                if bits >= 32 {
                    (signed >> (bits - 32)) as Sample
                } else {
                    (signed as Sample) << (32 - bits)
                }
            }
            _ => 0,
        }
    }

    fn encode(&self, s: Sample, bytes: &mut [u8], clips: &mut u64) {
        let bits = self.size.bits();
        let v: u64 = match self.encoding {
            Encoding::Ulaw => linear_to_ulaw(narrow_to_16(s, clips)) as u64,
            Encoding::Alaw => linear_to_alaw(narrow_to_16(s, clips)) as u64,
            Encoding::Float => {
                let f = s as f64 / -(Sample::MIN as f64);
                if self.size == SampleSize::DWord {
                    (f as f32).to_bits() as u64
                } else {
                    f.to_bits()
                }
            }
            Encoding::Unsigned | Encoding::Signed => {
                let wide = if bits >= 32 {
                    (s as i64) << (bits - 32)
                } else {
                    narrow_signed(s, bits, clips) as i64
                };
                let v = (wide as u64) & (u64::MAX >> (64 - bits));
                if self.encoding == Encoding::Unsigned {
                    v ^ (1 << (bits - 1))
                } else {
                    v
                }
            }
            _ => 0,
        };
        self.store(v, bytes);
        self.fixup(bytes);
    }
}

/// Round-narrow a canonical sample to `bits`, saturating at the rail.
fn narrow_signed(s: Sample, bits: u32, clips: &mut u64) -> i32 {
    let shift = 32 - bits;
    let half = 1i32 << (shift - 1);
    match s.checked_add(half) {
        Some(v) => v >> shift,
        None => {
            *clips += 1;
            Sample::MAX >> shift
        }
    }
}

fn narrow_to_16(s: Sample, clips: &mut u64) -> i16 {
    narrow_signed(s, 16, clips) as i16
}

struct RawReadHandle {
    path: String,
    info: StreamInfo,
    codec: RawCodec,
    src: RawSource,
    clips: u64,
}

impl SampleReader for RawReadHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn read(&mut self, buf: &mut [Sample]) -> Result<usize> {
        let bytes_per = self.info.size.bytes();
        let mut chunk = [0u8; 8];
        let mut n = 0;
        while n < buf.len() {
            let chunk = &mut chunk[..bytes_per];
            let mut got = 0;
            while got < bytes_per {
                let r = match &mut self.src {
                    RawSource::File(f) => f.read(&mut chunk[got..])?,
                    RawSource::Stream(s) => s.read(&mut chunk[got..])?,
                };
                if r == 0 {
                    break;
                }
                got += r;
            }
            if got < bytes_per {
                if got != 0 {
                    tracing::warn!("{}: trailing partial sample ignored", self.path);
                }
                break;
            }
            buf[n] = self.codec.decode(chunk, &mut self.clips);
            n += 1;
        }
        Ok(n)
    }

    fn seek(&mut self, wide_offset: u64) -> Result<()> {
        match &mut self.src {
            RawSource::File(f) => {
                let byte =
                    wide_offset * self.info.channels as u64 * self.info.size.bytes() as u64;
                f.seek(SeekFrom::Start(byte))?;
                Ok(())
            }
            RawSource::Stream(_) => Err(Error::NotSeekable(self.path.clone())),
        }
    }

    fn clips(&self) -> u64 {
        self.clips
    }
}

struct RawWriteHandle {
    info: StreamInfo,
    codec: RawCodec,
    dst: RawSink,
    clips: u64,
}

impl SampleWriter for RawWriteHandle {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn write(&mut self, buf: &[Sample]) -> Result<usize> {
        let bytes_per = self.info.size.bytes();
        let mut chunk = [0u8; 8];
        for &s in buf {
            let chunk = &mut chunk[..bytes_per];
            self.codec.encode(s, chunk, &mut self.clips);
            match &mut self.dst {
                RawSink::File(f) => f.write_all(chunk)?,
                RawSink::Stream(w) => w.write_all(chunk)?,
            }
        }
        self.info.length += buf.len() as u64;
        Ok(buf.len())
    }

    fn clips(&self) -> u64 {
        self.clips
    }

    fn finalize(&mut self) -> Result<()> {
        match &mut self.dst {
            RawSink::File(f) => f.flush()?,
            RawSink::Stream(w) => w.flush()?,
        }
        Ok(())
    }
}

// --- G.711 companding ---------------------------------------------------

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Expand one µ-law byte to a 16-bit linear sample.
fn ulaw_to_linear(u: u8) -> i16 {
    let u = !u;
    let mut t = (((u & 0x0f) as i32) << 3) + ULAW_BIAS;
    t <<= (u >> 4) & 0x07;
    (if u & 0x80 != 0 {
        ULAW_BIAS - t
    } else {
        t - ULAW_BIAS
    }) as i16
}

/// Compress a 16-bit linear sample to one µ-law byte.
fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80u8
    } else {
        0
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7u8;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((pcm >> (exponent + 3)) & 0x0f) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Expand one A-law byte to a 16-bit linear sample.
fn alaw_to_linear(a: u8) -> i16 {
    let a = a ^ 0x55;
    let mut t = (((a & 0x0f) as i32) << 4) + 8;
    let seg = (a >> 4) & 0x07;
    if seg >= 1 {
        t += 0x100;
    }
    if seg > 1 {
        t <<= seg - 1;
    }
    (if a & 0x80 != 0 { t } else { -t }) as i16
}

/// Compress a 16-bit linear sample to one A-law byte.
fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = sample as i32 >> 3; // 16-bit to 13-bit
    let mask = if pcm >= 0 {
        0xd5u8
    } else {
        pcm = -pcm - 1;
        0x55u8
    };

    let mut seg = 0u8;
    while seg < 8 && pcm > SEG_END[seg as usize] {
        seg += 1;
    }
    if seg >= 8 {
        return 0x7f ^ mask;
    }
    let mantissa = if seg < 2 { pcm >> 1 } else { pcm >> seg };
    ((seg << 4) | (mantissa & 0x0f) as u8) ^ mask
}

const SEG_END: [i32; 8] = [0x1f, 0x3f, 0x7f, 0xff, 0x1ff, 0x3ff, 0x7ff, 0xfff];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(size: SampleSize, encoding: Encoding) -> OutputSpec {
        OutputSpec {
            rate: 8000,
            channels: 1,
            size,
            encoding,
            reverse_bytes: None,
            reverse_nibbles: None,
            reverse_bits: None,
            compression: None,
            comment: None,
            length_hint: 0,
            loops: Vec::new(),
            instrument: None,
        }
    }

    fn hints(size: SampleSize, encoding: Encoding) -> SignalSpec {
        SignalSpec {
            rate: Some(8000),
            channels: Some(1),
            size: Some(size),
            encoding: Some(encoding),
            ..SignalSpec::default()
        }
    }

    fn roundtrip(size: SampleSize, encoding: Encoding, samples: &[Sample]) -> Vec<Sample> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.raw").to_string_lossy().into_owned();
        let fmt = RawFormat;
        let mut w = fmt.open_write(&path, &spec(size, encoding)).unwrap();
        w.write(samples).unwrap();
        w.finalize().unwrap();
        let mut r = fmt.open_read(&path, &hints(size, encoding)).unwrap();
        assert_eq!(r.info().length, samples.len() as u64);
        let mut buf = vec![0; samples.len() + 4];
        let n = r.read(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn signed_16_roundtrip() {
        let samples: Vec<Sample> = vec![0, 1 << 16, -(1 << 16), 0x7fff << 16, -0x8000 << 16];
        assert_eq!(roundtrip(SampleSize::Word, Encoding::Signed, &samples), samples);
    }

    #[test]
    fn unsigned_8_roundtrip() {
        let samples: Vec<Sample> = vec![0, 1 << 24, -(1 << 24), 0x7f << 24];
        assert_eq!(roundtrip(SampleSize::Byte, Encoding::Unsigned, &samples), samples);
    }

    #[test]
    fn signed_24_roundtrip() {
        let samples: Vec<Sample> = vec![0, 0x123456 << 8, -(0x123456 << 8)];
        assert_eq!(
            roundtrip(SampleSize::Bytes3, Encoding::Signed, &samples),
            samples
        );
    }

    #[test]
    fn float_32_roundtrip_is_close() {
        let samples: Vec<Sample> = vec![0, 1 << 30, -(1 << 30), 12345 << 8];
        let back = roundtrip(SampleSize::DWord, Encoding::Float, &samples);
        for (got, want) in back.iter().zip(&samples) {
            assert!((got - want).abs() <= 256, "{got} vs {want}");
        }
    }

    #[test]
    fn ulaw_all_codes_survive_reencoding() {
        for code in 0u16..=255 {
            if code == 0x7f {
                // Negative zero; canonically re-encodes as positive zero.
                assert_eq!(linear_to_ulaw(ulaw_to_linear(0x7f)), 0xff);
                continue;
            }
            let linear = ulaw_to_linear(code as u8);
            assert_eq!(
                linear_to_ulaw(linear),
                code as u8,
                "code {code:#x} decoded to {linear}"
            );
        }
    }

    #[test]
    fn alaw_all_codes_survive_reencoding() {
        for code in 0u16..=255 {
            let linear = alaw_to_linear(code as u8);
            assert_eq!(
                linear_to_alaw(linear),
                code as u8,
                "code {code:#x} decoded to {linear}"
            );
        }
    }

    #[test]
    fn ulaw_silence_is_near_zero() {
        assert_eq!(ulaw_to_linear(0xff), 0);
        assert!(ulaw_to_linear(0x7f).abs() <= 8);
    }

    #[test]
    fn big_endian_swaps_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("be.raw").to_string_lossy().into_owned();
        let fmt = RawFormat;
        let mut s = spec(SampleSize::Word, Encoding::Signed);
        s.reverse_bytes = Some(true);
        let mut w = fmt.open_write(&path, &s).unwrap();
        w.write(&[0x0102 << 16]).unwrap();
        w.finalize().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn reverse_bits_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rb.raw").to_string_lossy().into_owned();
        let fmt = RawFormat;
        let mut s = spec(SampleSize::Word, Encoding::Signed);
        s.reverse_bits = Some(true);
        let mut w = fmt.open_write(&path, &s).unwrap();
        let samples = vec![0x1234 << 16, -(0x0101 << 16)];
        w.write(&samples).unwrap();
        w.finalize().unwrap();

        let mut h = hints(SampleSize::Word, Encoding::Signed);
        h.reverse_bits = Some(true);
        let mut r = fmt.open_read(&path, &h).unwrap();
        let mut buf = vec![0; 2];
        assert_eq!(r.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, samples);
    }

    #[test]
    fn seek_lands_on_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.raw").to_string_lossy().into_owned();
        let fmt = RawFormat;
        let mut w = fmt.open_write(&path, &spec(SampleSize::Word, Encoding::Signed)).unwrap();
        let samples: Vec<Sample> = (0..100).map(|i| i << 16).collect();
        w.write(&samples).unwrap();
        w.finalize().unwrap();

        let mut r = fmt.open_read(&path, &hints(SampleSize::Word, Encoding::Signed)).unwrap();
        r.seek(42).unwrap();
        let mut buf = vec![0; 1];
        assert_eq!(r.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 42 << 16);
    }

    #[test]
    fn read_requires_parameters() {
        let fmt = RawFormat;
        assert!(matches!(
            fmt.open_read("x.raw", &SignalSpec::default()),
            Err(Error::MissingParameter { .. })
        ));
        let partial = SignalSpec {
            rate: Some(8000),
            channels: Some(1),
            ..SignalSpec::default()
        };
        assert!(fmt.open_read("x.raw", &partial).is_err());
    }

    #[test]
    fn ulaw_defaults_to_one_byte() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("u.raw").to_string_lossy().into_owned();
        std::fs::write(&path, [0xffu8, 0x7f]).unwrap();
        let fmt = RawFormat;
        let h = SignalSpec {
            rate: Some(8000),
            channels: Some(1),
            encoding: Some(Encoding::Ulaw),
            ..SignalSpec::default()
        };
        let r = fmt.open_read(&path, &h).unwrap();
        assert_eq!(r.info().size, SampleSize::Byte);
        assert_eq!(r.info().length, 2);
    }
}
