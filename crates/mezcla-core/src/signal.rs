//! Signal descriptors.
//!
//! Two views of a stream's format exist in mezcla:
//!
//! - [`SignalSpec`] is the *user-facing*, partially-specified description:
//!   every field is optional and unset fields are filled in by the codec
//!   (reading) or inherited from the combiner (writing).
//! - [`LogicalSignal`] is the fully-resolved `(rate, channels)` pair that
//!   describes the canonical stream at chain boundaries, where sample size
//!   and encoding no longer apply.

/// Sample container width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    /// 1 byte per sample.
    Byte,
    /// 2 bytes per sample.
    Word,
    /// 3 bytes per sample.
    Bytes3,
    /// 4 bytes per sample.
    DWord,
    /// 8 bytes per sample.
    QWord,
}

impl SampleSize {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            SampleSize::Byte => 1,
            SampleSize::Word => 2,
            SampleSize::Bytes3 => 3,
            SampleSize::DWord => 4,
            SampleSize::QWord => 8,
        }
    }

    /// Width in bits.
    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Parse a byte count into a size, if supported.
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(SampleSize::Byte),
            2 => Some(SampleSize::Word),
            3 => Some(SampleSize::Bytes3),
            4 => Some(SampleSize::DWord),
            8 => Some(SampleSize::QWord),
            _ => None,
        }
    }
}

/// Sample encoding within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Signed two's-complement PCM.
    Signed,
    /// Unsigned (offset-binary) PCM.
    Unsigned,
    /// IEEE floating point.
    Float,
    /// ITU G.711 µ-law companding.
    Ulaw,
    /// ITU G.711 A-law companding.
    Alaw,
    /// ADPCM.
    Adpcm,
    /// IMA (DVI) ADPCM.
    ImaAdpcm,
    /// OKI (VOX) ADPCM.
    OkiAdpcm,
    /// Microsoft ADPCM.
    MsAdpcm,
    /// GSM 06.10.
    Gsm,
}

impl Encoding {
    /// Short display name, as used in file-info reports.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Signed => "signed (2's complement)",
            Encoding::Unsigned => "unsigned",
            Encoding::Float => "float",
            Encoding::Ulaw => "u-law",
            Encoding::Alaw => "A-law",
            Encoding::Adpcm => "ADPCM",
            Encoding::ImaAdpcm => "IMA ADPCM",
            Encoding::OkiAdpcm => "OKI ADPCM",
            Encoding::MsAdpcm => "MS ADPCM",
            Encoding::Gsm => "GSM",
        }
    }
}

/// Partially-specified stream format, as supplied on the command line.
///
/// `None` means "not specified": codecs fill unset fields from the container
/// header when reading, and the driver inherits unset output fields from the
/// combiner. The reversal fields are tri-state: `None` (format default),
/// `Some(true)` or `Some(false)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSpec {
    /// Sample rate in Hz.
    pub rate: Option<u32>,
    /// Channel count.
    pub channels: Option<u32>,
    /// Container width.
    pub size: Option<SampleSize>,
    /// Sample encoding.
    pub encoding: Option<Encoding>,
    /// Reverse byte order relative to the format's default.
    pub reverse_bytes: Option<bool>,
    /// Reverse nibble order within each byte.
    pub reverse_nibbles: Option<bool>,
    /// Reverse bit order within each byte.
    pub reverse_bits: Option<bool>,
    /// Output compression factor, for formats that use one.
    pub compression: Option<f64>,
}

impl SignalSpec {
    /// True if no field has been specified.
    pub fn is_empty(&self) -> bool {
        *self == SignalSpec::default()
    }
}

/// Resolved canonical-stream signal at a chain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalSignal {
    /// Sample rate in Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u32,
}

impl LogicalSignal {
    /// Create a signal descriptor.
    pub fn new(rate: u32, channels: u32) -> Self {
        Self { rate, channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_round_trips_bytes() {
        for bytes in [1, 2, 3, 4, 8] {
            assert_eq!(SampleSize::from_bytes(bytes).unwrap().bytes(), bytes);
        }
        assert!(SampleSize::from_bytes(5).is_none());
        assert!(SampleSize::from_bytes(0).is_none());
    }

    #[test]
    fn default_spec_is_empty() {
        assert!(SignalSpec::default().is_empty());
        let spec = SignalSpec {
            rate: Some(44100),
            ..SignalSpec::default()
        };
        assert!(!spec.is_empty());
    }
}
