//! Input file records and balancing.
//!
//! Each input carries its per-file options, its open reader, and the clip
//! counter for volume balancing. The effective volume folds the replay gain
//! found in the source's comment into the user's `-v` multiplier the first
//! time the input flows.

use crate::run::ReplayGainMode;
use crate::{Error, Result};
use mezcla_core::{Sample, SignalSpec, round_clip};
use mezcla_io::{SampleReader, StreamInfo};

/// One input file and its per-file state.
pub struct InputFile {
    /// Path as given on the command line (`-` = stdin, `-n` = null).
    pub path: String,
    /// Explicit `-t` type, if any.
    pub type_hint: Option<String>,
    /// Per-file format overrides.
    pub spec: SignalSpec,
    /// User volume multiplier (`-v`), if given.
    pub volume: Option<f64>,
    /// Replay gain in dB found in the container comment, if enabled.
    pub replay_gain: Option<f64>,
    /// Saturations performed balancing this input.
    pub volume_clips: u64,
    /// Set once a read error has been reported for this input.
    pub read_error: bool,
    reader: Option<Box<dyn SampleReader>>,
    folded: Option<f64>,
}

impl InputFile {
    /// Create a record for `path` with the given per-file options.
    pub fn new(path: impl Into<String>, type_hint: Option<String>, spec: SignalSpec) -> Self {
        InputFile {
            path: path.into(),
            type_hint,
            spec,
            volume: None,
            replay_gain: None,
            volume_clips: 0,
            read_error: false,
            reader: None,
            folded: None,
        }
    }

    /// Open the reader and scan the container comment for replay gain.
    pub fn open(&mut self, rg_mode: ReplayGainMode) -> Result<()> {
        let reader = mezcla_io::open_read(&self.path, self.type_hint.as_deref(), &self.spec)?;
        if let Some(comment) = reader.comment() {
            self.replay_gain = parse_replay_gain(comment, rg_mode);
        }
        self.reader = Some(reader);
        Ok(())
    }

    /// The open reader. Panics if the input has not been opened.
    pub fn reader(&mut self) -> &mut dyn SampleReader {
        self.reader.as_mut().expect("input not opened").as_mut()
    }

    /// Resolved stream parameters. Panics if the input has not been opened.
    pub fn info(&self) -> &StreamInfo {
        self.reader.as_ref().expect("input not opened").info()
    }

    /// Saturations performed by the codec converting container samples.
    pub fn reader_clips(&self) -> u64 {
        self.reader.as_ref().map_or(0, |r| r.clips())
    }

    /// Container comment text, if any.
    pub fn comment(&self) -> Option<&str> {
        self.reader.as_ref().and_then(|r| r.comment())
    }

    /// Container loop metadata.
    pub fn loops(&self) -> &[mezcla_io::LoopPoint] {
        self.reader.as_ref().map_or(&[], |r| r.loops())
    }

    /// Container instrument metadata, if any.
    pub fn instrument(&self) -> Option<mezcla_io::Instrument> {
        self.reader.as_ref().and_then(|r| r.instrument())
    }

    /// True once the input has been opened.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// The effective volume multiplier, folding replay gain in on first use.
    pub fn effective_volume(&mut self) -> f64 {
        *self.folded.get_or_insert_with(|| {
            let mut volume = self.volume.unwrap_or(1.0);
            if let Some(gain) = self.replay_gain {
                volume *= 10f64.powf(gain / 20.0);
            }
            volume
        })
    }

    /// Apply this input's effective volume to a block, counting clips.
    pub fn balance(&mut self, buf: &mut [Sample]) {
        let volume = self.effective_volume();
        if volume == 1.0 {
            return;
        }
        for s in buf.iter_mut() {
            *s = round_clip(volume * *s as f64, &mut self.volume_clips);
        }
    }

    /// Read up to one block of wide samples into `buf`, which must hold a
    /// whole number of this input's frames. A read error is reported once,
    /// recorded on the record, and surfaces as end-of-stream.
    pub fn read_wide(&mut self, buf: &mut [Sample]) -> usize {
        let channels = self.info().channels as usize;
        match self.reader().read(buf) {
            Ok(n) => n / channels,
            Err(e) => {
                if !self.read_error {
                    tracing::warn!("{}: read failed: {e}", self.path);
                    self.read_error = true;
                }
                0
            }
        }
    }

    /// Seek the input to a wide-sample offset.
    pub fn seek(&mut self, wide_offset: u64) -> Result<()> {
        self.reader().seek(wide_offset).map_err(Error::Io)
    }
}

/// Scan a container comment for a replay-gain tag.
///
/// The mode's preferred tag is searched first; if absent, the other one is
/// accepted. Tags look like `REPLAYGAIN_TRACK_GAIN=-8.52 dB`, one per line,
/// case-insensitive.
pub fn parse_replay_gain(comment: &str, mode: ReplayGainMode) -> Option<f64> {
    let keys: [&str; 2] = match mode {
        ReplayGainMode::Off => return None,
        ReplayGainMode::Track => ["replaygain_track_gain=", "replaygain_album_gain="],
        ReplayGainMode::Album => ["replaygain_album_gain=", "replaygain_track_gain="],
    };
    for key in keys {
        for line in comment.lines() {
            let line = line.trim();
            if line.len() >= key.len() && line[..key.len()].eq_ignore_ascii_case(key) {
                let value = line[key.len()..].trim();
                let number: String = value
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
                    .collect();
                if let Ok(gain) = number.parse() {
                    return Some(gain);
                }
            }
        }
    }
    None
}
