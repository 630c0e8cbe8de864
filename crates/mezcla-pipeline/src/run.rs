//! One invocation's worth of pipeline state.
//!
//! [`Run`] reifies what the original engine kept as process-wide globals:
//! the file table, the combine method, clip counters, progress counters and
//! the signal flags, carried explicitly from open to cleanup. `execute`
//! drives one or more segments: `sequence` mode tears the chain down and
//! rebuilds it between inputs; every other method runs a single segment.

use crate::chain;
use crate::combine::{CombineMethod, combined_signal};
use crate::input::InputFile;
use crate::scheduler::{Counters, Scheduler};
use crate::signals::Signals;
use crate::status::Status;
use crate::{Error, Result};
use mezcla_core::{EffectFlags, EffectHandler, LogicalSignal, SignalSpec};
use mezcla_io::{LoopPoint, OutputSpec};
use std::sync::Arc;

/// Replay-gain selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayGainMode {
    /// Do not apply replay gain.
    #[default]
    Off,
    /// Prefer per-track gain.
    Track,
    /// Prefer per-album gain.
    Album,
}

/// Effect transfer-function plotting selection. Accepted for compatibility;
/// none of the bundled effects plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotMode {
    /// No plotting.
    #[default]
    Off,
    /// Emit GNU Octave commands.
    Octave,
    /// Emit gnuplot commands.
    Gnuplot,
}

/// Run-wide options shared by every component.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    /// Per-stage buffer capacity in samples.
    pub buffer_size: usize,
    /// Replay-gain mode for inputs.
    pub replay_gain: ReplayGainMode,
    /// Do not reseed the PRNG; effects that randomize behave identically
    /// across runs.
    pub repeatable_random: bool,
    /// Plot mode for filter effects.
    pub plot: PlotMode,
    /// Whether the status line is drawn.
    pub show_progress: bool,
}

impl Default for GlobalInfo {
    fn default() -> Self {
        GlobalInfo {
            buffer_size: 8192,
            replay_gain: ReplayGainMode::Off,
            repeatable_random: false,
            plot: PlotMode::Off,
            show_progress: false,
        }
    }
}

/// The output file and its per-file options.
pub struct OutputFile {
    /// Path as given on the command line (`-` = stdout, `-n` = null).
    pub path: String,
    /// Explicit `-t` type, if any.
    pub type_hint: Option<String>,
    /// Per-file format overrides; unset fields inherit from the combiner.
    pub spec: SignalSpec,
    /// Comment text; `Some("")` suppresses the default comment.
    pub comment: Option<String>,
}

/// What a completed run looked like.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// The user aborted; partial output was kept.
    pub aborted: bool,
}

/// All state for one invocation.
pub struct Run {
    /// Input files, in command-line order.
    pub inputs: Vec<InputFile>,
    /// The output file.
    pub output: OutputFile,
    /// How inputs are combined.
    pub method: CombineMethod,
    /// Run-wide options.
    pub globals: GlobalInfo,
    signals: Arc<Signals>,
    user_effects: Vec<Box<dyn EffectHandler>>,
    current_input: usize,
    counters: Counters,
    status: Status,
    output_clips: u64,
    output_phony: bool,
}

impl Run {
    /// Assemble a run. `user_effects` are configured prototypes, duplicated
    /// into each segment's chain.
    pub fn new(
        inputs: Vec<InputFile>,
        output: OutputFile,
        method: CombineMethod,
        globals: GlobalInfo,
        user_effects: Vec<Box<dyn EffectHandler>>,
        signals: Arc<Signals>,
    ) -> Self {
        let status = Status::new(globals.show_progress);
        Run {
            inputs,
            output,
            method,
            globals,
            signals,
            user_effects,
            current_input: 0,
            counters: Counters::default(),
            status,
            output_clips: 0,
            output_phony: false,
        }
    }

    /// Wide samples written to the sink over the whole run.
    pub fn output_wide_samples(&self) -> u64 {
        self.counters.output_wide
    }

    /// Execute the run to completion, abort, or error. Cleanup (clip
    /// reports, the status verdict, unlinking a failed output) happens on
    /// every path.
    pub fn execute(&mut self, overwrite: &dyn Fn(&str) -> bool) -> Result<RunOutcome> {
        let result = self.execute_inner(overwrite);
        self.shutdown(result.is_err());
        result.map(|()| RunOutcome {
            aborted: self.signals.aborted(),
        })
    }

    fn execute_inner(&mut self, overwrite: &dyn Fn(&str) -> bool) -> Result<()> {
        self.output_phony = mezcla_io::resolve(&self.output.path, self.output.type_hint.as_deref())?
            .flags()
            .phony;

        for input in &mut self.inputs {
            input.open(self.globals.replay_gain)?;
        }

        // Mixing defaults to input volumes that cannot clip; users who
        // override this may reintroduce clipping.
        if self.method == CombineMethod::Mix && self.inputs.iter().all(|i| i.volume.is_none()) {
            let share = 1.0 / self.inputs.len() as f64;
            for input in &mut self.inputs {
                input.volume = Some(share);
            }
        }

        self.signals
            .set_allow_skip(self.globals.show_progress && self.method.is_serial());

        if self.method == CombineMethod::Sequence {
            loop {
                let source_done = self.process(overwrite)?;
                if source_done
                    || self.signals.aborted()
                    || self.current_input >= self.inputs.len()
                {
                    break;
                }
            }
        } else {
            self.process(overwrite)?;
        }
        Ok(())
    }

    /// Run one segment: resolve signals, open the sink, build and start the
    /// chain, schedule, stop. Returns `true` when no further segments
    /// should run.
    fn process(&mut self, overwrite: &dyn Fn(&str) -> bool) -> Result<bool> {
        let combined = combined_signal(self.method, &self.inputs, self.current_input)?;
        let combiner = combined.signal;

        // Unset output parameters inherit from the source.
        let src = if self.method == CombineMethod::Sequence {
            self.current_input
        } else {
            0
        };
        let src_info = self.inputs[src].info().clone();
        let out_signal = LogicalSignal {
            rate: self.output.spec.rate.unwrap_or(combiner.rate),
            channels: self.output.spec.channels.unwrap_or(combiner.channels),
        };

        let mut length_hint = combined.wide_length;
        if self
            .user_effects
            .iter()
            .any(|e| e.flags().contains(EffectFlags::LENGTH))
        {
            length_hint = 0;
        }

        let comment = match &self.output.comment {
            Some(text) if text.is_empty() => None,
            Some(text) => Some(text.clone()),
            None => Some(
                self.inputs[0]
                    .comment()
                    .unwrap_or("Processed by mezcla")
                    .to_string(),
            ),
        };

        // Loop metadata is in samples, so the channel count doesn't matter,
        // but a rate change rescales it.
        let factor = out_signal.rate as f64 / combiner.rate as f64;
        let loops: Vec<LoopPoint> = self.inputs[0]
            .loops()
            .iter()
            .map(|l| LoopPoint {
                start: (l.start as f64 * factor) as u64,
                length: (l.length as f64 * factor) as u64,
                ..*l
            })
            .collect();

        let spec = OutputSpec {
            rate: out_signal.rate,
            channels: out_signal.channels,
            size: self.output.spec.size.unwrap_or(src_info.size),
            encoding: self.output.spec.encoding.unwrap_or(src_info.encoding),
            reverse_bytes: self.output.spec.reverse_bytes,
            reverse_nibbles: self.output.spec.reverse_nibbles,
            reverse_bits: self.output.spec.reverse_bits,
            compression: self.output.spec.compression,
            comment,
            length_hint,
            loops,
            instrument: self.inputs[0].instrument(),
        };
        let mut writer = mezcla_io::open_write(
            &self.output.path,
            self.output.type_hint.as_deref(),
            &spec,
            overwrite,
        )?;

        let mut chain = chain::build(
            combiner,
            out_signal,
            &self.user_effects,
            self.globals.buffer_size,
        )?;
        chain::start(&mut chain)?;

        let mut scheduler = Scheduler::new(
            chain,
            &mut self.inputs,
            &mut self.current_input,
            self.method,
            combiner,
            writer.as_mut(),
            self.signals.as_ref(),
            &mut self.status,
            &mut self.counters,
        );
        let flow_result = scheduler.run();
        let mut chain = scheduler.into_chain();

        // Stop every effect even when the segment failed, then account for
        // the sink's conversion clips before the writer goes away.
        for stage in &mut chain.stages[1..] {
            let clips = stage.clips();
            if let Some(handler) = stage.handler.as_mut() {
                handler.stop();
            }
            if let Some(right) = stage.right.as_mut() {
                right.stop();
            }
            if clips != 0 {
                tracing::warn!(
                    "`{}' clipped {clips} samples; decrease volume?",
                    stage.name()
                );
            }
        }
        self.output_clips += writer.clips();

        match flow_result {
            Ok(source_done) => {
                writer
                    .finalize()
                    .map_err(|e| Error::Write(e.to_string()))?;
                Ok(source_done)
            }
            Err(e) => {
                // Best effort; the segment already failed.
                if let Err(fin) = writer.finalize() {
                    tracing::debug!("finalize after failure: {fin}");
                }
                Err(e)
            }
        }
    }

    fn shutdown(&mut self, failed: bool) {
        for input in &self.inputs {
            if input.is_open() && input.reader_clips() != 0 {
                tracing::warn!("{}: input clipped {} samples", input.path, input.reader_clips());
            }
            if input.volume_clips != 0 {
                tracing::warn!(
                    "{}: balancing clipped {} samples; decrease volume?",
                    input.path,
                    input.volume_clips
                );
            }
        }
        if self.output_clips != 0 {
            tracing::warn!(
                "{}: output clipped {} samples; decrease volume?",
                self.output.path,
                self.output_clips
            );
        }
        if self.counters.mixing_clips != 0 {
            tracing::warn!(
                "mix-combining clipped {} samples; decrease volume?",
                self.counters.mixing_clips
            );
        }

        if failed {
            // An unsuccessful run must not leave a half-written regular
            // file behind. Aborts are not failures; partial output stays.
            if !self.output_phony
                && self.output.path != "-"
                && std::fs::metadata(&self.output.path)
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            {
                let _ = std::fs::remove_file(&self.output.path);
            }
        } else {
            self.status.finish(self.signals.aborted());
        }
    }
}
