//! The pull scheduler.
//!
//! Samples move through the chain by a backwards pull: starting from the
//! last stage, each stage that needs input pulls its predecessor; when the
//! pull reaches the input sentinel, the combiner refills it from the
//! current input(s). A stage reporting end-of-stream becomes the new pull
//! point (`input_eff`), and once the true inputs are exhausted the drain
//! phase extracts each stage's buffered residue in order.
//!
//! Every stage owns one output buffer with a `(olen, odone)` window; the
//! scheduler is the only code that moves those cursors. An effect that
//! consumes nothing and produces nothing in one call would never make
//! progress again, so that is a fatal error.

use crate::chain::Chain;
use crate::combine::{CombineMethod, can_segue};
use crate::input::InputFile;
use crate::signals::Signals;
use crate::status::{Status, StatusSnapshot};
use crate::{Error, Result};
use mezcla_core::{FlowStatus, LogicalSignal, Sample};
use mezcla_io::SampleWriter;

/// Counters shared across a run's segments.
#[derive(Debug, Default)]
pub struct Counters {
    /// Wide samples read from the combiner so far (current input for serial
    /// methods).
    pub read_wide: u64,
    /// Wide samples expected from the current input(s); 0 if unknown.
    pub input_wide: u64,
    /// Wide samples delivered to the output sink.
    pub output_wide: u64,
    /// Saturations while mix-combining.
    pub mixing_clips: u64,
}

/// One segment's flow driver.
pub struct Scheduler<'a> {
    chain: Chain,
    inputs: &'a mut [InputFile],
    current_input: &'a mut usize,
    method: CombineMethod,
    combiner: LogicalSignal,
    writer: &'a mut dyn SampleWriter,
    signals: &'a Signals,
    status: &'a mut Status,
    counters: &'a mut Counters,
    /// Last stage that still has data to give; 0 means the real input.
    input_eff: usize,
    input_eff_eof: bool,
    /// Per-input read buffers for the parallel combine methods.
    ibufs: Vec<Vec<Sample>>,
    /// Stereo-splitter scratch: deinterleaved input halves.
    split_in_l: Vec<Sample>,
    split_in_r: Vec<Sample>,
    /// Stereo-splitter scratch: per-side output halves.
    split_out_l: Vec<Sample>,
    split_out_r: Vec<Sample>,
}

/// What ended a sentinel refill.
enum Refill {
    /// The sentinel holds this many wide samples.
    Samples(usize),
    /// All inputs are exhausted.
    Exhausted,
    /// The next sequenced input cannot segue; the segment ends here.
    SegueBreak,
}

impl<'a> Scheduler<'a> {
    /// Build a scheduler for one segment over an assembled, started chain.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Chain,
        inputs: &'a mut [InputFile],
        current_input: &'a mut usize,
        method: CombineMethod,
        combiner: LogicalSignal,
        writer: &'a mut dyn SampleWriter,
        signals: &'a Signals,
        status: &'a mut Status,
        counters: &'a mut Counters,
    ) -> Self {
        let buffer_size = chain.buffer_size;
        let ibufs = if method.is_serial() {
            Vec::new()
        } else {
            inputs.iter().map(|_| vec![0; buffer_size]).collect()
        };
        Scheduler {
            chain,
            inputs,
            current_input,
            method,
            combiner,
            writer,
            signals,
            status,
            counters,
            input_eff: 0,
            input_eff_eof: false,
            ibufs,
            split_in_l: vec![0; buffer_size.div_ceil(2)],
            split_in_r: vec![0; buffer_size.div_ceil(2)],
            split_out_l: vec![0; buffer_size.div_ceil(2)],
            split_out_r: vec![0; buffer_size.div_ceil(2)],
        }
    }

    /// Take the chain back for its stop phase.
    pub fn into_chain(self) -> Chain {
        self.chain
    }

    /// Total saturations so far, across every accounting site.
    fn total_clips(&self) -> u64 {
        let mut clips = self.counters.mixing_clips + self.writer.clips();
        for input in self.inputs.iter() {
            clips += input.volume_clips + input.reader_clips();
        }
        for stage in &self.chain.stages {
            clips += stage.clips();
        }
        clips
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            read_wide: self.counters.read_wide,
            input_wide: self.counters.input_wide,
            output_wide: self.counters.output_wide,
            clips: self.total_clips(),
            rate: self.combiner.rate,
        }
    }

    /// Reset per-input progress accounting when a serial run moves on.
    fn progress_to_input(&mut self, index: usize) {
        self.counters.read_wide = 0;
        self.counters.input_wide = self.inputs[index].info().wide_length();
    }

    /// The trim fast-path: when the first effect wants an initial skip and
    /// the single input can seek, seek instead of decoding and discarding.
    fn optimize_seek(&mut self) {
        if self.inputs.len() != 1 || self.chain.stages.len() < 2 {
            return;
        }
        if !self.inputs[0].info().seekable {
            return;
        }
        let channels = self.inputs[0].info().channels as u64;
        let stage = &mut self.chain.stages[1];
        let Some(handler) = stage.handler.as_mut() else {
            return;
        };
        let Some(offset) = handler.seek_hint() else {
            return;
        };
        let wide = offset / channels;
        match self.inputs[0].seek(wide) {
            Ok(()) => {
                self.counters.read_wide = wide;
                handler.clear_seek();
                if let Some(right) = stage.right.as_mut() {
                    right.clear_seek();
                }
                tracing::debug!("seeked input ahead {wide} wide samples for `trim'");
            }
            // A failed seek leaves the file position alone; the effect will
            // do its own skipping.
            Err(e) => tracing::debug!("input seek failed, skipping the fast path: {e}"),
        }
    }

    /// Run the segment: flow until the inputs run dry or an effect takes
    /// over as the pull point, then drain. Returns `true` when no further
    /// segments should run (an effect ended the stream early).
    pub fn run(&mut self) -> Result<bool> {
        if self.method.is_serial() {
            self.progress_to_input(*self.current_input);
        } else {
            let mut widest = 0;
            for i in 0..self.inputs.len() {
                widest = widest.max(self.inputs[i].info().wide_length());
            }
            self.counters.read_wide = 0;
            self.counters.input_wide = widest;
        }
        self.optimize_seek();

        let mut source_done = false;
        let mut write_failed = false;
        let run_result: Result<()> = loop {
            let wide = match self.refill_sentinel() {
                Ok(Refill::Samples(n)) => n,
                Ok(Refill::Exhausted | Refill::SegueBreak) => break Ok(()),
                Err(e) => {
                    write_failed = true;
                    break Err(e);
                }
            };

            self.counters.read_wide += wide as u64;
            let sentinel = &mut self.chain.stages[0];
            sentinel.odone = 0;
            sentinel.olen = wide * self.combiner.channels as usize;

            let flow = self.flow_effect_out();
            let snap = self.snapshot();
            self.status
                .update(&snap, self.signals.aborted() || flow.is_err());
            match flow {
                Ok(true) => {
                    source_done = true;
                    break Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    write_failed = true;
                    break Err(e);
                }
            }
            if self.signals.aborted() {
                break Ok(());
            }
        };
        run_result?;

        // Drain buffered residue, unless the sink already failed or the
        // user aborted.
        if !write_failed && !self.signals.aborted() {
            self.drain_effect_out()?;
        }
        let snap = self.snapshot();
        self.status.update(&snap, true);
        Ok(source_done)
    }

    // --- Sentinel refill -------------------------------------------------

    fn refill_sentinel(&mut self) -> Result<Refill> {
        if self.method.is_serial() {
            self.refill_serial()
        } else {
            self.refill_parallel()
        }
    }

    fn refill_serial(&mut self) -> Result<Refill> {
        let channels = self.combiner.channels as usize;
        let wide_cap = self.chain.buffer_size / channels;
        loop {
            let mut wide = 0;
            if !self.signals.skip_requested() {
                let buf = &mut self.chain.stages[0].obuf[..wide_cap * channels];
                wide = self.inputs[*self.current_input].read_wide(buf);
            }
            if wide == 0 {
                let snap = self.snapshot();
                self.status.update(&snap, true);
                if self.signals.skip_requested() {
                    self.signals.clear_skip();
                    eprintln!("Skipped.");
                }
                *self.current_input += 1;
                if *self.current_input < self.inputs.len() {
                    if self.method == CombineMethod::Sequence
                        && !can_segue(self.inputs, *self.current_input)
                    {
                        return Ok(Refill::SegueBreak);
                    }
                    self.progress_to_input(*self.current_input);
                    continue;
                }
                return Ok(Refill::Exhausted);
            }
            let buf = &mut self.chain.stages[0].obuf[..wide * channels];
            self.inputs[*self.current_input].balance(buf);
            return Ok(Refill::Samples(wide));
        }
    }

    fn refill_parallel(&mut self) -> Result<Refill> {
        let out_channels = self.combiner.channels as usize;
        let wide_cap = self.chain.buffer_size / out_channels;
        let mut widest = 0;
        let mut wides = vec![0usize; self.inputs.len()];

        for (i, input) in self.inputs.iter_mut().enumerate() {
            let in_channels = input.info().channels as usize;
            let buf = &mut self.ibufs[i][..wide_cap * in_channels];
            let wide = input.read_wide(buf);
            input.balance(&mut buf[..wide * in_channels]);
            wides[i] = wide;
            widest = widest.max(wide);
        }
        if widest == 0 {
            return Ok(Refill::Exhausted);
        }

        let sentinel = &mut self.chain.stages[0].obuf;
        let mixing = self.method == CombineMethod::Mix;
        let mut p = 0;
        for ws in 0..widest {
            if mixing {
                for c in 0..out_channels {
                    let mut acc = 0f64;
                    for (i, input) in self.inputs.iter().enumerate() {
                        let in_channels = input.info().channels as usize;
                        if ws < wides[i] && c < in_channels {
                            acc += self.ibufs[i][ws * in_channels + c] as f64;
                        }
                    }
                    sentinel[p] = mezcla_core::round_clip(acc, &mut self.counters.mixing_clips);
                    p += 1;
                }
            } else {
                // merge: all inputs' channels side by side; short inputs
                // pad with silence.
                for (i, input) in self.inputs.iter().enumerate() {
                    let in_channels = input.info().channels as usize;
                    for c in 0..in_channels {
                        sentinel[p] = if ws < wides[i] {
                            self.ibufs[i][ws * in_channels + c]
                        } else {
                            0
                        };
                        p += 1;
                    }
                }
            }
        }
        Ok(Refill::Samples(widest))
    }

    // --- Flow ------------------------------------------------------------

    /// Pull the chain from the sink backwards until no stage can make
    /// progress, writing sink output as it appears. Returns `true` once an
    /// effect upstream has reported end-of-stream (no further reads will be
    /// looked at).
    fn flow_effect_out(&mut self) -> Result<bool> {
        let n = self.chain.stages.len();
        loop {
            // Run the chain backwards: pull, don't push.
            let mut e = n - 1;
            while e >= 1 && e >= self.input_eff {
                let skip = e == self.input_eff && self.input_eff_eof;
                if !skip {
                    let status = self.flow_effect(e)?;
                    if status == FlowStatus::Eof {
                        self.input_eff = e;
                        self.input_eff_eof = false;
                    }
                    // A stage holding unconsumed data flushes to the sink
                    // before anything upstream runs again.
                    if self.chain.stages[e].pending() > 0 {
                        break;
                    }
                }
                if e == 1 {
                    break;
                }
                e -= 1;
            }

            self.write_sink_output()?;
            // Stop cold on aborts; the sink may be unwritable.
            if self.signals.aborted() {
                return Ok(self.input_eff > 0);
            }

            // Anything still buffered anywhere?
            let out_channels = self.chain.output_signal().channels as usize;
            let mut havedata = false;
            let mut e = n - 1;
            loop {
                let stage = &mut self.chain.stages[e];
                stage.recycle();
                if stage.pending() > 0 {
                    if stage.pending() >= out_channels {
                        havedata = true;
                    } else {
                        tracing::warn!("received buffer with incomplete number of samples");
                    }
                }
                if e == 0 || e == self.input_eff {
                    break;
                }
                e -= 1;
            }

            if !havedata && self.input_eff > 0 {
                // The pull point is dry; prime the pump from its drain.
                if self.input_eff_eof {
                    self.input_eff += 1;
                    self.input_eff_eof = false;
                }
                while self.input_eff < n {
                    let rc = self.drain_effect(self.input_eff)?;
                    if self.chain.stages[self.input_eff].olen == 0 {
                        self.input_eff += 1;
                        self.input_eff_eof = false;
                    } else {
                        havedata = true;
                        self.input_eff_eof = rc == FlowStatus::Eof;
                        break;
                    }
                }
            }

            if !havedata {
                break;
            }
        }
        Ok(self.input_eff > 0)
    }

    /// Write the sink stage's pending output, then reset its window.
    fn write_sink_output(&mut self) -> Result<()> {
        let last = self.chain.stages.len() - 1;
        let out_channels = self.chain.stages[last].output.channels as usize;
        let stage = &mut self.chain.stages[last];
        if stage.olen > stage.odone {
            let mut total = 0;
            while total < stage.olen {
                // No more writing during aborts; we may be stuck in an
                // unwritable-sink loop.
                if self.signals.aborted() {
                    return Ok(());
                }
                let written = self
                    .writer
                    .write(&stage.obuf[total..stage.olen])
                    .map_err(|e| Error::Write(e.to_string()))?;
                if written == 0 {
                    return Err(Error::Write("sink accepted no samples".to_string()));
                }
                total += written;
            }
            self.counters.output_wide += (total / out_channels) as u64;
        } else {
            self.counters.output_wide += (stage.olen / out_channels) as u64;
        }
        stage.odone = 0;
        stage.olen = 0;
        Ok(())
    }

    /// Flow one stage: feed it its predecessor's pending window, collect
    /// into its own free space. Stereo streams through non-multichannel
    /// effects are split, run per side, and re-interleaved; the two sides
    /// must produce identical counts.
    fn flow_effect(&mut self, e: usize) -> Result<FlowStatus> {
        // Aborts poll here so no effect work happens after the signal.
        if self.signals.aborted() {
            return Ok(FlowStatus::Eof);
        }
        let (before, after) = self.chain.stages.split_at_mut(e);
        let prev = &mut before[e - 1];
        let stage = &mut after[0];

        if prev.pending() == 0 {
            tracing::trace!("`{}': no data to pull", stage.name());
            return Ok(FlowStatus::More);
        }

        let capacity = stage.obuf.len();
        let handler = stage.handler.as_mut().expect("sentinel never flows");

        if stage.right.is_none() {
            let input = &prev.obuf[prev.odone..prev.olen];
            let outcome = handler.flow(input, &mut stage.obuf[stage.olen..capacity])?;
            prev.odone += outcome.consumed;
            stage.olen += outcome.produced;
            if outcome.status == FlowStatus::Eof {
                return Ok(FlowStatus::Eof);
            }
            if outcome.consumed + outcome.produced == 0 {
                return Err(Error::EffectStalled(handler.name()));
            }
            return Ok(FlowStatus::More);
        }

        // Split path: deinterleave, flow both sides with equal capacity
        // halves, re-interleave. Left takes the extra sample of an
        // odd-length window.
        let input = &prev.obuf[prev.odone..prev.olen];
        let idone = input.len();
        let free = capacity - stage.olen;
        let lefts = idone.div_ceil(2);
        let rights = idone / 2;
        for i in 0..lefts {
            self.split_in_l[i] = input[2 * i];
        }
        for i in 0..rights {
            self.split_in_r[i] = input[2 * i + 1];
        }

        let left = handler.flow(
            &self.split_in_l[..lefts],
            &mut self.split_out_l[..free / 2],
        )?;
        let right_handler = stage.right.as_mut().expect("checked above");
        let right = right_handler.flow(
            &self.split_in_r[..rights],
            &mut self.split_out_r[..free / 2],
        )?;

        if left.produced != right.produced {
            return Err(Error::SplitMismatch(right_handler.name()));
        }
        for i in 0..right.produced {
            stage.obuf[stage.olen + 2 * i] = self.split_out_l[i];
            stage.obuf[stage.olen + 2 * i + 1] = self.split_out_r[i];
        }
        prev.odone += left.consumed + right.consumed;
        stage.olen += left.produced + right.produced;

        let status = if left.status == FlowStatus::Eof {
            FlowStatus::Eof
        } else {
            right.status
        };
        if status == FlowStatus::Eof {
            return Ok(FlowStatus::Eof);
        }
        if left.consumed + right.consumed + left.produced + right.produced == 0 {
            return Err(Error::EffectStalled(
                self.chain.stages[e].handler.as_ref().unwrap().name(),
            ));
        }
        Ok(FlowStatus::More)
    }

    // --- Drain -----------------------------------------------------------

    /// After the inputs are exhausted: prime the pump from the pull point's
    /// drain, then let the normal flow loop push the residue through.
    fn drain_effect_out(&mut self) -> Result<()> {
        if self.input_eff == 0 {
            self.input_eff = 1;
            self.input_eff_eof = false;
        }
        let n = self.chain.stages.len();
        while self.input_eff < n {
            let rc = self.drain_effect(self.input_eff)?;
            if self.chain.stages[self.input_eff].olen == 0 {
                self.input_eff += 1;
                self.input_eff_eof = false;
            } else {
                self.input_eff_eof = rc == FlowStatus::Eof;
                break;
            }
        }
        self.flow_effect_out().map(|_| ())
    }

    /// Ask one stage for buffered residue, filling its output window.
    fn drain_effect(&mut self, e: usize) -> Result<FlowStatus> {
        let stage = &mut self.chain.stages[e];
        let capacity = stage.obuf.len();
        let handler = stage.handler.as_mut().expect("sentinel never drains");

        if stage.right.is_none() {
            let outcome = handler.drain(&mut stage.obuf[..capacity])?;
            stage.olen = outcome.produced;
            stage.odone = 0;
            return Ok(outcome.status);
        }

        let half = capacity / 2;
        let left = handler.drain(&mut self.split_out_l[..half])?;
        let right_handler = stage.right.as_mut().expect("checked above");
        let right = right_handler.drain(&mut self.split_out_r[..half])?;
        if left.produced != right.produced {
            return Err(Error::SplitMismatch(right_handler.name()));
        }
        for i in 0..right.produced {
            stage.obuf[2 * i] = self.split_out_l[i];
            stage.obuf[2 * i + 1] = self.split_out_r[i];
        }
        stage.olen = left.produced + right.produced;
        stage.odone = 0;
        if left.status == FlowStatus::Eof || right.status == FlowStatus::Eof {
            Ok(FlowStatus::Eof)
        } else {
            Ok(FlowStatus::More)
        }
    }
}
