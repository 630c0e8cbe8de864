//! Chain assembly.
//!
//! The chain is the ordered sequence of stages the scheduler drives. Index
//! 0 is the input sentinel, whose buffer the combiner fills; the last stage
//! feeds the output sink. The builder inserts the default rate and channel
//! converters where the combined input and the requested output disagree,
//! at the cheapest position: reductions run before user effects (less data
//! to process downstream), expansions after.

use crate::{Error, Result};
use mezcla_core::{
    EffectFlags, EffectHandler, LogicalSignal, Placement, Stage, Started,
};

/// An assembled effects chain.
pub struct Chain {
    /// Stages; index 0 is the input sentinel.
    pub stages: Vec<Stage>,
    /// Per-stage output buffer capacity in samples.
    pub buffer_size: usize,
}

impl Chain {
    /// The signal the sink stage produces.
    pub fn output_signal(&self) -> LogicalSignal {
        self.stages.last().expect("chain is never empty").output
    }
}

/// Append `handler` to `stages`, assigning its placement and materializing
/// the right-channel twin when the effect cannot handle the stream width.
fn add_effect(
    stages: &mut Vec<Stage>,
    handler: Box<dyn EffectHandler>,
    running: &mut LogicalSignal,
    target: LogicalSignal,
    buffer_size: usize,
) -> Result<()> {
    let flags = handler.flags();
    let input = *running;
    let output = LogicalSignal {
        rate: if flags.contains(EffectFlags::RATE) {
            target.rate
        } else {
            input.rate
        },
        channels: if flags.contains(EffectFlags::CHAN) {
            target.channels
        } else {
            input.channels
        },
    };

    let right = if input.channels > 1 && !flags.contains(EffectFlags::MULTICHAN) {
        if input.channels > 2 {
            return Err(Error::Usage(format!(
                "effect `{}' cannot handle {}-channel audio",
                handler.name(),
                input.channels
            )));
        }
        Some(handler.duplicate())
    } else {
        None
    };

    stages.push(Stage::new(handler, right, input, output, buffer_size));
    *running = output;
    Ok(())
}

/// Instantiate a default converter effect with empty arguments.
fn default_effect(name: &str) -> Result<Box<dyn EffectHandler>> {
    let mut handler = mezcla_effects::create(name)
        .ok_or_else(|| Error::Usage(format!("default effect `{name}' does not exist")))?;
    handler.getopts(&[])?;
    Ok(handler)
}

/// Assemble the chain for one run segment.
///
/// `user_effects` are configured prototypes; each is duplicated in, so the
/// same prototypes can seed a rebuilt chain for the next sequenced input.
pub fn build(
    combiner: LogicalSignal,
    output: LogicalSignal,
    user_effects: &[Box<dyn EffectHandler>],
    buffer_size: usize,
) -> Result<Chain> {
    let mut need_rate = combiner.rate != output.rate;
    let mut need_chan = combiner.channels != output.channels;

    let mut user_chan_effects = 0;
    let mut user_rate_effects = 0;
    for effect in user_effects {
        if effect.flags().contains(EffectFlags::CHAN) {
            need_chan = false;
            user_chan_effects += 1;
        }
        if effect.flags().contains(EffectFlags::RATE) {
            need_rate = false;
            user_rate_effects += 1;
        }
    }
    if user_chan_effects > 1 {
        return Err(Error::Usage(
            "cannot specify multiple effects that change the number of channels".to_string(),
        ));
    }
    if user_rate_effects > 1 {
        tracing::warn!("multiple effects that change the sample rate");
    }

    let mut stages = vec![Stage::sentinel(combiner, buffer_size)];
    let mut running = combiner;

    // Reducing channels first is cheaper: everything downstream sees less
    // data. Same for rate.
    if need_chan && combiner.channels > output.channels {
        add_effect(&mut stages, default_effect("mixer")?, &mut running, output, buffer_size)?;
        need_chan = false;
    }
    if need_rate && combiner.rate > output.rate {
        add_effect(
            &mut stages,
            default_effect("resample")?,
            &mut running,
            output,
            buffer_size,
        )?;
        need_rate = false;
    }
    for effect in user_effects {
        add_effect(&mut stages, effect.duplicate(), &mut running, output, buffer_size)?;
    }
    if need_rate {
        add_effect(
            &mut stages,
            default_effect("resample")?,
            &mut running,
            output,
            buffer_size,
        )?;
    }
    if need_chan {
        add_effect(&mut stages, default_effect("mixer")?, &mut running, output, buffer_size)?;
    }

    Ok(Chain {
        stages,
        buffer_size,
    })
}

/// Start every effect in order, removing the ones that report themselves
/// no-ops so the scheduler never observes them.
pub fn start(chain: &mut Chain) -> Result<()> {
    let mut started = Vec::with_capacity(chain.stages.len());
    for (i, mut stage) in chain.stages.drain(..).enumerate() {
        if i == 0 {
            started.push(stage);
            continue;
        }
        let placement = Placement {
            input: stage.input,
            output: stage.output,
        };
        let handler = stage.handler.as_mut().expect("non-sentinel stage");
        if handler.flags().contains(EffectFlags::NULL) {
            tracing::info!("`{}' has no effect (is a proxy effect)", handler.name());
            continue;
        }
        match handler.start(&placement)? {
            Started::NoOp => {
                tracing::warn!("`{}' has no effect in this configuration", handler.name());
                continue;
            }
            Started::Ready => {}
        }
        if let Some(right) = stage.right.as_mut() {
            if right.start(&placement)? == Started::NoOp {
                // The left side decides; a one-sided no-op cannot happen for
                // twins built from the same configuration.
                return Err(Error::SplitMismatch(stage.handler.as_ref().unwrap().name()));
            }
        }
        started.push(stage);
    }
    chain.stages = started;

    for stage in &chain.stages[1..] {
        tracing::debug!(
            "effects chain: {:10} {:6} {}Hz",
            stage.name(),
            match (stage.input.channels, stage.right.is_some()) {
                (1, _) => "mono",
                (_, true) => "stereo",
                _ => "multi",
            },
            stage.input.rate
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(chain: &Chain) -> Vec<&'static str> {
        chain.stages.iter().map(|s| s.name()).collect()
    }

    fn effect(name: &str, args: &[&str]) -> Box<dyn EffectHandler> {
        let mut e = mezcla_effects::create(name).unwrap();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        e.getopts(&args).unwrap();
        e
    }

    #[test]
    fn identity_chain_has_only_sentinel() {
        let sig = LogicalSignal::new(44100, 2);
        let mut chain = build(sig, sig, &[], 8192).unwrap();
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input"]);
    }

    #[test]
    fn rate_reduction_goes_first() {
        let mut chain = build(
            LogicalSignal::new(48000, 2),
            LogicalSignal::new(44100, 2),
            &[effect("vol", &["0.5"])],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input", "resample", "vol"]);
        assert_eq!(chain.stages[1].output.rate, 44100);
        assert_eq!(chain.output_signal().rate, 44100);
    }

    #[test]
    fn rate_increase_goes_last() {
        let mut chain = build(
            LogicalSignal::new(44100, 1),
            LogicalSignal::new(48000, 1),
            &[effect("vol", &["0.5"])],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input", "vol", "resample"]);
    }

    #[test]
    fn channel_reduction_before_rate_reduction() {
        let mut chain = build(
            LogicalSignal::new(48000, 2),
            LogicalSignal::new(44100, 1),
            &[],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input", "mixer", "resample"]);
        assert_eq!(chain.stages[1].output.channels, 1);
        // The resampler runs on the already-narrowed stream.
        assert_eq!(chain.stages[2].input.channels, 1);
    }

    #[test]
    fn channel_increase_goes_last() {
        let chain = build(
            LogicalSignal::new(44100, 1),
            LogicalSignal::new(44100, 2),
            &[],
            8192,
        )
        .unwrap();
        assert_eq!(names(&chain), vec!["input", "mixer"]);
    }

    #[test]
    fn noop_effects_are_compacted_at_start() {
        let sig = LogicalSignal::new(44100, 1);
        let mut chain = build(sig, sig, &[effect("vol", &["1.0"])], 8192).unwrap();
        assert_eq!(chain.stages.len(), 2);
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input"]);
    }

    #[test]
    fn non_multichan_effect_gets_right_twin_on_stereo() {
        let mut chain = build(
            LogicalSignal::new(48000, 2),
            LogicalSignal::new(44100, 2),
            &[],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        assert_eq!(names(&chain), vec!["input", "resample"]);
        assert!(chain.stages[1].right.is_some());
    }

    #[test]
    fn multichan_effect_has_no_twin() {
        let sig = LogicalSignal::new(44100, 2);
        let mut chain = build(sig, sig, &[effect("vol", &["2.0"])], 8192).unwrap();
        start(&mut chain).unwrap();
        assert!(chain.stages[1].right.is_none());
    }

    #[test]
    fn mono_effect_on_mono_has_no_twin() {
        let mut chain = build(
            LogicalSignal::new(48000, 1),
            LogicalSignal::new(44100, 1),
            &[],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        assert!(chain.stages[1].right.is_none());
    }

    #[test]
    fn adjacent_stage_signals_agree() {
        let mut chain = build(
            LogicalSignal::new(48000, 2),
            LogicalSignal::new(22050, 1),
            &[effect("vol", &["0.5"]), effect("trim", &["1"])],
            8192,
        )
        .unwrap();
        start(&mut chain).unwrap();
        for pair in chain.stages.windows(2) {
            assert_eq!(pair[0].output, pair[1].input);
        }
        assert_eq!(chain.output_signal(), LogicalSignal::new(22050, 1));
    }

    #[test]
    fn two_channel_changers_rejected() {
        let result = build(
            LogicalSignal::new(44100, 2),
            LogicalSignal::new(44100, 1),
            &[effect("mixer", &[]), effect("mixer", &[])],
            8192,
        );
        assert!(matches!(result, Err(Error::Usage(_))));
    }
}
