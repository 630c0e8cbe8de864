//! mezcla - command-line audio manipulation driver.

mod opts;
mod playlist;

use mezcla_core::EffectError;
use mezcla_core::EffectHandler;
use mezcla_pipeline::{
    CombineMethod, Error, GlobalInfo, InputFile, OutputFile, Run, Signals,
};
use opts::{Invocation, Parsed, UsageError};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

/// Most input files on one command line.
const MAX_INPUT_FILES: usize = 32;

/// What the program name implies about defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Personality {
    Sox,
    Play,
    Rec,
}

fn personality() -> Personality {
    let name = std::env::args().next().unwrap_or_default();
    let base = std::path::Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.ends_with("play") {
        Personality::Play
    } else if base.ends_with("rec") {
        Personality::Rec
    } else {
        Personality::Sox
    }
}

fn init_tracing(verbosity: u32) {
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 | 1 => "error",
        2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match opts::parse(&args) {
        Ok(Parsed::Run(inv)) => inv,
        Ok(Parsed::Exit(code)) => return ExitCode::from(code),
        Err(UsageError(message)) => {
            eprintln!("mezcla: {message}");
            eprintln!("try `mezcla --help' for more information");
            return ExitCode::from(1);
        }
    };

    init_tracing(invocation.globals.verbosity.unwrap_or(2));

    match drive(invocation) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mezcla: {e}");
            let code = match &e {
                Error::Usage(_) => 1,
                Error::Effect(EffectError::Usage { .. }) => 1,
                _ => 2,
            };
            ExitCode::from(code)
        }
    }
}

fn drive(invocation: Invocation) -> Result<ExitCode, Error> {
    let Invocation {
        globals,
        mut files,
        effects,
    } = invocation;
    let personality = personality();

    let mut method = match personality {
        Personality::Play => CombineMethod::Sequence,
        _ => CombineMethod::Concatenate,
    };
    if let Some(combine) = globals.combine {
        method = combine.into();
    }
    if globals.mix {
        method = CombineMethod::Mix;
    }
    if globals.merge {
        method = CombineMethod::Merge;
    }

    // `play` appends a device output, `rec` prepends a device input; this
    // build carries no device codec.
    if personality != Personality::Sox {
        return Err(Error::Usage(
            "sorry, there is no default audio device configured".to_string(),
        ));
    }

    if files.len() < 2 {
        return Err(Error::Usage("not enough filenames specified".to_string()));
    }
    let input_count = files.len() - 1;
    if input_count > MAX_INPUT_FILES {
        return Err(Error::Usage(format!(
            "too many filenames; maximum is {MAX_INPUT_FILES} input files and 1 output file"
        )));
    }
    if input_count < method.min_inputs() {
        return Err(Error::Usage(format!(
            "`--combine {}' requires at least {} input files",
            method.name(),
            method.min_inputs()
        )));
    }

    // Misplaced input/output-specific options.
    let output_spec = files.pop().expect("checked above");
    for f in &files {
        if f.spec.compression.is_some() {
            return Err(Error::Usage(
                "a compression factor can only be given for an output file".to_string(),
            ));
        }
        if f.comment.is_some() {
            return Err(Error::Usage(
                "a comment can only be given for an output file".to_string(),
            ));
        }
    }
    if output_spec.volume.is_some() {
        return Err(Error::Usage(
            "-v can only be given for an input file; use `vol' to set the output file volume"
                .to_string(),
        ));
    }

    // Configure the effect prototypes once; each segment duplicates them.
    let mut user_effects: Vec<Box<dyn EffectHandler>> = Vec::new();
    for (name, args) in &effects {
        let mut effect = mezcla_effects::create(name)
            .ok_or_else(|| Error::Usage(format!("effect `{name}' does not exist")))?;
        if effect.flags().contains(mezcla_core::EffectFlags::DEPRECATED) {
            tracing::warn!("effect `{name}' is deprecated and may be removed in a future release");
        }
        effect.getopts(args)?;
        user_effects.push(effect);
    }

    let output_is_null = mezcla_io::resolve(&output_spec.path, output_spec.type_hint.as_deref())
        .map(|f| f.flags().phony)
        .unwrap_or(false);

    let mut inputs: Vec<InputFile> = files
        .into_iter()
        .map(|f| {
            let mut input = InputFile::new(f.path, f.type_hint, f.spec);
            input.volume = f.volume;
            input
        })
        .collect();

    // With no effects and a null output there is nothing to do but report
    // what the inputs contain.
    if user_effects.is_empty() && output_is_null {
        for input in &mut inputs {
            input.open(globals.replay_gain.map(Into::into).unwrap_or_default())?;
            report_input(input);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut run_globals = GlobalInfo::default();
    if let Some(buffer) = globals.buffer {
        run_globals.buffer_size = buffer;
    }
    if let Some(mode) = globals.replay_gain {
        run_globals.replay_gain = mode.into();
    }
    if let Some(plot) = globals.plot {
        run_globals.plot = plot.into();
    }
    run_globals.repeatable_random = globals.repeatable;
    run_globals.show_progress = if globals.quiet {
        false
    } else {
        globals.show_progress
    };

    let signals = Arc::new(Signals::new());
    {
        let signals = Arc::clone(&signals);
        if let Err(e) = ctrlc::set_handler(move || signals.interrupt()) {
            tracing::warn!("cannot install interrupt handler: {e}");
        }
    }

    let output = OutputFile {
        path: output_spec.path,
        type_hint: output_spec.type_hint,
        spec: output_spec.spec,
        comment: output_spec.comment,
    };

    let interactive = globals.interactive;
    let overwrite = move |path: &str| -> bool {
        if !interactive {
            tracing::info!("overwriting `{path}'");
            return true;
        }
        tracing::warn!("output file `{path}' already exists");
        if !std::io::stdin().is_terminal() {
            return false;
        }
        loop {
            eprint!("mezcla: overwrite `{path}' (y/n)? ");
            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_err() {
                return false;
            }
            match answer.trim() {
                "y" | "Y" => return true,
                "n" | "N" => return false,
                _ => {}
            }
        }
    };

    let mut run = Run::new(inputs, output, method, run_globals, user_effects, signals);
    run.execute(&overwrite)?;
    Ok(ExitCode::SUCCESS)
}

/// Print a short description of an opened input.
fn report_input(input: &InputFile) {
    let info = input.info();
    println!("Input File     : '{}'", input.path);
    println!("Sample Size    : {}-bit", info.size.bits());
    println!("Sample Encoding: {}", info.encoding.name());
    println!("Channels       : {}", info.channels);
    println!("Sample Rate    : {}", info.rate);
    if info.length != 0 && info.rate != 0 {
        let wide = info.wide_length();
        let seconds = wide as f64 / info.rate as f64;
        println!("Duration       : {seconds:.2}s = {wide} samples");
    }
    if let Some(gain) = input.replay_gain {
        println!("Replay gain    : {gain:+} dB");
    }
    if let Some(comment) = input.comment() {
        println!("Comment        : '{comment}'");
    }
    println!();
}
