//! Command-line parsing.
//!
//! The invocation shape is
//!
//! ```text
//! mezcla [gopts] [[fopts] infile]... [fopts] outfile [effect [effopts]]...
//! ```
//!
//! Global options form a leading prefix and are parsed by clap. The rest of
//! the line interleaves per-file options with positional filenames in a way
//! clap cannot model, so a deterministic token walker consumes it: each
//! group of fopts binds to the filename that follows, and the first token
//! naming a known effect switches to effect parsing, where arguments run
//! until the next known effect name.

use clap::Parser;
use mezcla_core::{Encoding, SampleSize, SignalSpec};
use mezcla_pipeline::{CombineMethod, PlotMode, ReplayGainMode};

/// Smallest accepted `--buffer` value.
const BUFFER_MIN: usize = 16;

/// A usage mistake; the message is printed and the process exits 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

fn usage(message: impl Into<String>) -> UsageError {
    UsageError(message.into())
}

/// Global options (the leading section of the command line).
#[derive(Parser, Debug, Default)]
#[command(
    name = "mezcla",
    about = "mezcla - audio manipulation pipeline",
    disable_version_flag = true
)]
pub struct GlobalArgs {
    /// Per-stage buffer size in samples
    #[arg(long, value_name = "SAMPLES")]
    pub buffer: Option<usize>,

    /// How to combine multiple input files
    #[arg(long, value_enum, value_name = "METHOD")]
    pub combine: Option<CombineArg>,

    /// Mix input files (same as --combine mix)
    #[arg(short = 'm')]
    pub mix: bool,

    /// Merge input files (same as --combine merge)
    #[arg(short = 'M')]
    pub merge: bool,

    /// Prompt before overwriting an existing output file
    #[arg(long)]
    pub interactive: bool,

    /// Show usage of the named effect, or of all effects
    #[arg(long, value_name = "NAME")]
    pub help_effect: Option<String>,

    /// Generate plotting commands for filter effects
    #[arg(long, value_enum, value_name = "MODE")]
    pub plot: Option<PlotArg>,

    /// Apply replay gain found in input comments
    #[arg(long, value_enum, value_name = "MODE")]
    pub replay_gain: Option<ReplayGainArg>,

    /// Use default random numbers (identical on every run)
    #[arg(short = 'R')]
    pub repeatable: bool,

    /// Display progress while processing
    #[arg(short = 'S')]
    pub show_progress: bool,

    /// Run in quiet mode; opposite of -S
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Verbosity level (1 failures, 2 warnings, 3 details, 4+ debug)
    #[arg(
        short = 'V',
        value_name = "LEVEL",
        num_args = 0..=1,
        default_missing_value = "3"
    )]
    pub verbosity: Option<u32>,

    /// Display the version number and exit
    #[arg(long)]
    pub version: bool,
}

/// `--combine` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum CombineArg {
    /// One input after another, chain rebuilt between them.
    Sequence,
    /// Inputs end-to-end as a single stream.
    Concatenate,
    /// Sum all inputs.
    Mix,
    /// Channels side by side.
    Merge,
}

impl From<CombineArg> for CombineMethod {
    fn from(value: CombineArg) -> Self {
        match value {
            CombineArg::Sequence => CombineMethod::Sequence,
            CombineArg::Concatenate => CombineMethod::Concatenate,
            CombineArg::Mix => CombineMethod::Mix,
            CombineArg::Merge => CombineMethod::Merge,
        }
    }
}

/// `--replay-gain` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum ReplayGainArg {
    /// Ignore replay-gain tags.
    Off,
    /// Prefer track gain.
    Track,
    /// Prefer album gain.
    Album,
}

impl From<ReplayGainArg> for ReplayGainMode {
    fn from(value: ReplayGainArg) -> Self {
        match value {
            ReplayGainArg::Off => ReplayGainMode::Off,
            ReplayGainArg::Track => ReplayGainMode::Track,
            ReplayGainArg::Album => ReplayGainMode::Album,
        }
    }
}

/// `--plot` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum PlotArg {
    /// No plotting.
    Off,
    /// GNU Octave commands.
    Octave,
    /// gnuplot commands.
    Gnuplot,
}

impl From<PlotArg> for PlotMode {
    fn from(value: PlotArg) -> Self {
        match value {
            PlotArg::Off => PlotMode::Off,
            PlotArg::Octave => PlotMode::Octave,
            PlotArg::Gnuplot => PlotMode::Gnuplot,
        }
    }
}

/// One file mentioned on the command line, with its bound options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSpec {
    /// Path (`-` = stdio, `-n` = null device).
    pub path: String,
    /// Explicit `-t` type.
    pub type_hint: Option<String>,
    /// Format overrides.
    pub spec: SignalSpec,
    /// Input volume multiplier (`-v`).
    pub volume: Option<f64>,
    /// Output comment (`--comment` / `--comment-file`).
    pub comment: Option<String>,
}

/// A parsed command line.
#[derive(Debug)]
pub struct Invocation {
    /// Global options.
    pub globals: GlobalArgs,
    /// Files in order; the last one is the output.
    pub files: Vec<FileSpec>,
    /// Effects with their arguments, in chain order.
    pub effects: Vec<(String, Vec<String>)>,
}

/// What `parse` decided.
pub enum Parsed {
    /// A run to perform.
    Run(Invocation),
    /// Help or version text was printed; exit with this code.
    Exit(u8),
}

/// Parse a full argument vector (excluding the program name).
pub fn parse(args: &[String]) -> Result<Parsed, UsageError> {
    let (global_tokens, rest) = split_globals(args);

    let mut clap_args = vec!["mezcla".to_string()];
    clap_args.extend(global_tokens);
    let globals = match GlobalArgs::try_parse_from(&clap_args) {
        Ok(globals) => globals,
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
            print!("{e}");
            print_formats_and_effects();
            return Ok(Parsed::Exit(0));
        }
        Err(e) => return Err(usage(e.to_string())),
    };

    if globals.version {
        println!("mezcla: v{}", env!("CARGO_PKG_VERSION"));
        return Ok(Parsed::Exit(0));
    }
    if let Some(name) = &globals.help_effect {
        print_effect_usage(name);
        return Ok(Parsed::Exit(0));
    }
    if let Some(buffer) = globals.buffer {
        if buffer <= BUFFER_MIN {
            return Err(usage(format!("buffer size must be > {BUFFER_MIN}")));
        }
    }

    let (files, effects) = parse_files_and_effects(&rest)?;
    Ok(Parsed::Run(Invocation {
        globals,
        files,
        effects,
    }))
}

/// Split the leading global-option section off the raw argument list.
fn split_globals(args: &[String]) -> (Vec<String>, Vec<String>) {
    const NO_VALUE: &[&str] = &[
        "-m",
        "-M",
        "-R",
        "-S",
        "-q",
        "-h",
        "--help",
        "--interactive",
        "--version",
    ];
    const WITH_VALUE: &[&str] = &[
        "--buffer",
        "--combine",
        "--plot",
        "--replay-gain",
        "--help-effect",
    ];

    let mut prefix = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let tok = args[i].as_str();
        if NO_VALUE.contains(&tok) {
            prefix.push(args[i].clone());
            i += 1;
        } else if WITH_VALUE.contains(&tok) {
            prefix.push(args[i].clone());
            if i + 1 < args.len() {
                prefix.push(args[i + 1].clone());
                i += 2;
            } else {
                i += 1;
            }
        } else if WITH_VALUE
            .iter()
            .any(|w| tok.starts_with(w) && tok.as_bytes().get(w.len()) == Some(&b'='))
        {
            prefix.push(args[i].clone());
            i += 1;
        } else if tok == "-V" || (tok.starts_with("-V") && tok[2..].chars().all(|c| c.is_ascii_digit()))
        {
            prefix.push(args[i].clone());
            i += 1;
        } else {
            break;
        }
    }
    (prefix, args[i..].to_vec())
}

/// Walk the `[[fopts] file]... [effect [effopts]]...` tail.
fn parse_files_and_effects(
    tokens: &[String],
) -> Result<(Vec<FileSpec>, Vec<(String, Vec<String>)>), UsageError> {
    let mut files = Vec::new();
    let mut i = 0;

    while i < tokens.len() && !mezcla_effects::is_effect_name(&tokens[i]) {
        let mut f = FileSpec::default();
        let is_null = parse_fopts(tokens, &mut i, &mut f)?;

        if is_null {
            if let Some(hint) = &f.type_hint {
                if hint != "null" {
                    tracing::warn!("ignoring `-t {hint}'");
                }
            }
            f.type_hint = Some("null".to_string());
            f.path = "-n".to_string();
            files.push(f);
            continue;
        }

        if i >= tokens.len() || mezcla_effects::is_effect_name(&tokens[i]) {
            if f != FileSpec::default() {
                return Err(usage("missing filename"));
            }
            break;
        }

        let name = tokens[i].clone();
        i += 1;
        if crate::playlist::is_playlist(&name) {
            crate::playlist::expand(&f, &name, &mut files).map_err(usage)?;
        } else {
            f.path = name;
            files.push(f);
        }
    }

    let mut effects: Vec<(String, Vec<String>)> = Vec::new();
    while i < tokens.len() {
        let name = tokens[i].clone();
        i += 1;
        if !mezcla_effects::is_effect_name(&name) {
            return Err(usage(format!("effect `{name}' does not exist")));
        }
        let mut args = Vec::new();
        while i < tokens.len() && !mezcla_effects::is_effect_name(&tokens[i]) {
            args.push(tokens[i].clone());
            i += 1;
        }
        effects.push((name, args));
    }

    Ok((files, effects))
}

/// Consume file options at `tokens[*i]`, filling `f`. Returns true when a
/// null-file option was seen.
fn parse_fopts(tokens: &[String], i: &mut usize, f: &mut FileSpec) -> Result<bool, UsageError> {
    let value = |i: &mut usize, opt: &str| -> Result<String, UsageError> {
        *i += 1;
        tokens
            .get(*i - 1)
            .cloned()
            .ok_or_else(|| usage(format!("option `{opt}' requires a value")))
    };

    while *i < tokens.len() {
        let tok = tokens[*i].clone();
        *i += 1;
        match tok.as_str() {
            "-c" | "--channels" => {
                let v = value(i, &tok)?;
                let channels: u32 = v
                    .parse()
                    .ok()
                    .filter(|&c| c > 0)
                    .ok_or_else(|| usage(format!("channels value `{v}' is not a positive integer")))?;
                f.spec.channels = Some(channels);
            }
            "-r" | "--rate" => {
                let v = value(i, &tok)?;
                let rate: u32 = v
                    .parse()
                    .ok()
                    .filter(|&r| r > 0)
                    .ok_or_else(|| usage(format!("rate value `{v}' is not a positive integer")))?;
                f.spec.rate = Some(rate);
            }
            "-t" | "--type" => {
                let v = value(i, &tok)?;
                f.type_hint = Some(v.strip_prefix('.').unwrap_or(&v).to_string());
            }
            "-v" | "--volume" => {
                let v = value(i, &tok)?;
                let volume: f64 = v
                    .parse()
                    .map_err(|_| usage(format!("volume value `{v}' is not a number")))?;
                if volume < 0.0 {
                    tracing::info!(
                        "volume adjustment is negative; this will result in a phase change"
                    );
                }
                f.volume = Some(volume);
            }
            "-C" | "--compression" => {
                let v = value(i, &tok)?;
                let c: f64 = v
                    .parse()
                    .map_err(|_| usage(format!("compression value `{v}' is not a number")))?;
                f.spec.compression = Some(c);
            }
            "--comment" => f.comment = Some(value(i, &tok)?),
            "--comment-file" => {
                let path = value(i, &tok)?;
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| usage(format!("cannot read comment file {path}: {e}")))?;
                f.comment = Some(text.trim_end_matches('\n').to_string());
            }
            "--endian" => {
                let v = value(i, &tok)?;
                f.spec.reverse_bytes = match v.as_str() {
                    "little" => Some(false),
                    "big" | "swap" => Some(true),
                    _ => {
                        return Err(usage(format!(
                            "--endian: `{v}' is not one of: little, big, swap"
                        )));
                    }
                };
            }
            "-1" => f.spec.size = Some(SampleSize::Byte),
            "-2" => f.spec.size = Some(SampleSize::Word),
            "-3" => f.spec.size = Some(SampleSize::Bytes3),
            "-4" => f.spec.size = Some(SampleSize::DWord),
            "-8" => f.spec.size = Some(SampleSize::QWord),
            "-s" => f.spec.encoding = Some(Encoding::Signed),
            "-u" => f.spec.encoding = Some(Encoding::Unsigned),
            "-f" => f.spec.encoding = Some(Encoding::Float),
            "-a" => f.spec.encoding = Some(Encoding::Adpcm),
            "-D" => f.spec.encoding = Some(Encoding::MsAdpcm),
            "-i" => f.spec.encoding = Some(Encoding::ImaAdpcm),
            "-o" => f.spec.encoding = Some(Encoding::OkiAdpcm),
            "-g" => f.spec.encoding = Some(Encoding::Gsm),
            "-U" => {
                f.spec.encoding = Some(Encoding::Ulaw);
                f.spec.size.get_or_insert(SampleSize::Byte);
            }
            "-A" => {
                f.spec.encoding = Some(Encoding::Alaw);
                f.spec.size.get_or_insert(SampleSize::Byte);
            }
            "-L" => f.spec.reverse_bytes = Some(false),
            "-B" => f.spec.reverse_bytes = Some(true),
            "-x" => f.spec.reverse_bytes = Some(true),
            "-X" => f.spec.reverse_bits = Some(true),
            "-N" => f.spec.reverse_nibbles = Some(true),
            "-e" | "-n" => return Ok(true),
            _ => {
                if tok.starts_with('-') && tok.len() > 1 {
                    return Err(usage(format!("invalid option `{tok}'")));
                }
                // A filename; hand it back.
                *i -= 1;
                return Ok(false);
            }
        }
    }
    Ok(false)
}

/// Print the formats and effects summary appended to `--help`.
fn print_formats_and_effects() {
    let mut names: Vec<&str> = mezcla_io::formats()
        .iter()
        .flat_map(|f| f.names().iter().copied())
        .collect();
    names.push("m3u");
    names.push("pls");
    names.sort_unstable();
    println!("\nSUPPORTED FILE FORMATS: {}", names.join(" "));

    let effects: Vec<&str> = mezcla_effects::all_effects()
        .iter()
        .map(|e| e.name)
        .collect();
    println!("\nSUPPORTED EFFECTS: {}", effects.join(" "));
}

/// Print usage for one effect, or all of them.
fn print_effect_usage(which: &str) {
    println!("Effect usage:\n");
    let mut found = false;
    for desc in mezcla_effects::all_effects() {
        if which == "all" || which == desc.name {
            println!("{} {}", desc.name, desc.usage);
            found = true;
        }
    }
    if !found {
        println!("no effect named `{which}'; try --help-effect all");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn parse_run(args: &[&str]) -> Invocation {
        match parse(&argv(args)).unwrap() {
            Parsed::Run(inv) => inv,
            Parsed::Exit(_) => panic!("expected a run"),
        }
    }

    #[test]
    fn plain_copy_invocation() {
        let inv = parse_run(&["in.wav", "out.wav"]);
        assert_eq!(inv.files.len(), 2);
        assert_eq!(inv.files[0].path, "in.wav");
        assert_eq!(inv.files[1].path, "out.wav");
        assert!(inv.effects.is_empty());
    }

    #[test]
    fn globals_then_files_then_effects() {
        let inv = parse_run(&["-m", "--buffer", "1024", "a.wav", "b.wav", "out.wav", "vol", "0.5"]);
        assert!(inv.globals.mix);
        assert_eq!(inv.globals.buffer, Some(1024));
        assert_eq!(inv.files.len(), 3);
        assert_eq!(inv.effects, vec![("vol".to_string(), vec!["0.5".to_string()])]);
    }

    #[test]
    fn file_options_bind_to_following_file() {
        let inv = parse_run(&["-r", "8000", "-c", "1", "-t", "raw", "-s", "-2", "in.raw", "out.wav"]);
        let f = &inv.files[0];
        assert_eq!(f.spec.rate, Some(8000));
        assert_eq!(f.spec.channels, Some(1));
        assert_eq!(f.type_hint.as_deref(), Some("raw"));
        assert_eq!(f.spec.encoding, Some(Encoding::Signed));
        assert_eq!(f.spec.size, Some(SampleSize::Word));
        assert!(inv.files[1].spec.is_empty());
    }

    #[test]
    fn type_strips_leading_dot() {
        let inv = parse_run(&["-t", ".wav", "-", "out.wav"]);
        assert_eq!(inv.files[0].type_hint.as_deref(), Some("wav"));
        assert_eq!(inv.files[0].path, "-");
    }

    #[test]
    fn ulaw_defaults_size_to_one_byte() {
        let inv = parse_run(&["-U", "-r", "8000", "-c", "1", "x.raw", "out.wav"]);
        assert_eq!(inv.files[0].spec.encoding, Some(Encoding::Ulaw));
        assert_eq!(inv.files[0].spec.size, Some(SampleSize::Byte));
    }

    #[test]
    fn null_file_option() {
        let inv = parse_run(&["in.wav", "-n"]);
        assert_eq!(inv.files[1].path, "-n");
        assert_eq!(inv.files[1].type_hint.as_deref(), Some("null"));
    }

    #[test]
    fn volume_parses_and_binds() {
        let inv = parse_run(&["-v", "0.5", "a.wav", "-v", "2.0", "b.wav", "out.wav"]);
        assert_eq!(inv.files[0].volume, Some(0.5));
        assert_eq!(inv.files[1].volume, Some(2.0));
        assert_eq!(inv.files[2].volume, None);
    }

    #[test]
    fn effects_split_on_known_names() {
        let inv = parse_run(&["in.wav", "out.wav", "trim", "10", "5", "vol", "2.0"]);
        assert_eq!(
            inv.effects,
            vec![
                ("trim".to_string(), vec!["10".to_string(), "5".to_string()]),
                ("vol".to_string(), vec!["2.0".to_string()]),
            ]
        );
    }

    #[test]
    fn dangling_fopts_is_an_error() {
        assert!(parse(&argv(&["in.wav", "out.wav", "-r"])).is_err());
        assert!(parse(&argv(&["-r", "8000"])).is_err());
    }

    #[test]
    fn unknown_option_is_an_error() {
        assert!(parse(&argv(&["--frobnicate", "in.wav", "out.wav"])).is_err());
        assert!(parse(&argv(&["-Z", "in.wav", "out.wav"])).is_err());
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(parse(&argv(&["-r", "fast", "in.wav", "out.wav"])).is_err());
        assert!(parse(&argv(&["-r", "0", "in.wav", "out.wav"])).is_err());
        assert!(parse(&argv(&["-c", "-2", "in.wav", "out.wav"])).is_err());
        assert!(parse(&argv(&["--buffer", "8", "in.wav", "out.wav"])).is_err());
    }

    #[test]
    fn endian_values() {
        let inv = parse_run(&["--endian", "big", "in.raw", "out.wav"]);
        assert_eq!(inv.files[0].spec.reverse_bytes, Some(true));
        let inv = parse_run(&["--endian", "little", "in.raw", "out.wav"]);
        assert_eq!(inv.files[0].spec.reverse_bytes, Some(false));
        assert!(parse(&argv(&["--endian", "middle", "in.raw", "out.wav"])).is_err());
    }

    #[test]
    fn verbosity_forms() {
        let inv = parse_run(&["-V", "in.wav", "out.wav"]);
        assert_eq!(inv.globals.verbosity, Some(3));
        let inv = parse_run(&["-V4", "in.wav", "out.wav"]);
        assert_eq!(inv.globals.verbosity, Some(4));
        let inv = parse_run(&["in.wav", "out.wav"]);
        assert_eq!(inv.globals.verbosity, None);
    }

    #[test]
    fn split_globals_stops_at_first_file_token() {
        let (prefix, rest) = split_globals(&argv(&["-m", "--buffer=512", "-v", "1.0", "a.wav"]));
        assert_eq!(prefix, argv(&["-m", "--buffer=512"]));
        assert_eq!(rest, argv(&["-v", "1.0", "a.wav"]));
    }
}
