//! Integration tests for the mezcla binary.
//!
//! These invoke the real executable end-to-end: option parsing, file
//! opening, the pipeline, and exit codes.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn mezcla() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mezcla"))
}

fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        w.write_sample(s).unwrap();
    }
    w.finalize().unwrap();
}

fn read_wav(path: &Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

#[test]
fn version_flag() {
    let out = mezcla().arg("--version").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("mezcla: v"), "{stdout}");
}

#[test]
fn help_lists_formats_and_effects() {
    let out = mezcla().arg("--help").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("SUPPORTED FILE FORMATS:"), "{stdout}");
    assert!(stdout.contains("wav"), "{stdout}");
    assert!(stdout.contains("SUPPORTED EFFECTS:"), "{stdout}");
    assert!(stdout.contains("vol"), "{stdout}");
}

#[test]
fn help_effect_prints_usage() {
    let out = mezcla().args(["--help-effect", "vol"]).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("vol"), "{stdout}");
    assert!(stdout.contains("FACTOR"), "{stdout}");
}

#[test]
fn missing_filenames_is_a_usage_error() {
    let out = mezcla().output().unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn bad_effect_arguments_are_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    write_wav(&src, 8000, 1, &[1, 2, 3]);
    // `vol' without its factor.
    let out = mezcla()
        .arg(&src)
        .arg(dir.path().join("out.wav"))
        .arg("vol")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));

    // An unknown word after an effect becomes its argument and fails
    // that effect's parsing.
    let out = mezcla()
        .arg(&src)
        .arg(dir.path().join("out2.wav"))
        .args(["trim", "1", "reverb"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn copies_a_file_bit_for_bit() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    let dst = dir.path().join("out.wav");
    let samples: Vec<i16> = (0..10000).map(|i| ((i * 31) % 20000 - 10000) as i16).collect();
    write_wav(&src, 44100, 2, &samples);

    let out = mezcla().arg(&src).arg(&dst).output().unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(read_wav(&dst), samples);
}

#[test]
fn vol_effect_applies() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    let dst = dir.path().join("out.wav");
    write_wav(&src, 8000, 1, &[100, -50]);

    let out = mezcla()
        .arg(&src)
        .arg(&dst)
        .args(["vol", "2.0"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(read_wav(&dst), vec![200, -100]);
}

#[test]
fn mix_flag_combines_two_inputs() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    let dst = dir.path().join("out.wav");
    write_wav(&a, 8000, 1, &[200; 100]);
    write_wav(&b, 8000, 1, &[400; 100]);

    let out = mezcla().arg("-m").arg(&a).arg(&b).arg(&dst).output().unwrap();
    assert!(out.status.success());
    assert_eq!(read_wav(&dst), vec![300; 100]);
}

#[test]
fn rate_mismatch_on_concatenate_fails() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    write_wav(&a, 8000, 1, &[1]);
    write_wav(&b, 44100, 1, &[2]);

    let out = mezcla()
        .arg(&a)
        .arg(&b)
        .arg(dir.path().join("out.wav"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn output_rate_override_resamples() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    let dst = dir.path().join("out.wav");
    write_wav(&src, 8000, 1, &[250; 4000]);

    let out = mezcla()
        .arg(&src)
        .args(["-r", "4000"])
        .arg(&dst)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let got = read_wav(&dst);
    assert!((got.len() as i64 - 2000).abs() <= 2, "{}", got.len());
    assert!(got.iter().all(|&s| s == 250));
}

#[test]
fn null_output_with_no_effects_reports_info() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    write_wav(&src, 44100, 2, &[0; 882]);

    let out = mezcla().arg(&src).arg("-n").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Sample Rate    : 44100"), "{stdout}");
    assert!(stdout.contains("Channels       : 2"), "{stdout}");
}

#[test]
fn raw_input_requires_parameters() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("in.raw");
    std::fs::write(&raw, [0u8; 64]).unwrap();

    // No rate/channels/encoding: open fails.
    let out = mezcla()
        .arg(&raw)
        .arg(dir.path().join("out.wav"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));

    // Fully specified: works.
    let dst = dir.path().join("out2.wav");
    let out = mezcla()
        .args(["-r", "8000", "-c", "1", "-s", "-2"])
        .arg(&raw)
        .arg(&dst)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(read_wav(&dst).len(), 32);
}

#[test]
fn playlist_inputs_expand() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    let list = dir.path().join("list.m3u");
    let dst = dir.path().join("out.wav");
    write_wav(&a, 8000, 1, &[1; 10]);
    write_wav(&b, 8000, 1, &[2; 10]);
    std::fs::write(&list, "a.wav\nb.wav\n").unwrap();

    let out = mezcla().arg(&list).arg(&dst).output().unwrap();
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let got = read_wav(&dst);
    let mut want = vec![1i16; 10];
    want.extend_from_slice(&[2; 10]);
    assert_eq!(got, want);
}

#[test]
fn misplaced_volume_on_output_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("in.wav");
    write_wav(&src, 8000, 1, &[1]);

    let out = mezcla()
        .arg(&src)
        .args(["-v", "2.0"])
        .arg(dir.path().join("out.wav"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}
