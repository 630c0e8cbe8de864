//! Periodic status emission.
//!
//! The scheduler drives the status line: at most one redraw every ~150 ms,
//! plus one unconditional update at end-of-stream or on a fatal error. The
//! line shows elapsed/remaining/total time, percentage, samples written and
//! the aggregate clip count.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Minimum interval between redraws.
const REDRAW_EVERY: Duration = Duration::from_millis(150);

/// A point-in-time view of the run's counters.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    /// Wide samples read from the current input(s).
    pub read_wide: u64,
    /// Expected wide samples; 0 if unknown.
    pub input_wide: u64,
    /// Wide samples written to the sink.
    pub output_wide: u64,
    /// Aggregate clip count across all accounting sites.
    pub clips: u64,
    /// Combiner sample rate, for time display.
    pub rate: u32,
}

/// The status line, drawn on stderr via an `indicatif` bar.
pub struct Status {
    bar: Option<ProgressBar>,
    last: Option<Instant>,
}

impl Status {
    /// Create a status emitter; disabled emitters ignore every update.
    pub fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            bar.set_style(ProgressStyle::with_template("{msg}").expect("static template"));
            bar
        });
        Status { bar, last: None }
    }

    /// Redraw if forced or if the redraw interval has passed.
    pub fn update(&mut self, snap: &StatusSnapshot, force: bool) {
        let Some(bar) = &self.bar else { return };
        let now = Instant::now();
        if !force && self.last.is_some_and(|t| now.duration_since(t) < REDRAW_EVERY) {
            return;
        }
        self.last = Some(now);
        bar.set_message(render(snap));
    }

    /// Tear the line down and print the final verdict.
    pub fn finish(&mut self, aborted: bool) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            eprintln!("{}", if aborted { "Aborted." } else { "Done." });
        }
    }
}

fn render(snap: &StatusSnapshot) -> String {
    let rate = snap.rate.max(1) as f64;
    let read_time = snap.read_wide as f64 / rate;
    let (in_time, left_time, percent) = if snap.input_wide > 0 {
        let in_time = snap.input_wide as f64 / rate;
        let left = (in_time - read_time).max(0.0);
        let percent = (100.0 * snap.read_wide as f64 / snap.input_wide as f64).max(0.0);
        (in_time, left, percent)
    } else {
        (0.0, 0.0, 0.0)
    };
    format!(
        "Time: {} [{}] of {} ({:.1}%) Samples out: {} Clips: {}",
        format_time(read_time),
        format_time(left_time),
        format_time(in_time),
        percent,
        sigfigs(snap.output_wide),
        sigfigs(snap.clips),
    )
}

/// `MM:SS.ss` with minutes unbounded.
fn format_time(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u64;
    format!("{:02}:{:05.2}", mins, seconds - mins as f64 * 60.0)
}

/// Three significant figures with a metric suffix.
fn sigfigs(n: u64) -> String {
    const SUFFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];
    if n < 1000 {
        return n.to_string();
    }
    let mut value = n as f64;
    let mut idx = 0;
    while value >= 1000.0 && idx + 1 < SUFFIXES.len() {
        value /= 1000.0;
        idx += 1;
    }
    if value >= 100.0 {
        format!("{value:.0}{}", SUFFIXES[idx])
    } else if value >= 10.0 {
        format!("{value:.1}{}", SUFFIXES[idx])
    } else {
        format!("{value:.2}{}", SUFFIXES[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(0.0), "00:00.00");
        assert_eq!(format_time(61.5), "01:01.50");
        assert_eq!(format_time(3723.25), "62:03.25");
    }

    #[test]
    fn sigfigs_scaling() {
        assert_eq!(sigfigs(0), "0");
        assert_eq!(sigfigs(999), "999");
        assert_eq!(sigfigs(1500), "1.50k");
        assert_eq!(sigfigs(44100), "44.1k");
        assert_eq!(sigfigs(44_100_000), "44.1M");
        assert_eq!(sigfigs(123_456_789), "123M");
    }

    #[test]
    fn render_with_known_length() {
        let line = render(&StatusSnapshot {
            read_wide: 22050,
            input_wide: 44100,
            output_wide: 22050,
            clips: 0,
            rate: 44100,
        });
        assert!(line.contains("00:00.50"), "{line}");
        assert!(line.contains("50.0%"), "{line}");
        assert!(line.contains("Clips: 0"), "{line}");
    }

    #[test]
    fn render_with_unknown_length() {
        let line = render(&StatusSnapshot {
            read_wide: 44100,
            input_wide: 0,
            output_wide: 44100,
            clips: 2,
            rate: 44100,
        });
        assert!(line.starts_with("Time: 00:01.00"), "{line}");
        assert!(line.contains("of 00:00.00"), "{line}");
    }

    #[test]
    fn disabled_status_is_inert() {
        let mut status = Status::new(false);
        status.update(
            &StatusSnapshot {
                read_wide: 1,
                input_wide: 2,
                output_wide: 3,
                clips: 4,
                rate: 8000,
            },
            true,
        );
        status.finish(false);
    }
}
