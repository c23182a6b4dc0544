//! Progress display for a running flake hunt.
//!
//! On a terminal a single line is redrawn in place; anywhere else each update
//! is appended as its own line so logs stay readable.

use std::io::{self, IsTerminal, Stdout, Write};
use std::time::Duration;

/// How progress lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStyle {
    /// Overwrite the current line (`\r` prefix, no newline).
    Redraw,
    /// One line per update.
    Append,
}

impl ProgressStyle {
    /// Pick a style for stdout. Resolved once at startup.
    pub fn detect() -> Self {
        if io::stdout().is_terminal() {
            Self::Redraw
        } else {
            Self::Append
        }
    }
}

/// Writes progress updates to an output stream.
///
/// Write errors are ignored: progress is cosmetic and must never end a run.
pub struct Progress<W = Stdout> {
    out: W,
    style: ProgressStyle,
}

impl Progress<Stdout> {
    pub fn stdout(style: ProgressStyle) -> Self {
        Self::new(io::stdout(), style)
    }
}

impl<W: Write> Progress<W> {
    pub fn new(out: W, style: ProgressStyle) -> Self {
        Self { out, style }
    }

    /// Show the current success count and average latency.
    pub fn update(&mut self, successes: u64, average: Option<Duration>) {
        let line = progress_line(successes, average);
        let _ = match self.style {
            ProgressStyle::Redraw => write!(self.out, "\r{}", line),
            ProgressStyle::Append => writeln!(self.out, "{}", line),
        };
        let _ = self.out.flush();
    }

    /// Return the cursor to the start of the line before the final report.
    pub fn finish(&mut self) {
        if self.style == ProgressStyle::Redraw {
            let _ = write!(self.out, "\r");
            let _ = self.out.flush();
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn progress_line(successes: u64, average: Option<Duration>) -> String {
    format!("{} iterations{}...", successes, average_suffix(average))
}

/// ` (avg = <dur>)`, or nothing when there is no average yet.
pub fn average_suffix(average: Option<Duration>) -> String {
    match average {
        Some(avg) => format!(" (avg = {})", format_duration(avg)),
        None => String::new(),
    }
}

/// Compact human-readable duration: `2m3.500s`, `1.234s`, `15.2ms`, `850µs`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        let rem = d - Duration::from_secs(secs / 60 * 60);
        format!("{}m{:.3}s", secs / 60, rem.as_secs_f64())
    } else if secs >= 1 {
        format!("{:.3}s", d.as_secs_f64())
    } else if d.as_millis() >= 1 {
        format!("{:.1}ms", d.as_secs_f64() * 1e3)
    } else {
        format!("{}µs", d.as_micros())
    }
}
