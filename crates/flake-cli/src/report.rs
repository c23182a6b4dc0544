//! Final report printed when a run ends.

use std::ffi::OsString;
use std::io::{self, Write};

use flake_core::progress::average_suffix;
use flake_core::{RunEnd, RunReport};

/// Print the report to stderr.
pub fn print(report: &RunReport, argv: &[OsString]) -> io::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write(&mut out, report, argv)?;
    out.flush()
}

/// Write the report. The failing run's output is copied byte for byte.
pub fn write(out: &mut impl Write, report: &RunReport, argv: &[OsString]) -> io::Result<()> {
    match &report.end {
        RunEnd::Interrupted => writeln!(
            out,
            "Quit after {} iteration(s){}",
            report.successes,
            average_suffix(report.average)
        ),
        RunEnd::Failed(failure) => {
            writeln!(out, "Failed after {} successful iteration(s):", report.successes)?;
            writeln!(out, "Command failed: {}:", failure)?;
            out.write_all(&failure.output)
        }
        RunEnd::SpawnError(e) => {
            writeln!(out, "Failed after {} successful iteration(s):", report.successes)?;
            writeln!(out, "Error running {:?}: {}", argv, e)
        }
    }
}
