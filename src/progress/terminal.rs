use std::io::{self, Write};

use tracing::debug;

use crate::progress::{Progress, render_line};

/// Redraws one console line per pipeline and ends it when the last step
/// completes.
pub struct TerminalProgress;

impl Progress for TerminalProgress {
    fn update(&self, label: &str, done: usize, total: usize, step: &str) {
        debug!(pipeline = label, done, total, step, "progress");

        let line = render_line(label, done, total, step);
        // A closed stdout must not abort a report.
        if let Err(e) = draw(&mut io::stdout().lock(), &line, done >= total) {
            debug!(pipeline = label, error = %e, "progress line not written");
        }
    }
}

/// Overwrite the current line, ending it when `last`.
fn draw(out: &mut impl Write, line: &str, last: bool) -> io::Result<()> {
    if last {
        writeln!(out, "\r{line}")?;
    } else {
        write!(out, "\r{line}")?;
    }
    out.flush()
}
