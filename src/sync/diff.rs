//! Diff rendering between local and remote bodies.
//!
//! Rendering is best-effort: when the diff tool is missing or fails, a short
//! notice is printed instead and reconciliation carries on.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use colored::Colorize;
use tempfile::NamedTempFile;
use tracing::debug;

/// Renders the difference between two bodies.
pub trait DiffPresenter {
    /// Show how `local` differs from `remote`, with `local` as the "after" side.
    fn present(&self, local: &str, remote: &str, label: &str);
}

/// Presenter that renders nothing. Used for `--no-diff` and unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiff;

impl DiffPresenter for NoDiff {
    fn present(&self, _local: &str, _remote: &str, _label: &str) {}
}

/// Presenter that shells out to `git diff --no-index`.
///
/// Both bodies are written to uniquely-named files in the system temp
/// directory, which are removed once the diff has been printed.
#[derive(Debug, Clone)]
pub struct ExternalDiff {
    program: String,
    color: bool,
}

impl Default for ExternalDiff {
    fn default() -> Self {
        Self::new("git", true)
    }
}

impl ExternalDiff {
    /// Use `program` as the git executable.
    pub fn new(program: impl Into<String>, color: bool) -> Self {
        Self {
            program: program.into(),
            color,
        }
    }

    fn render(&self, local: &str, remote: &str, label: &str) -> io::Result<()> {
        let remote_file = temp_body(label, "remote", remote)?;
        let local_file = temp_body(label, "local", local)?;

        let color = if self.color { "--color=always" } else { "--color=never" };
        // Exit status 1 means "files differ", which is the expected case.
        let status = Command::new(&self.program)
            .args(["diff", "--no-index", color, "--"])
            .arg(remote_file.path())
            .arg(local_file.path())
            .stdin(Stdio::null())
            .status()?;

        match status.code() {
            Some(0 | 1) => Ok(()),
            _ => Err(io::Error::other(format!("{} exited with {status}", self.program))),
        }
    }
}

impl DiffPresenter for ExternalDiff {
    fn present(&self, local: &str, remote: &str, label: &str) {
        if let Err(e) = self.render(local, remote, label) {
            debug!(error = %e, label, "Diff rendering failed");
            println!("{}", format!("(diff unavailable for {label}: {e})").dimmed());
        }
    }
}

/// Write one side of a diff to a temp file that is removed on drop.
fn temp_body(label: &str, side: &str, body: &str) -> io::Result<NamedTempFile> {
    let safe_label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let prefix = format!("qsync-{safe_label}-{side}-");

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".sql")
        .tempfile()?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    Ok(file)
}
