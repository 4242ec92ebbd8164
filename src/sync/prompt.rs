//! Interactive decisions.
//!
//! Two question shapes exist: whether to upload a local change, and how to
//! resolve a conflict. Answers are free text matched case-insensitively;
//! anything unrecognized (including empty input and end of input) falls back
//! to the safe choice, which never touches either side.

use std::io::{BufRead, Write};

use crate::sync::types::SyncResult;

/// Answer to "push this local change?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResponse {
    Confirm,
    Decline,
    ConfirmAll,
    DeclineAll,
    Abort,
}

impl UploadResponse {
    /// Parse an answer. Unrecognized input declines.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Self::Confirm,
            "n" | "no" => Self::Decline,
            "a" | "all" => Self::ConfirmAll,
            "d" | "none" => Self::DeclineAll,
            "q" | "quit" | "abort" => Self::Abort,
            _ => Self::Decline,
        }
    }
}

/// Answer to "how should this conflict be resolved?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResponse {
    KeepLocal,
    TakeRemote,
    Skip,
    KeepLocalAll,
    TakeRemoteAll,
}

impl ConflictResponse {
    /// Parse an answer. Unrecognized input skips.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "l" | "local" => Self::KeepLocal,
            "r" | "remote" => Self::TakeRemote,
            "s" | "skip" => Self::Skip,
            "la" | "local-all" => Self::KeepLocalAll,
            "ra" | "remote-all" => Self::TakeRemoteAll,
            _ => Self::Skip,
        }
    }
}

/// Source of operator decisions.
pub trait Prompter {
    /// Ask whether to push the local change to `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn ask_upload(&mut self, label: &str) -> SyncResult<UploadResponse>;

    /// Ask how to resolve the conflict on `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the answer cannot be read.
    fn ask_conflict(&mut self, label: &str) -> SyncResult<ConflictResponse>;

    /// Show an informational line, such as the header before a question.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written.
    fn notice(&mut self, message: &str) -> SyncResult<()>;
}

/// Line-oriented prompter over any reader/writer pair.
///
/// Blocks until a full line is available; there is no timeout. Questions
/// and notices share one output, so JSON runs can point it at stderr.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
    notices: bool,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    /// Create a prompter over explicit streams.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            notices: true,
        }
    }

    /// Suppress notices. Questions are still written.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.notices = false;
        self
    }

    /// Write the question and read one line. End of input yields "".
    fn ask(&mut self, question: &str) -> SyncResult<String> {
        write!(self.output, "{question} ")?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line)
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn ask_upload(&mut self, label: &str) -> SyncResult<UploadResponse> {
        let answer = self.ask(&format!(
            "Push local changes to {label}? [y]es / [N]o / [a]ll / [d] none / [q]uit:"
        ))?;
        Ok(UploadResponse::parse(&answer))
    }

    fn ask_conflict(&mut self, label: &str) -> SyncResult<ConflictResponse> {
        let answer = self.ask(&format!(
            "Resolve {label}: [l]ocal / [r]emote / [S]kip / [la] local-all / [ra] remote-all:"
        ))?;
        Ok(ConflictResponse::parse(&answer))
    }

    fn notice(&mut self, message: &str) -> SyncResult<()> {
        if self.notices {
            writeln!(self.output, "{message}")?;
        }
        Ok(())
    }
}
