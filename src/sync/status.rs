//! Mirror status and run summary display.
//!
//! Status is computed offline: each local body is fingerprinted and compared
//! with the fingerprint cached at last sync. No remote access is needed, so
//! this only tells whether local edits exist, not whether the server moved.

use colored::Colorize;
use serde::Serialize;

use crate::model::QueryId;
use crate::sync::hash::{fingerprint, has_changed};
use crate::sync::store::RecordStore;
use crate::sync::types::{RunSummary, SyncResult};

/// Local state of one mirrored query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalState {
    /// Body matches the fingerprint recorded at last sync.
    Clean,
    /// Body was edited since last sync.
    Modified,
    /// Metadata exists but the body file is gone.
    MissingBody,
    /// Directory exists without metadata; the next sync treats it as new.
    Untracked,
}

/// One row of the status listing.
#[derive(Debug, Clone, Serialize)]
pub struct LocalEntry {
    pub id: QueryId,
    pub name: Option<String>,
    pub state: LocalState,
}

/// Status of the whole mirror.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorStatus {
    pub entries: Vec<LocalEntry>,
}

impl MirrorStatus {
    /// Number of entries in `state`.
    #[must_use]
    pub fn count(&self, state: LocalState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Whether every entry is clean.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.state == LocalState::Clean)
    }
}

/// Compute the status of every record in the store.
///
/// # Errors
///
/// Returns an error if the store cannot be scanned or a record cannot be read.
pub fn get_mirror_status(store: &dyn RecordStore) -> SyncResult<MirrorStatus> {
    let mut entries = Vec::new();

    for id in store.list_ids()? {
        let meta = store.read_metadata(&id)?;
        let body = store.read_body(&id)?;

        let (name, state) = match (meta, body) {
            (None, _) => (None, LocalState::Untracked),
            (Some(meta), None) => (Some(meta.name), LocalState::MissingBody),
            (Some(meta), Some(body)) => {
                let state = if has_changed(&fingerprint(&body), Some(&meta.content_hash)) {
                    LocalState::Modified
                } else {
                    LocalState::Clean
                };
                (Some(meta.name), state)
            }
        };

        entries.push(LocalEntry { id, name, state });
    }

    Ok(MirrorStatus { entries })
}

/// Print mirror status to stdout in a human-readable format.
pub fn print_status(status: &MirrorStatus) {
    println!("{}", "Mirror Status".bold().underline());
    println!();

    if status.entries.is_empty() {
        println!("No queries mirrored yet. Run `qsync sync` to pull them.");
        return;
    }

    let dirty: Vec<&LocalEntry> = status
        .entries
        .iter()
        .filter(|e| e.state != LocalState::Clean)
        .collect();

    if dirty.is_empty() {
        println!("{}", "No local changes.".green());
    } else {
        println!("{}", "Local Changes:".yellow().bold());
        for entry in dirty {
            let marker = match entry.state {
                LocalState::Modified => "modified".yellow(),
                LocalState::MissingBody => "missing body".red(),
                LocalState::Untracked => "untracked".blue(),
                LocalState::Clean => "clean".normal(),
            };
            let name = entry.name.as_deref().unwrap_or("-");
            println!("  {:>8}  {marker:<12}  {name}", entry.id.as_str());
        }
    }

    println!();
    println!(
        "  Total: {} queries ({} clean, {} modified, {} missing body, {} untracked)",
        status.entries.len(),
        status.count(LocalState::Clean),
        status.count(LocalState::Modified),
        status.count(LocalState::MissingBody),
        status.count(LocalState::Untracked),
    );
}

/// Print a run summary to stdout in a human-readable format.
pub fn print_summary(summary: &RunSummary) {
    println!();
    if summary.is_interrupted() {
        println!("{}", "Sync interrupted".yellow().bold());
    } else {
        println!("{}", "Sync complete".green().bold());
    }

    let rows = [
        ("New", summary.new),
        ("Pulled", summary.pulled),
        ("Pushed", summary.pushed),
        ("Unchanged", summary.unchanged),
        ("Skipped", summary.skipped),
        ("Conflicts", summary.conflicts),
        ("Failed", summary.failed),
        ("Rejected", summary.rejected),
    ];
    for (label, count) in rows {
        if count > 0 {
            println!("  {:<10} {count}", format!("{label}:"));
        }
    }
    println!("  Total: {} queries", summary.total);

    if summary.conflicts > 0 {
        println!(
            "{}",
            "Unresolved conflicts will be offered again on the next sync.".yellow()
        );
    }
}
