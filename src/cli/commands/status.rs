//! Status command implementation.

use crate::config::resolve_mirror_dir;
use crate::error::Result;
use crate::sync::{get_mirror_status, print_status, FsStore, LocalEntry, LocalState};
use serde::Serialize;
use std::path::PathBuf;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput<'a> {
    mirror_dir: String,
    clean: bool,
    total: usize,
    modified: usize,
    missing_body: usize,
    untracked: usize,
    entries: &'a [LocalEntry],
}

/// Execute status command.
///
/// Works offline: only the mirror directory is inspected.
///
/// # Errors
///
/// Returns an error if the mirror cannot be scanned.
pub fn execute(dir: Option<&PathBuf>, json: bool) -> Result<()> {
    let mirror_dir = resolve_mirror_dir(dir.map(PathBuf::as_path));
    let store = FsStore::new(mirror_dir.clone());
    let status = get_mirror_status(&store)?;

    if json {
        let output = StatusOutput {
            mirror_dir: mirror_dir.display().to_string(),
            clean: status.is_clean(),
            total: status.entries.len(),
            modified: status.count(LocalState::Modified),
            missing_body: status.count(LocalState::MissingBody),
            untracked: status.count(LocalState::Untracked),
            entries: &status.entries,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Mirror: {}", mirror_dir.display());
        print_status(&status);
    }

    Ok(())
}
