//! Sync command implementation.
//!
//! Reconciles the local mirror with the server. Settings come from flags,
//! environment, or `~/.qsync/config.json`; see [`crate::config`].

use crate::cli::SyncArgs;
use crate::config::resolve_settings;
use crate::error::{Error, Result};
use crate::remote::HttpRemote;
use crate::sync::{
    print_summary, DiffPresenter, ExternalDiff, FsStore, NoDiff, ReconcileOptions, Reconciler,
    RunSummary, TerminalPrompter,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if settings are incomplete, the server cannot be
/// reached, or the mirror cannot be read or written. A partial summary is
/// printed before a mid-run failure is returned. `quiet` suppresses
/// notices, diffs, and the human summary; questions are still asked.
pub fn execute(
    args: &SyncArgs,
    dir: Option<&PathBuf>,
    url: Option<&str>,
    api_key: Option<&str>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let settings = resolve_settings(url, api_key, dir.map(PathBuf::as_path))?;
    info!(
        url = %settings.base_url,
        mirror = %settings.mirror_dir.display(),
        dry_run = args.dry_run,
        "Starting sync"
    );

    let remote = HttpRemote::new(settings.base_url.as_str(), settings.api_key.as_str());
    let store = FsStore::new(settings.mirror_dir.clone());

    // Keep stdout clean for JSON consumers.
    let prompt_out: Box<dyn Write> = if json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut prompter = TerminalPrompter::new(io::stdin().lock(), prompt_out);
    if quiet {
        prompter = prompter.quiet();
    }

    let diff: Box<dyn DiffPresenter> = if args.no_diff || json || quiet {
        Box::new(NoDiff)
    } else {
        Box::new(ExternalDiff::new(
            "git",
            colored::control::SHOULD_COLORIZE.should_colorize(),
        ))
    };

    let options = ReconcileOptions {
        dry_run: args.dry_run,
        upload_batch: args.on_local_change.into(),
        conflict_batch: args.on_conflict.into(),
    };

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    let mut engine = Reconciler::new(&remote, &store, &mut prompter, diff.as_ref(), options);

    let (summary, result) = match rt.block_on(engine.run()) {
        Ok(summary) => (summary, Ok(())),
        Err(e) => (engine.summary().clone(), Err(Error::from(e))),
    };

    if json {
        let output = serde_json::json!({
            "success": result.is_ok(),
            "dry_run": args.dry_run,
            "mirror_dir": settings.mirror_dir.display().to_string(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if !quiet {
        print_report(&summary, &settings.mirror_dir, args.dry_run);
    }

    result
}

fn print_report(summary: &RunSummary, mirror_dir: &Path, dry_run: bool) {
    if dry_run {
        println!("Dry run: no files written, nothing pushed.");
    }
    print_summary(summary);
    if summary.total > 0 {
        println!("  Location: {}", mirror_dir.display());
    }
}
