//! Query reconciliation.
//!
//! This module keeps a local directory of query files in step with the
//! remote server:
//!
//! - **Hashing**: SHA256 fingerprints with trailing whitespace trimmed
//! - **Store**: one directory per query holding `query.sql` and `meta.json`
//! - **Engine**: three-way comparison of local, cached, and remote fingerprints
//! - **Prompt / Diff**: operator decisions for local changes and conflicts
//! - **Status**: offline view of local edits, and the run summary
//!
//! # Classification
//!
//! | local vs cached vs remote | state          | action                 |
//! |---------------------------|----------------|------------------------|
//! | no metadata / no body     | new            | pull                   |
//! | L = C = R                 | unchanged      | nothing                |
//! | L = C ≠ R                 | remote updated | pull                   |
//! | C = R ≠ L                 | local modified | ask to push            |
//! | L = R ≠ C                 | converged      | refresh metadata       |
//! | all distinct              | conflict       | ask local/remote/skip  |
//!
//! # Example
//!
//! ```ignore
//! use qsync::remote::HttpRemote;
//! use qsync::sync::{ExternalDiff, FsStore, ReconcileOptions, Reconciler, TerminalPrompter};
//!
//! let remote = HttpRemote::new(url, api_key);
//! let store = FsStore::new("queries");
//! let mut prompter = TerminalPrompter::new(std::io::stdin().lock(), std::io::stdout());
//! let diff = ExternalDiff::default();
//!
//! let mut engine = Reconciler::new(&remote, &store, &mut prompter, &diff, ReconcileOptions::default());
//! let summary = engine.run().await?;
//! ```

mod diff;
mod engine;
mod file;
mod hash;
mod prompt;
mod status;
mod store;
mod types;

pub use diff::{DiffPresenter, ExternalDiff, NoDiff};
pub use engine::{AbortSignal, ReconcileOptions, Reconciler};
pub use file::{atomic_write, read_optional};
pub use hash::{fingerprint, has_changed};
pub use prompt::{ConflictResponse, Prompter, TerminalPrompter, UploadResponse};
pub use status::{get_mirror_status, print_status, print_summary, LocalEntry, LocalState, MirrorStatus};
pub use store::{FsStore, RecordStore, BODY_FILE, META_FILE};
pub use types::{
    ConflictBatch, RunStatus, RunSummary, SyncError, SyncResult, SyncState, ThreeWay, UploadBatch,
};
