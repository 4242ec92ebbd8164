//! Three-way reconciliation between the remote server and the local mirror.
//!
//! The engine walks the remote stream one query at a time. For each query it
//! reads the local snapshot, fingerprints the local and remote bodies,
//! classifies the triple (local, cached, remote), and then pulls, pushes,
//! skips, or asks the operator. Nothing for the next query starts before the
//! current one is fully written back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::model::{QueryMeta, RemoteQuery};
use crate::remote::{QueryStream, RemoteSource};
use crate::sync::diff::DiffPresenter;
use crate::sync::hash::fingerprint;
use crate::sync::prompt::{ConflictResponse, Prompter, UploadResponse};
use crate::sync::store::RecordStore;
use crate::sync::types::{
    ConflictBatch, RunStatus, RunSummary, SyncResult, SyncState, ThreeWay, UploadBatch,
};

/// Cooperative stop request, checked between records.
///
/// Raising it never interrupts a record mid-write; the engine finishes the
/// current record's bookkeeping and then stops pulling from the stream.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a signal in the lowered state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next safe point.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs for one reconciliation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Classify and count only: no writes, no pushes, no prompts.
    pub dry_run: bool,
    /// Initial value of the Local Modified batch slot.
    pub upload_batch: UploadBatch,
    /// Initial value of the conflict batch slot.
    pub conflict_batch: ConflictBatch,
}

/// Drives a single reconciliation run.
///
/// Batch slots live on the instance, so separate runs in one process never
/// share sticky decisions.
pub struct Reconciler<'a, S: RemoteSource> {
    remote: &'a S,
    store: &'a dyn RecordStore,
    prompter: &'a mut dyn Prompter,
    diff: &'a dyn DiffPresenter,
    dry_run: bool,
    upload_batch: UploadBatch,
    conflict_batch: ConflictBatch,
    abort: AbortSignal,
    summary: RunSummary,
}

impl<'a, S: RemoteSource> Reconciler<'a, S> {
    /// Create an engine over its collaborators.
    pub fn new(
        remote: &'a S,
        store: &'a dyn RecordStore,
        prompter: &'a mut dyn Prompter,
        diff: &'a dyn DiffPresenter,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            remote,
            store,
            prompter,
            diff,
            dry_run: options.dry_run,
            upload_batch: options.upload_batch,
            conflict_batch: options.conflict_batch,
            abort: AbortSignal::new(),
            summary: RunSummary::default(),
        }
    }

    /// Handle for requesting a stop from outside the engine.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Counters accumulated so far. Meaningful after a failed run too.
    #[must_use]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Current Local Modified batch slot.
    #[must_use]
    pub fn upload_batch(&self) -> UploadBatch {
        self.upload_batch
    }

    /// Current conflict batch slot.
    #[must_use]
    pub fn conflict_batch(&self) -> ConflictBatch {
        self.conflict_batch
    }

    /// Consume the remote stream and reconcile every query.
    ///
    /// Stops early if the abort signal is raised, in which case the
    /// summary status is [`RunStatus::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns an error if the remote stream fails or the local mirror
    /// cannot be read or written. Push failures are not errors; they are
    /// counted and the run continues.
    pub async fn run(&mut self) -> SyncResult<RunSummary> {
        let mut stream = QueryStream::new(self.remote);

        loop {
            if self.abort.is_raised() {
                self.summary.status = RunStatus::Interrupted;
                break;
            }

            let next = stream.next().await;
            self.summary.rejected = stream.rejected();
            let Some(query) = next? else {
                break;
            };

            self.summary.total += 1;
            self.reconcile(query).await?;
        }

        stream.close();
        Ok(self.summary.clone())
    }

    async fn reconcile(&mut self, remote: RemoteQuery) -> SyncResult<()> {
        let id = remote.id.clone();
        let meta = self.store.read_metadata(&id)?;
        let local_body = self.store.read_body(&id)?;

        let three = ThreeWay {
            local: local_body.as_deref().map(fingerprint),
            cached: meta.map(|m| m.content_hash),
            remote: fingerprint(&remote.body),
        };
        let state = three.classify();
        debug!(id = %id, %state, "Classified query");

        if self.dry_run {
            self.tally_dry_run(state, &remote);
            return Ok(());
        }

        match state {
            SyncState::New => {
                self.pull(&remote, &three.remote)?;
                self.summary.new += 1;
                info!(id = %id, name = %remote.name, "Pulled new query");
            }
            SyncState::Unchanged => {
                self.summary.unchanged += 1;
            }
            SyncState::RemoteUpdated => {
                self.pull(&remote, &three.remote)?;
                self.summary.pulled += 1;
                info!(id = %id, name = %remote.name, "Pulled remote update");
            }
            SyncState::Converged => {
                // Bodies agree; only the cached fingerprint is stale.
                let local = local_body.unwrap_or_default();
                let meta = QueryMeta::from_remote(&remote, three.remote.clone(), Utc::now());
                self.store.write(&id, &local, &meta)?;
                self.summary.unchanged += 1;
                debug!(id = %id, "Refreshed metadata for converged query");
            }
            SyncState::LocalModified => {
                let local = local_body.unwrap_or_default();
                self.resolve_local_change(&remote, &local).await?;
            }
            SyncState::Conflict => {
                let local = local_body.unwrap_or_default();
                self.resolve_conflict(&remote, &local, &three).await?;
            }
        }

        Ok(())
    }

    fn tally_dry_run(&mut self, state: SyncState, remote: &RemoteQuery) {
        match state {
            SyncState::New => self.summary.new += 1,
            SyncState::RemoteUpdated => self.summary.pulled += 1,
            SyncState::Unchanged | SyncState::Converged => self.summary.unchanged += 1,
            SyncState::LocalModified => self.summary.skipped += 1,
            SyncState::Conflict => self.summary.conflicts += 1,
        }
        if state != SyncState::Unchanged {
            info!(id = %remote.id, name = %remote.name, %state, "Dry run: no action taken");
        }
    }

    async fn resolve_local_change(&mut self, remote: &RemoteQuery, local: &str) -> SyncResult<()> {
        let label = label_for(remote);

        let response = match self.upload_batch {
            UploadBatch::PushAll => UploadResponse::Confirm,
            UploadBatch::SkipAll => UploadResponse::Decline,
            UploadBatch::Ask => {
                self.prompter
                    .notice(&format!("{} {label}", "Local changes:".yellow().bold()))?;
                self.diff.present(local, &remote.body, &label);
                self.prompter.ask_upload(&label)?
            }
        };

        match response {
            UploadResponse::Confirm | UploadResponse::ConfirmAll => {
                if response == UploadResponse::ConfirmAll {
                    self.upload_batch = UploadBatch::PushAll;
                }
                if self.push(remote, local).await? {
                    self.summary.pushed += 1;
                } else {
                    self.summary.failed += 1;
                }
            }
            UploadResponse::Decline | UploadResponse::DeclineAll => {
                if response == UploadResponse::DeclineAll {
                    self.upload_batch = UploadBatch::SkipAll;
                }
                self.summary.skipped += 1;
                debug!(id = %remote.id, "Left local changes unpushed");
            }
            UploadResponse::Abort => {
                info!(id = %remote.id, "Abort requested, stopping after this query");
                self.abort.raise();
            }
        }

        Ok(())
    }

    async fn resolve_conflict(
        &mut self,
        remote: &RemoteQuery,
        local: &str,
        three: &ThreeWay,
    ) -> SyncResult<()> {
        let label = label_for(remote);

        self.prompter
            .notice(&format!("{} {label}", "Conflict:".red().bold()))?;
        self.prompter.notice(&format!(
            "  local:  {}\n  cached: {}\n  remote: {}",
            short_hash(three.local.as_deref()),
            short_hash(three.cached.as_deref()),
            short_hash(Some(three.remote.as_str())),
        ))?;

        let response = match self.conflict_batch {
            ConflictBatch::KeepLocalAll => ConflictResponse::KeepLocal,
            ConflictBatch::TakeRemoteAll => ConflictResponse::TakeRemote,
            ConflictBatch::Ask => {
                self.diff.present(local, &remote.body, &label);
                self.prompter.ask_conflict(&label)?
            }
        };

        match response {
            ConflictResponse::KeepLocal | ConflictResponse::KeepLocalAll => {
                if response == ConflictResponse::KeepLocalAll {
                    self.conflict_batch = ConflictBatch::KeepLocalAll;
                }
                if self.push(remote, local).await? {
                    self.summary.pushed += 1;
                } else {
                    self.summary.conflicts += 1;
                }
            }
            ConflictResponse::TakeRemote | ConflictResponse::TakeRemoteAll => {
                if response == ConflictResponse::TakeRemoteAll {
                    self.conflict_batch = ConflictBatch::TakeRemoteAll;
                }
                self.pull(remote, &three.remote)?;
                self.summary.pulled += 1;
                info!(id = %remote.id, "Conflict resolved with remote body");
            }
            ConflictResponse::Skip => {
                self.summary.conflicts += 1;
                debug!(id = %remote.id, "Conflict left unresolved");
            }
        }

        Ok(())
    }

    /// Overwrite the local snapshot with the remote record.
    fn pull(&self, remote: &RemoteQuery, remote_hash: &str) -> SyncResult<()> {
        let meta = QueryMeta::from_remote(remote, remote_hash.to_string(), Utc::now());
        self.store.write(&remote.id, &remote.body, &meta)
    }

    /// Push the local body and store the server's authoritative copy.
    ///
    /// Returns `Ok(false)` when the server rejects the update; the local
    /// snapshot is left untouched in that case.
    async fn push(&self, remote: &RemoteQuery, local: &str) -> SyncResult<bool> {
        let updated = match self.remote.update(&remote.id, local).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(id = %remote.id, error = %e, "Failed to push local changes");
                return Ok(false);
            }
        };

        let hash = fingerprint(&updated.body);
        let meta = QueryMeta::from_remote(&updated, hash, Utc::now());
        self.store.write(&remote.id, &updated.body, &meta)?;
        info!(id = %remote.id, name = %updated.name, "Pushed local changes");
        Ok(true)
    }
}

fn label_for(query: &RemoteQuery) -> String {
    format!("query {} ({})", query.id, query.name)
}

fn short_hash(hash: Option<&str>) -> String {
    hash.map_or_else(|| "(none)".to_string(), |h| h.chars().take(12).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryId;
    use crate::remote::{RemoteError, RemoteResult};
    use crate::sync::store::FsStore;
    use std::cell::RefCell;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use tempfile::TempDir;

    // ── Test doubles ──────────────────────────────────────────────

    #[derive(Default)]
    struct FakeRemote {
        queries: Mutex<Vec<RemoteQuery>>,
        reject_updates: HashSet<String>,
        updates: Mutex<Vec<(String, String)>>,
        trim_on_update: bool,
    }

    impl FakeRemote {
        fn with(queries: Vec<RemoteQuery>) -> Self {
            Self {
                queries: Mutex::new(queries),
                ..Self::default()
            }
        }

        fn set_body(&self, id: &str, body: &str) {
            let mut queries = self.queries.lock().unwrap();
            if let Some(q) = queries.iter_mut().find(|q| q.id.as_str() == id) {
                q.body = body.to_string();
            }
        }

        fn update_count(&self) -> usize {
            self.updates.lock().unwrap().len()
        }
    }

    impl RemoteSource for FakeRemote {
        async fn fetch_page(
            &self,
            page: usize,
            page_size: usize,
        ) -> RemoteResult<Vec<serde_json::Value>> {
            let queries = self.queries.lock().unwrap();
            Ok(queries
                .iter()
                .skip((page - 1) * page_size)
                .take(page_size)
                .map(|q| serde_json::to_value(q).unwrap())
                .collect())
        }

        async fn update(&self, id: &QueryId, body: &str) -> RemoteResult<RemoteQuery> {
            if self.reject_updates.contains(id.as_str()) {
                return Err(RemoteError::Status {
                    operation: "Updating query",
                    url: format!("mock://queries/{id}"),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), body.to_string()));

            let stored = if self.trim_on_update { body.trim_end() } else { body };
            self.set_body(id.as_str(), stored);
            let queries = self.queries.lock().unwrap();
            Ok(queries.iter().find(|q| &q.id == id).cloned().unwrap())
        }
    }

    #[derive(Default)]
    struct ScriptedPrompter {
        uploads: VecDeque<UploadResponse>,
        conflicts: VecDeque<ConflictResponse>,
        upload_asks: usize,
        conflict_asks: usize,
        notices: Vec<String>,
    }

    impl Prompter for ScriptedPrompter {
        fn ask_upload(&mut self, _label: &str) -> SyncResult<UploadResponse> {
            self.upload_asks += 1;
            Ok(self.uploads.pop_front().unwrap_or(UploadResponse::Decline))
        }

        fn ask_conflict(&mut self, _label: &str) -> SyncResult<ConflictResponse> {
            self.conflict_asks += 1;
            Ok(self.conflicts.pop_front().unwrap_or(ConflictResponse::Skip))
        }

        fn notice(&mut self, message: &str) -> SyncResult<()> {
            self.notices.push(message.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDiff {
        shown: RefCell<Vec<(String, String)>>,
    }

    impl DiffPresenter for RecordingDiff {
        fn present(&self, local: &str, remote: &str, _label: &str) {
            self.shown
                .borrow_mut()
                .push((local.to_string(), remote.to_string()));
        }
    }

    // ── Helpers ───────────────────────────────────────────────────

    fn query(id: i64, body: &str) -> RemoteQuery {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        RemoteQuery {
            id: QueryId::from(id),
            name: format!("Query {id}"),
            description: None,
            body: body.to_string(),
            created_at: ts,
            updated_at: ts,
            data_source_id: Some(1),
            user_id: Some(5),
            is_archived: false,
            is_draft: false,
            tags: Vec::new(),
        }
    }

    /// Seed a snapshot whose cached fingerprint is `fingerprint(cached)`.
    fn seed(store: &FsStore, id: i64, local: &str, cached: &str) {
        let meta = QueryMeta::from_remote(&query(id, cached), fingerprint(cached), Utc::now());
        store.write(&QueryId::from(id), local, &meta).unwrap();
    }

    fn cached_hash(store: &FsStore, id: i64) -> String {
        store
            .read_metadata(&QueryId::from(id))
            .unwrap()
            .unwrap()
            .content_hash
    }

    fn local_body(store: &FsStore, id: i64) -> String {
        store.read_body(&QueryId::from(id)).unwrap().unwrap()
    }

    async fn run(
        remote: &FakeRemote,
        store: &FsStore,
        prompter: &mut ScriptedPrompter,
        diff: &RecordingDiff,
        options: ReconcileOptions,
    ) -> RunSummary {
        let mut engine = Reconciler::new(remote, store, prompter, diff, options);
        engine.run().await.unwrap()
    }

    // ── Classification paths ──────────────────────────────────────

    #[tokio::test]
    async fn test_new_query_is_written_locally() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let remote = FakeRemote::with(vec![query(9, "SELECT 9")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.new, 1);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(local_body(&store, 9), "SELECT 9");
        assert_eq!(cached_hash(&store, 9), fingerprint("SELECT 9"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let remote = FakeRemote::with(vec![query(1, "SELECT 1"), query(2, "SELECT 2\n")]);
        let diff = RecordingDiff::default();

        let mut prompter = ScriptedPrompter::default();
        let first = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;
        assert_eq!(first.new, 2);

        let mut prompter = ScriptedPrompter::default();
        let second = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(second.unchanged, 2);
        assert_eq!(second.transferred(), 0);
        assert_eq!(prompter.upload_asks + prompter.conflict_asks, 0);
        assert_eq!(remote.update_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_update_overwrites_local() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 3, "SELECT 1", "SELECT 1");
        let remote = FakeRemote::with(vec![query(3, "SELECT 3")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pulled, 1);
        assert_eq!(local_body(&store, 3), "SELECT 3");
        assert_eq!(cached_hash(&store, 3), fingerprint("SELECT 3"));
    }

    #[tokio::test]
    async fn test_trailing_whitespace_edit_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 4, "SELECT 4\n\n", "SELECT 4");
        let remote = FakeRemote::with(vec![query(4, "SELECT 4")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.unchanged, 1);
        assert_eq!(prompter.upload_asks, 0);
    }

    #[tokio::test]
    async fn test_missing_local_body_is_restored() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 5, "SELECT 5", "SELECT 5");
        std::fs::remove_file(temp_dir.path().join("5").join("query.sql")).unwrap();
        let remote = FakeRemote::with(vec![query(5, "SELECT 5")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.new, 1);
        assert_eq!(local_body(&store, 5), "SELECT 5");
    }

    #[tokio::test]
    async fn test_converged_refreshes_metadata_only() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 6, "SELECT 6 -- edited\n", "SELECT 6");
        let remote = FakeRemote::with(vec![query(6, "SELECT 6 -- edited")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.unchanged, 1);
        assert_eq!(local_body(&store, 6), "SELECT 6 -- edited\n");
        assert_eq!(cached_hash(&store, 6), fingerprint("SELECT 6 -- edited"));
        assert_eq!(prompter.upload_asks + prompter.conflict_asks, 0);
    }

    // ── Local Modified ────────────────────────────────────────────

    #[tokio::test]
    async fn test_local_modified_confirm_pushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 42, "SELECT 2", "SELECT 1");
        let remote = FakeRemote {
            queries: Mutex::new(vec![query(42, "SELECT 1")]),
            trim_on_update: true,
            ..FakeRemote::default()
        };
        let mut prompter = ScriptedPrompter {
            uploads: VecDeque::from([UploadResponse::Confirm]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pushed, 1);
        assert_eq!(prompter.upload_asks, 1);
        assert_eq!(
            *remote.updates.lock().unwrap(),
            vec![("42".to_string(), "SELECT 2".to_string())]
        );
        assert_eq!(local_body(&store, 42), "SELECT 2");
        assert_eq!(cached_hash(&store, 42), fingerprint("SELECT 2"));
        // Diff shows local as the "after" side.
        assert_eq!(
            diff.shown.borrow().as_slice(),
            &[("SELECT 2".to_string(), "SELECT 1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_push_stores_server_body() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 8, "SELECT 8   \n", "SELECT 7");
        let remote = FakeRemote {
            queries: Mutex::new(vec![query(8, "SELECT 7")]),
            trim_on_update: true,
            ..FakeRemote::default()
        };
        let mut prompter = ScriptedPrompter {
            uploads: VecDeque::from([UploadResponse::Confirm]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(local_body(&store, 8), "SELECT 8");
        assert_eq!(cached_hash(&store, 8), fingerprint("SELECT 8"));
    }

    #[tokio::test]
    async fn test_local_modified_decline_leaves_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 42, "SELECT 2", "SELECT 1");
        let remote = FakeRemote::with(vec![query(42, "SELECT 1")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(remote.update_count(), 0);
        assert_eq!(local_body(&store, 42), "SELECT 2");
        assert_eq!(cached_hash(&store, 42), fingerprint("SELECT 1"));

        // Declined changes come back on the next run.
        let mut prompter = ScriptedPrompter::default();
        run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;
        assert_eq!(prompter.upload_asks, 1);
    }

    #[tokio::test]
    async fn test_confirm_all_latches() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        for id in 1..=3 {
            seed(&store, id, &format!("SELECT {id} -- local"), &format!("SELECT {id}"));
        }
        let remote = FakeRemote::with((1..=3).map(|id| query(id, &format!("SELECT {id}"))).collect());
        let mut prompter = ScriptedPrompter {
            uploads: VecDeque::from([UploadResponse::ConfirmAll]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let mut engine = Reconciler::new(
            &remote,
            &store,
            &mut prompter,
            &diff,
            ReconcileOptions::default(),
        );
        let summary = engine.run().await.unwrap();
        assert_eq!(engine.upload_batch(), UploadBatch::PushAll);
        assert_eq!(engine.conflict_batch(), ConflictBatch::Ask);
        drop(engine);

        assert_eq!(summary.pushed, 3);
        assert_eq!(prompter.upload_asks, 1);
        assert_eq!(diff.shown.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_decline_all_latches() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        for id in 1..=3 {
            seed(&store, id, &format!("SELECT {id} -- local"), &format!("SELECT {id}"));
        }
        let remote = FakeRemote::with((1..=3).map(|id| query(id, &format!("SELECT {id}"))).collect());
        let mut prompter = ScriptedPrompter {
            uploads: VecDeque::from([UploadResponse::DeclineAll, UploadResponse::Confirm]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.pushed, 0);
        assert_eq!(prompter.upload_asks, 1);
        assert_eq!(remote.update_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_stops_stream() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 1, "SELECT 1 -- local", "SELECT 1");
        let remote = FakeRemote::with(vec![query(1, "SELECT 1"), query(2, "SELECT 2")]);
        let mut prompter = ScriptedPrompter {
            uploads: VecDeque::from([UploadResponse::Abort]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert!(summary.is_interrupted());
        assert_eq!(summary.total, 1);
        assert_eq!(summary.transferred() + summary.skipped + summary.unchanged, 0);
        assert!(!store.exists(&QueryId::from(2)));
        assert_eq!(local_body(&store, 1), "SELECT 1 -- local");
    }

    #[tokio::test]
    async fn test_push_failure_on_upload_is_counted() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 1, "SELECT 1 -- local", "SELECT 1");
        let remote = FakeRemote {
            queries: Mutex::new(vec![query(1, "SELECT 1"), query(2, "SELECT 2")]),
            reject_updates: HashSet::from(["1".to_string()]),
            ..FakeRemote::default()
        };
        let options = ReconcileOptions {
            upload_batch: UploadBatch::PushAll,
            ..ReconcileOptions::default()
        };
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, options).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.new, 1);
        assert_eq!(prompter.upload_asks, 0);
        assert_eq!(cached_hash(&store, 1), fingerprint("SELECT 1"));
    }

    // ── Conflicts ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_conflict_take_remote() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 7, "A", "B");
        let remote = FakeRemote::with(vec![query(7, "C")]);
        let mut prompter = ScriptedPrompter {
            conflicts: VecDeque::from([ConflictResponse::TakeRemote]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pulled, 1);
        assert_eq!(local_body(&store, 7), "C");
        assert_eq!(cached_hash(&store, 7), fingerprint("C"));
    }

    #[tokio::test]
    async fn test_conflict_keep_local_pushes() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 7, "A", "B");
        let remote = FakeRemote::with(vec![query(7, "C")]);
        let mut prompter = ScriptedPrompter {
            conflicts: VecDeque::from([ConflictResponse::KeepLocal]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pushed, 1);
        assert_eq!(local_body(&store, 7), "A");
        assert_eq!(cached_hash(&store, 7), fingerprint("A"));
        assert_eq!(remote.update_count(), 1);
    }

    #[tokio::test]
    async fn test_conflict_skip_preserves_local() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 7, "A  \n", "B");
        let remote = FakeRemote::with(vec![query(7, "C")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.conflicts, 1);
        assert_eq!(local_body(&store, 7), "A  \n");
        assert_eq!(cached_hash(&store, 7), fingerprint("B"));

        // Same conflict comes back next run.
        let mut prompter = ScriptedPrompter::default();
        let again = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;
        assert_eq!(again.conflicts, 1);
        assert_eq!(prompter.conflict_asks, 1);
    }

    #[tokio::test]
    async fn test_conflict_push_failure_stays_unresolved() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 7, "A", "B");
        let remote = FakeRemote {
            queries: Mutex::new(vec![query(7, "C")]),
            reject_updates: HashSet::from(["7".to_string()]),
            ..FakeRemote::default()
        };
        let mut prompter = ScriptedPrompter {
            conflicts: VecDeque::from([ConflictResponse::KeepLocal]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.pushed, 0);
        assert_eq!(local_body(&store, 7), "A");
    }

    #[tokio::test]
    async fn test_take_remote_all_latches_independently() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 1, "local 1", "base 1");
        seed(&store, 2, "SELECT 2 -- local", "SELECT 2");
        seed(&store, 3, "local 3", "base 3");
        let remote = FakeRemote::with(vec![
            query(1, "remote 1"),
            query(2, "SELECT 2"),
            query(3, "remote 3"),
        ]);
        let mut prompter = ScriptedPrompter {
            conflicts: VecDeque::from([ConflictResponse::TakeRemoteAll]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pulled, 2);
        assert_eq!(prompter.conflict_asks, 1);
        // The upload slot is untouched by the conflict latch.
        assert_eq!(prompter.upload_asks, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(local_body(&store, 3), "remote 3");
    }

    #[tokio::test]
    async fn test_keep_local_all_latches() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        for id in 1..=3 {
            seed(&store, id, &format!("local {id}"), &format!("base {id}"));
        }
        let remote = FakeRemote::with(vec![
            query(1, "remote 1"),
            query(2, "remote 2"),
            query(3, "remote 3"),
        ]);
        let mut prompter = ScriptedPrompter {
            conflicts: VecDeque::from([ConflictResponse::KeepLocalAll]),
            ..ScriptedPrompter::default()
        };
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(summary.pushed, 3);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(prompter.conflict_asks, 1);
        assert_eq!(remote.update_count(), 3);
        assert_eq!(diff.shown.borrow().len(), 1);
        for id in 1..=3 {
            assert_eq!(local_body(&store, id), format!("local {id}"));
            assert_eq!(cached_hash(&store, id), fingerprint(&format!("local {id}")));
        }

        // Fingerprints are shown for every conflict, latched or not.
        let headers = prompter
            .notices
            .iter()
            .filter(|n| n.contains("Conflict:"))
            .count();
        let remote_lines = prompter
            .notices
            .iter()
            .filter(|n| n.contains("remote: "))
            .count();
        assert_eq!(headers, 3);
        assert_eq!(remote_lines, 3);
    }

    #[tokio::test]
    async fn test_preset_keep_local_never_asks() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 7, "A", "B");
        let remote = FakeRemote::with(vec![query(7, "C")]);
        let options = ReconcileOptions {
            conflict_batch: ConflictBatch::KeepLocalAll,
            ..ReconcileOptions::default()
        };
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, options).await;

        assert_eq!(summary.pushed, 1);
        assert_eq!(prompter.conflict_asks, 0);
        assert!(diff.shown.borrow().is_empty());
        assert_eq!(local_body(&store, 7), "A");
    }

    #[tokio::test]
    async fn test_headers_go_through_prompter() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 4, "SELECT 4 -- local", "SELECT 4");
        let remote = FakeRemote::with(vec![query(4, "SELECT 4")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        run(&remote, &store, &mut prompter, &diff, ReconcileOptions::default()).await;

        assert_eq!(prompter.notices.len(), 1);
        assert!(prompter.notices[0].contains("Local changes:"));
        assert!(prompter.notices[0].contains("query 4"));
    }

    // ── Options ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        seed(&store, 1, "SELECT 1 -- local", "SELECT 1");
        seed(&store, 2, "A", "B");
        let remote = FakeRemote::with(vec![
            query(1, "SELECT 1"),
            query(2, "C"),
            query(3, "SELECT 3"),
        ]);
        let options = ReconcileOptions {
            dry_run: true,
            ..ReconcileOptions::default()
        };
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let summary = run(&remote, &store, &mut prompter, &diff, options).await;

        assert_eq!(summary.new, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.conflicts, 1);
        assert!(!store.exists(&QueryId::from(3)));
        assert_eq!(prompter.upload_asks + prompter.conflict_asks, 0);
        assert_eq!(remote.update_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_remote_entries_are_counted() {
        struct MixedRemote;

        impl RemoteSource for MixedRemote {
            async fn fetch_page(
                &self,
                _page: usize,
                _page_size: usize,
            ) -> RemoteResult<Vec<serde_json::Value>> {
                Ok(vec![
                    serde_json::to_value(query(1, "SELECT 1")).unwrap(),
                    serde_json::json!({"id": 2}),
                ])
            }

            async fn update(&self, _id: &QueryId, _body: &str) -> RemoteResult<RemoteQuery> {
                unreachable!("no pushes expected")
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();
        let remote = MixedRemote;

        let mut engine = Reconciler::new(
            &remote,
            &store,
            &mut prompter,
            &diff,
            ReconcileOptions::default(),
        );
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.new, 1);
    }

    #[tokio::test]
    async fn test_stream_failure_is_fatal() {
        struct DownRemote;

        impl RemoteSource for DownRemote {
            async fn fetch_page(
                &self,
                _page: usize,
                _page_size: usize,
            ) -> RemoteResult<Vec<serde_json::Value>> {
                Err(RemoteError::Request {
                    url: "mock://down".to_string(),
                    message: "connection refused".to_string(),
                })
            }

            async fn update(&self, _id: &QueryId, _body: &str) -> RemoteResult<RemoteQuery> {
                unreachable!("no pushes expected")
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();
        let remote = DownRemote;

        let mut engine = Reconciler::new(
            &remote,
            &store,
            &mut prompter,
            &diff,
            ReconcileOptions::default(),
        );
        let result = engine.run().await;

        assert!(matches!(result, Err(crate::sync::SyncError::Transport(_))));
        assert_eq!(engine.summary().total, 0);
    }

    #[tokio::test]
    async fn test_external_abort_before_first_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let remote = FakeRemote::with(vec![query(1, "SELECT 1")]);
        let mut prompter = ScriptedPrompter::default();
        let diff = RecordingDiff::default();

        let mut engine = Reconciler::new(
            &remote,
            &store,
            &mut prompter,
            &diff,
            ReconcileOptions::default(),
        );
        let signal = engine.abort_signal();
        assert!(!signal.is_raised());
        signal.raise();

        let summary = engine.run().await.unwrap();

        assert!(summary.is_interrupted());
        assert_eq!(summary.total, 0);
        assert!(store.read_metadata(&QueryId::from(1)).unwrap().is_none());
    }
}
