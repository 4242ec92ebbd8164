//! Local mirror of remote queries.
//!
//! Each query lives in its own directory named after its id:
//!
//! ```text
//! <root>/
//!   42/
//!     query.sql    # body as last written
//!     meta.json    # QueryMeta envelope
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{QueryId, QueryMeta};
use crate::sync::file::{atomic_write, read_optional};
use crate::sync::types::{SyncError, SyncResult};

/// File name of the query body inside a record directory.
pub const BODY_FILE: &str = "query.sql";

/// File name of the metadata envelope inside a record directory.
pub const META_FILE: &str = "meta.json";

/// Storage for local snapshots.
///
/// The reconciliation engine only reads snapshots and asks for them to be
/// written; how they are laid out is up to the implementation.
pub trait RecordStore {
    /// Whether a snapshot (metadata) exists for `id`.
    fn exists(&self, id: &QueryId) -> bool;

    /// Read the local body, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the body exists but cannot be read.
    fn read_body(&self, id: &QueryId) -> SyncResult<Option<String>>;

    /// Read the metadata envelope, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn read_metadata(&self, id: &QueryId) -> SyncResult<Option<QueryMeta>>;

    /// Write body and metadata, creating the record's location if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    fn write(&self, id: &QueryId, body: &str, meta: &QueryMeta) -> SyncResult<()>;

    /// List the ids of all records that have a location in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned.
    fn list_ids(&self) -> SyncResult<Vec<QueryId>>;
}

/// Filesystem-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the mirror.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one record's files.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnsafeId`] if the id would escape the root.
    pub fn record_dir(&self, id: &QueryId) -> SyncResult<PathBuf> {
        if !id.is_path_safe() {
            return Err(SyncError::UnsafeId(id.clone()));
        }
        Ok(self.root.join(id.as_str()))
    }

    fn store_err(id: &QueryId, operation: &'static str) -> impl FnOnce(std::io::Error) -> SyncError {
        let id = id.clone();
        move |source| SyncError::Store {
            id,
            operation,
            source,
        }
    }
}

impl RecordStore for FsStore {
    fn exists(&self, id: &QueryId) -> bool {
        self.record_dir(id)
            .map(|dir| dir.join(META_FILE).is_file())
            .unwrap_or(false)
    }

    fn read_body(&self, id: &QueryId) -> SyncResult<Option<String>> {
        let path = self.record_dir(id)?.join(BODY_FILE);
        read_optional(&path).map_err(Self::store_err(id, "read body of"))
    }

    fn read_metadata(&self, id: &QueryId) -> SyncResult<Option<QueryMeta>> {
        let path = self.record_dir(id)?.join(META_FILE);
        let Some(content) = read_optional(&path).map_err(Self::store_err(id, "read metadata of"))?
        else {
            return Ok(None);
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SyncError::InvalidMetadata {
                id: id.clone(),
                message: e.to_string(),
            })
    }

    fn write(&self, id: &QueryId, body: &str, meta: &QueryMeta) -> SyncResult<()> {
        let dir = self.record_dir(id)?;
        let meta_json = serde_json::to_string_pretty(meta)?;

        // Body first: if the metadata write is lost, the next run sees a
        // fingerprint mismatch instead of a silently stale body.
        atomic_write(&dir.join(BODY_FILE), body).map_err(Self::store_err(id, "write body of"))?;
        atomic_write(&dir.join(META_FILE), &meta_json)
            .map_err(Self::store_err(id, "write metadata of"))?;

        Ok(())
    }

    fn list_ids(&self) -> SyncResult<Vec<QueryId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(QueryId::new(name));
            }
        }

        // Numeric ids sort numerically, everything else lexically after them.
        ids.sort_by(|a, b| match (a.as_str().parse::<u64>(), b.as_str().parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        });
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn make_meta(id: &str, hash: &str) -> QueryMeta {
        QueryMeta {
            id: QueryId::from(id),
            name: "Test".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            data_source_id: Some(1),
            user_id: Some(1),
            is_archived: false,
            is_draft: false,
            tags: vec!["a".to_string()],
            content_hash: hash.to_string(),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let id = QueryId::from(42);
        let meta = make_meta("42", "abc");

        assert!(!store.exists(&id));
        store.write(&id, "SELECT 1", &meta).unwrap();

        assert!(store.exists(&id));
        assert_eq!(store.read_body(&id).unwrap().as_deref(), Some("SELECT 1"));
        assert_eq!(store.read_metadata(&id).unwrap(), Some(meta));
        assert!(temp_dir.path().join("42").join(BODY_FILE).is_file());
    }

    #[test]
    fn test_absent_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let id = QueryId::from(9);

        assert!(!store.exists(&id));
        assert!(store.read_body(&id).unwrap().is_none());
        assert!(store.read_metadata(&id).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_metadata_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let id = QueryId::from(3);
        fs::create_dir_all(temp_dir.path().join("3")).unwrap();
        fs::write(temp_dir.path().join("3").join(META_FILE), "{not json").unwrap();

        let result = store.read_metadata(&id);
        assert!(matches!(result, Err(SyncError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_unsafe_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        let id = QueryId::from("../escape");

        let result = store.write(&id, "x", &make_meta("../escape", "h"));
        assert!(matches!(result, Err(SyncError::UnsafeId(_))));
        assert!(!store.exists(&id));
    }

    #[test]
    fn test_list_ids_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path());
        for id in ["10", "2", "abc"] {
            store
                .write(&QueryId::from(id), "SELECT 1", &make_meta(id, "h"))
                .unwrap();
        }
        fs::write(temp_dir.path().join("stray.txt"), "ignored").unwrap();

        let ids: Vec<String> = store
            .list_ids()
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["2", "10", "abc"]);
    }

    #[test]
    fn test_list_ids_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsStore::new(temp_dir.path().join("not-created"));
        assert!(store.list_ids().unwrap().is_empty());
    }
}
