//! Saved query model.
//!
//! A query is a named SQL text held by the remote server. The remote side
//! owns identity and descriptive attributes; the body is the payload that
//! gets mirrored to disk and reconciled.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque query identifier.
///
/// The server may send identifiers as JSON numbers or strings; both are
/// normalized to their textual form, which also names the record's
/// directory in the local mirror.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// Create an identifier from any textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier can be used as a single path component.
    ///
    /// Rejects empty ids, `.`/`..`, and anything containing a separator.
    #[must_use]
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(&['/', '\\', '\0'][..])
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for QueryId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for QueryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for QueryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Str(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Int(n) => Ok(Self(n.to_string())),
            RawId::Str(s) => Ok(Self(s)),
        }
    }
}

/// A query as reported by the remote server.
///
/// Deserialization is the validation step: entries missing a required
/// field or carrying a wrongly-typed one fail here and never reach the
/// reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQuery {
    pub id: QueryId,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// SQL text. The server calls this field `query`.
    #[serde(alias = "query")]
    pub body: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub data_source_id: Option<i64>,

    #[serde(default)]
    pub user_id: Option<i64>,

    #[serde(default)]
    pub is_archived: bool,

    #[serde(default)]
    pub is_draft: bool,

    #[serde(default, deserialize_with = "nullable_tags")]
    pub tags: Vec<String>,
}

fn nullable_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Metadata envelope stored next to a mirrored query body.
///
/// Holds a copy of the descriptive attributes, the fingerprint of the body
/// as of the last sync, and when that sync happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    pub id: QueryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_source_id: Option<i64>,
    pub user_id: Option<i64>,
    pub is_archived: bool,
    pub is_draft: bool,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Fingerprint of the body at last sync.
    pub content_hash: String,

    /// Wall-clock time of the last sync.
    pub synced_at: DateTime<Utc>,
}

impl QueryMeta {
    /// Build the envelope for a remote record whose body hashes to `content_hash`.
    #[must_use]
    pub fn from_remote(query: &RemoteQuery, content_hash: String, synced_at: DateTime<Utc>) -> Self {
        Self {
            id: query.id.clone(),
            name: query.name.clone(),
            description: query.description.clone(),
            created_at: query.created_at,
            updated_at: query.updated_at,
            data_source_id: query.data_source_id,
            user_id: query.user_id,
            is_archived: query.is_archived,
            is_draft: query.is_draft,
            tags: query.tags.clone(),
            content_hash,
            synced_at,
        }
    }
}
