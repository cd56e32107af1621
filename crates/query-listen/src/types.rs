//! Value types shared by the engine, the listeners and the application.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Identifiers
// ============================================================================

/// Identity of one listener registration.
///
/// Monotonically assigned by the owning `Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Identity of a query target inside a sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub i32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

/// Server read time of a snapshot. Totally ordered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SnapshotVersion(pub i64);

impl SnapshotVersion {
    pub const NONE: SnapshotVersion = SnapshotVersion(0);
}

// ============================================================================
// Query
// ============================================================================

/// A listen target: a collection path or a single document path.
///
/// Paths are `/`-separated; an even number of segments names a document
/// (`rooms/eros`), an odd number a collection (`rooms/eros/messages`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    path: String,
}

impl Query {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self {
            path: path.trim_matches('/').to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this query targets exactly one document.
    pub fn is_document_query(&self) -> bool {
        !self.path.is_empty() && self.path.split('/').count() % 2 == 0
    }

    /// Stable identifier used to group listeners on the same target.
    pub fn canonical_id(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({})", self.path)
    }
}

// ============================================================================
// Documents and changes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub data: Value,
    pub version: SnapshotVersion,
    /// Local writes not yet acknowledged by the backend.
    pub has_local_mutations: bool,
}

impl Document {
    pub fn new(key: impl Into<String>, data: Value, version: SnapshotVersion) -> Self {
        Self {
            key: key.into(),
            data,
            version,
            has_local_mutations: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    /// Only the document's metadata (e.g. pending-write state) changed.
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentViewChange {
    pub kind: ChangeKind,
    pub document: Document,
}

// ============================================================================
// ViewSnapshot
// ============================================================================

/// The result set of a query at one point in time, plus what changed since
/// the previous snapshot for the same query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub query: Query,
    pub documents: Vec<Document>,
    pub changes: Vec<DocumentViewChange>,
    pub version: SnapshotVersion,
    pub from_cache: bool,
    pub has_pending_writes: bool,
    pub sync_state_changed: bool,
    pub excludes_metadata_changes: bool,
}

impl ViewSnapshot {
    /// A first snapshot for `query` where every document counts as added.
    pub fn from_initial_documents(
        query: Query,
        documents: Vec<Document>,
        version: SnapshotVersion,
        from_cache: bool,
    ) -> Self {
        let changes = documents
            .iter()
            .map(|doc| DocumentViewChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            })
            .collect();
        let has_pending_writes = documents.iter().any(|d| d.has_local_mutations);
        Self {
            query,
            documents,
            changes,
            version,
            from_cache,
            has_pending_writes,
            sync_state_changed: true,
            excludes_metadata_changes: false,
        }
    }

    /// Copy of this snapshot with metadata-only changes stripped.
    pub fn without_metadata_changes(&self) -> Self {
        Self {
            changes: self
                .changes
                .iter()
                .filter(|c| c.kind != ChangeKind::Metadata)
                .cloned()
                .collect(),
            excludes_metadata_changes: true,
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

// ============================================================================
// Online state and listen options
// ============================================================================

/// The sync engine's view of backend connectivity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnlineState {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// Per-listener options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenOptions {
    /// Raise snapshots whose only differences are metadata changes
    /// (pending writes, sync state). Default: false.
    pub include_metadata_changes: bool,
    /// Hold back a from-cache initial snapshot until the backend has been
    /// heard from, unless the client is known to be offline. Default: false.
    pub wait_for_sync_when_online: bool,
}

impl ListenOptions {
    pub fn with_metadata_changes() -> Self {
        Self {
            include_metadata_changes: true,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
