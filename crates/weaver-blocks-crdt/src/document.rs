//! CRDT document trait and sync state tracking.

use loro::VersionVector;
use weaver_blocks::DocumentEvent;

use crate::CrdtError;

/// Sync state for a CRDT document.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    /// Version vector at the time of last sync.
    pub last_synced_version: Option<VersionVector>,
}

impl SyncState {
    /// Create new empty sync state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the document was synced at least once.
    pub fn has_synced(&self) -> bool {
        self.last_synced_version.is_some()
    }
}

/// Trait for CRDT documents that replicate to collaborators.
///
/// Implementors provide access to the underlying CRDT operations
/// and sync state tracking.
pub trait CrdtDocument {
    /// Export full snapshot bytes.
    fn export_snapshot(&self) -> Result<Vec<u8>, CrdtError>;

    /// Export updates since the last synced version.
    /// Returns None if no changes since last sync.
    fn export_updates_since_sync(&self) -> Option<Vec<u8>>;

    /// Import remote changes, reporting what they changed.
    fn import(&mut self, data: &[u8]) -> Result<Vec<DocumentEvent>, CrdtError>;

    /// Get current version vector.
    fn version(&self) -> VersionVector;

    /// Mark current version as synced.
    fn mark_synced(&mut self);

    /// Check if there are changes since last sync.
    fn has_unsynced_changes(&self) -> bool;
}
