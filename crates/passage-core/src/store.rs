use crate::error::StorageError;
use crate::record::{RecordDraft, RecordId, RecordVersion, StoredRecord};
use async_trait::async_trait;
use std::collections::HashMap;

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Per-id outcome of [`RecordStore::batch_fetch`].
///
/// `Ok(None)` means the store has no record for the id.
pub type BatchFetch = HashMap<RecordId, Result<Option<StoredRecord>>>;

/// How [`RecordStore::batch_save`] treats ids that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SavePolicy {
    /// Reject the whole batch if any id already exists.
    #[default]
    InsertIfAbsent,
    /// Replace existing records, keeping their creation date.
    OverwriteAll,
}

/// The remote record store shared by every client instance.
///
/// Each record is strongly consistent on its own. The only multi-record
/// write is [`RecordStore::batch_save`], which is all-or-nothing.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Retrieves a single record. Returns `None` if it does not exist.
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>>;

    /// Retrieves several records in one round trip.
    ///
    /// The returned map has one entry per requested id. A failure of the
    /// whole request is returned as `Err`.
    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch>;

    /// Writes a record only if its stored version is still `expected`.
    ///
    /// Returns [`StorageError::VersionConflict`] if the record changed or
    /// disappeared since it was read at `expected`.
    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord>;

    /// Writes every draft or none of them.
    ///
    /// With [`SavePolicy::InsertIfAbsent`] an existing id fails the batch
    /// with [`StorageError::Conflict`].
    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        (**self).fetch(id).await
    }

    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch> {
        (**self).batch_fetch(ids).await
    }

    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord> {
        (**self).conditional_save(draft, expected).await
    }

    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>> {
        (**self).batch_save(drafts, policy).await
    }
}
