use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use parking_lot::Mutex;
use passage_core::record::Fields;
use passage_core::store::{BatchFetch, Result};
use passage_core::{
    RecordDraft, RecordId, RecordStore, RecordVersion, SavePolicy, StorageError, StoredRecord,
};
use std::collections::HashSet;
use std::sync::Arc;

/// In-memory storage entry for a record.
#[derive(Debug, Clone)]
struct Entry {
    fields: Fields,
    version: RecordVersion,
    created_at: Timestamp,
}

impl Entry {
    fn to_record(&self, id: &RecordId) -> StoredRecord {
        StoredRecord {
            id: id.clone(),
            fields: self.fields.clone(),
            version: self.version,
            created_at: self.created_at,
        }
    }
}

/// In-memory implementation of [`RecordStore`] using DashMap.
///
/// Clones share the same underlying state, so several clients in one
/// process can contend on the same records. Conditional saves run under
/// the entry's shard lock. Batch saves are serialized by a store-wide
/// mutex, which makes them atomic with respect to each other; single
/// record saves never create records, so they cannot break a batch's
/// absence check.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    storage: Arc<DashMap<RecordId, Entry>>,
    batch_lock: Arc<Mutex<()>>,
}

impl InMemoryRecordStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.storage.contains_key(id)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        Ok(self.storage.get(id).map(|entry| entry.to_record(id)))
    }

    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch> {
        Ok(ids
            .iter()
            .map(|id| (id.clone(), Ok(self.storage.get(id).map(|entry| entry.to_record(id)))))
            .collect())
    }

    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord> {
        let Some(mut entry) = self.storage.get_mut(&draft.id) else {
            return Err(StorageError::VersionConflict {
                id: draft.id.to_string(),
                expected,
                actual: None,
            });
        };

        if entry.version != expected {
            return Err(StorageError::VersionConflict {
                id: draft.id.to_string(),
                expected,
                actual: Some(entry.version),
            });
        }

        entry.fields = draft.fields;
        entry.version = entry.version.next();
        Ok(entry.to_record(&draft.id))
    }

    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>> {
        let _guard = self.batch_lock.lock();
        let now = Timestamp::now();

        if policy == SavePolicy::InsertIfAbsent {
            let mut seen = HashSet::with_capacity(drafts.len());
            for draft in &drafts {
                if !seen.insert(&draft.id) || self.storage.contains_key(&draft.id) {
                    return Err(StorageError::Conflict(draft.id.to_string()));
                }
            }
        }

        let saved = drafts
            .into_iter()
            .map(|draft| {
                let mut slot = self.storage.entry(draft.id.clone()).or_insert_with(|| Entry {
                    fields: Default::default(),
                    version: RecordVersion::new(0),
                    created_at: now,
                });
                slot.fields = draft.fields;
                slot.version = slot.version.next();
                slot.to_record(&draft.id)
            })
            .collect();

        Ok(saved)
    }
}
