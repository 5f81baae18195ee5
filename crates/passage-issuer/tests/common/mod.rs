//! A scripted record store for exercising the issuer and redeemer.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use passage_core::record::Fields;
use passage_core::store::{BatchFetch, Result};
use passage_core::{
    CodeRecord, InviteCode, RecordDraft, RecordId, RecordStore, RecordVersion, SavePolicy,
    SingleUseCode, StorageError, StoredRecord,
};
use passage_generator::Generator;
use passage_storage::InMemoryRecordStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

/// Wraps [`InMemoryRecordStore`] with call counters, injected failures and
/// an optional barrier every `fetch` waits on before returning.
#[derive(Default)]
pub struct MockStore {
    inner: InMemoryRecordStore,
    fail_fetch: Mutex<Option<StorageError>>,
    fail_batch_fetch: Mutex<Option<StorageError>>,
    fail_conditional_save: Mutex<Option<StorageError>>,
    fail_batch_save: Mutex<Option<StorageError>>,
    fetch_barrier: Mutex<Option<Arc<Barrier>>>,
    garble_saved: AtomicBool,
    fetch_calls: AtomicUsize,
    batch_fetch_calls: AtomicUsize,
    conditional_save_calls: AtomicUsize,
    batch_save_calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Persists unused single-use records for `codes`, bypassing the counters.
    pub async fn seed(&self, codes: &[&str]) {
        let drafts = codes
            .iter()
            .map(|code| {
                SingleUseCode::new(InviteCode::parse(code).unwrap(), None)
                    .to_draft()
                    .unwrap()
            })
            .collect();
        self.inner
            .batch_save(drafts, SavePolicy::InsertIfAbsent)
            .await
            .unwrap();
    }

    /// Persists a record with arbitrary fields, bypassing the counters.
    pub async fn seed_raw(&self, id: RecordId, fields: Fields) {
        self.inner
            .batch_save(vec![RecordDraft { id, fields }], SavePolicy::InsertIfAbsent)
            .await
            .unwrap();
    }

    pub async fn record(&self, code: &str) -> Option<StoredRecord> {
        let id = RecordId::single_use(&InviteCode::parse(code).unwrap());
        self.inner.fetch(&id).await.unwrap()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn fail_fetch(&self, err: StorageError) {
        *self.fail_fetch.lock() = Some(err);
    }

    pub fn fail_batch_fetch(&self, err: StorageError) {
        *self.fail_batch_fetch.lock() = Some(err);
    }

    pub fn fail_conditional_save(&self, err: StorageError) {
        *self.fail_conditional_save.lock() = Some(err);
    }

    pub fn fail_batch_save(&self, err: StorageError) {
        *self.fail_batch_save.lock() = Some(err);
    }

    /// Commits batch saves as usual but confirms records marked used with
    /// no redeeming user.
    pub fn garble_saved_records(&self) {
        self.garble_saved.store(true, Ordering::SeqCst);
    }

    /// Makes every `fetch` wait until `parties` fetches have completed.
    pub fn hold_fetches(&self, parties: usize) {
        *self.fetch_barrier.lock() = Some(Arc::new(Barrier::new(parties)));
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn batch_fetch_calls(&self) -> usize {
        self.batch_fetch_calls.load(Ordering::SeqCst)
    }

    pub fn conditional_save_calls(&self) -> usize {
        self.conditional_save_calls.load(Ordering::SeqCst)
    }

    pub fn batch_save_calls(&self) -> usize {
        self.batch_save_calls.load(Ordering::SeqCst)
    }
}

fn injected(slot: &Mutex<Option<StorageError>>) -> Result<()> {
    match slot.lock().as_ref() {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn fetch(&self, id: &RecordId) -> Result<Option<StoredRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.fail_fetch)?;
        let record = self.inner.fetch(id).await?;

        let barrier = self.fetch_barrier.lock().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(record)
    }

    async fn batch_fetch(&self, ids: &[RecordId]) -> Result<BatchFetch> {
        self.batch_fetch_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.fail_batch_fetch)?;
        self.inner.batch_fetch(ids).await
    }

    async fn conditional_save(
        &self,
        draft: RecordDraft,
        expected: RecordVersion,
    ) -> Result<StoredRecord> {
        self.conditional_save_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.fail_conditional_save)?;
        self.inner.conditional_save(draft, expected).await
    }

    async fn batch_save(
        &self,
        drafts: Vec<RecordDraft>,
        policy: SavePolicy,
    ) -> Result<Vec<StoredRecord>> {
        self.batch_save_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.fail_batch_save)?;
        let mut saved = self.inner.batch_save(drafts, policy).await?;
        if self.garble_saved.load(Ordering::SeqCst) {
            for record in &mut saved {
                record.fields.insert("used".into(), serde_json::json!(true));
            }
        }
        Ok(saved)
    }
}

/// Always produces the same code.
pub struct FixedGenerator(pub &'static str);

impl Generator for FixedGenerator {
    type Output = InviteCode;

    fn generate(&self) -> InviteCode {
        InviteCode::parse(self.0).unwrap()
    }
}
