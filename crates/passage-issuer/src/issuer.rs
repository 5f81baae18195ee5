use crate::settings::IssuerSettings;
use async_trait::async_trait;
use passage_core::{
    BatchFetch, CodeIssuer, CodeRecord, InviteCode, IssueError, MultiUseCode, RecordId,
    RecordKind, RecordStore, SingleUseCode, StorageError,
};
use passage_generator::Generator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Issues codes by generating candidates, checking them against the store
/// and persisting collision-free batches in one all-or-nothing save.
///
/// A batch with any collision is discarded as a whole and regenerated, up to
/// [`IssuerSettings::max_attempts`] times.
#[derive(Debug)]
pub struct BatchIssuer<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    settings: IssuerSettings,
}

impl<S, G> Clone for BatchIssuer<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            settings: self.settings.clone(),
        }
    }
}

impl<S: RecordStore, G: Generator> BatchIssuer<S, G> {
    /// Creates an issuer with default settings.
    pub fn new(store: S, generator: G) -> Self {
        Self::with_settings(store, generator, IssuerSettings::default())
    }

    pub fn with_settings(store: S, generator: G, settings: IssuerSettings) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(generator), settings)
    }

    /// Creates an issuer over a store and generator shared with other services.
    pub fn from_shared(store: Arc<S>, generator: Arc<G>, settings: IssuerSettings) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    /// Runs the generate, check, persist loop for `count` records built by `build`.
    async fn issue<T, F>(&self, count: usize, build: F) -> Result<Vec<T>, IssueError>
    where
        T: CodeRecord,
        F: Fn(InviteCode) -> T + Send + Sync,
    {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let codes = self.generator.generate_batch(count);
            let ids = lookup_ids(&codes);

            let found = self.store.batch_fetch(&ids).await.map_err(|e| {
                warn!(attempt, error = %e, "collision check failed");
                IssueError::CollisionCheck(e)
            })?;

            let collisions = count_collisions(&codes, &found);
            if collisions > 0 {
                warn!(attempt, collisions, count, "discarding batch with colliding codes");
                continue;
            }
            debug!(attempt, count, "batch is collision-free");

            let drafts = codes
                .into_iter()
                .map(|code| build(code).to_draft())
                .collect::<Result<Vec<_>, _>>()?;

            let saved = self
                .store
                .batch_save(drafts, self.settings.save_policy)
                .await
                .map_err(|e| {
                    warn!(attempt, error = %e, "failed to persist generated codes");
                    IssueError::Generation(e)
                })?;

            let issued = saved
                .iter()
                .map(T::from_stored)
                .collect::<Result<Vec<_>, _>>()
                .inspect_err(|e| {
                    warn!(
                        attempt,
                        count = saved.len(),
                        error = %e,
                        "batch was committed but the confirmed records could not be decoded"
                    );
                })?;

            info!(attempt, count = issued.len(), kind = %T::KIND, "issued codes");
            return Ok(issued);
        }

        warn!(attempts = max_attempts, count, "gave up issuing codes");
        Err(IssueError::ExhaustedRetries {
            attempts: max_attempts,
        })
    }
}

/// Ids a candidate code could already occupy, one per record kind.
fn lookup_ids(codes: &[InviteCode]) -> Vec<RecordId> {
    codes
        .iter()
        .flat_map(|code| RecordKind::ALL.map(|kind| RecordId::new(kind, code)))
        .collect()
}

/// Counts candidates that cannot be issued: codes held by a record of any
/// kind, codes the store could not verify and repeats within the batch.
fn count_collisions(codes: &[InviteCode], found: &BatchFetch) -> usize {
    let mut seen = HashSet::with_capacity(codes.len());
    codes
        .iter()
        .filter(|code| {
            let repeated = !seen.insert(*code);
            let taken = RecordKind::ALL.iter().any(|&kind| {
                !matches!(found.get(&RecordId::new(kind, code)), Some(Ok(None)))
            });
            repeated || taken
        })
        .count()
}

#[async_trait]
impl<S: RecordStore, G: Generator> CodeIssuer for BatchIssuer<S, G> {
    async fn issue_batch(&self, count: usize) -> Result<Vec<SingleUseCode>, IssueError> {
        if count == 0 {
            debug!("no codes requested");
            return Ok(Vec::new());
        }

        if let Some(max) = self.settings.max_batch_size {
            if count > max {
                return Err(IssueError::BatchTooLarge {
                    requested: count,
                    max,
                });
            }
        }

        let generated_by = &self.settings.generated_by;
        self.issue(count, |code| SingleUseCode::new(code, generated_by.clone()))
            .await
    }

    async fn issue_multi_use(&self, tiered_reward_id: &str) -> Result<MultiUseCode, IssueError> {
        let generated_by = &self.settings.generated_by;
        let mut issued = self
            .issue(1, |code| {
                MultiUseCode::new(code, generated_by.clone(), tiered_reward_id)
            })
            .await?;

        issued.pop().ok_or_else(|| {
            IssueError::Generation(StorageError::Operation(
                "store confirmed no records for a single-code batch".to_string(),
            ))
        })
    }
}
