use async_trait::async_trait;
use passage_core::{
    CodeRecord, CodeRedeemer, InviteCode, LookupFailure, RecordId, RecordStore, RedeemError,
    RedemptionFailure, SingleUseCode, StorageError, UserId, Versioned,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Redeems single-use codes with a fetch followed by a conditional save.
///
/// The conditional save is the only guard against concurrent redemptions:
/// when two clients read the same unused record, the store accepts the write
/// of exactly one of them and the other fails with
/// [`RedemptionFailure::LostRace`]. Nothing is retried.
#[derive(Debug)]
pub struct RedemptionCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for RedemptionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> RedemptionCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn invalid(code: &str, reason: LookupFailure) -> RedeemError {
    RedeemError::InvalidCode {
        code: code.to_string(),
        reason,
    }
}

#[async_trait]
impl<S: RecordStore> CodeRedeemer for RedemptionCoordinator<S> {
    async fn redeem(&self, code: &str, user: &UserId) -> Result<SingleUseCode, RedeemError> {
        let invite = InviteCode::parse(code)
            .map_err(|e| invalid(code, LookupFailure::Malformed(e.to_string())))?;
        let id = RecordId::single_use(&invite);

        let stored = match self.store.fetch(&id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(code = %invite, "no such code");
                return Err(invalid(invite.as_str(), LookupFailure::NotFound));
            }
            Err(e) => {
                warn!(code = %invite, error = %e, "failed to look up code");
                return Err(invalid(invite.as_str(), LookupFailure::Store(e)));
            }
        };

        let Versioned {
            record: mut single,
            version,
        } = Versioned::<SingleUseCode>::decode(&stored).map_err(|e| {
            warn!(code = %invite, error = %e, "stored code is unreadable");
            invalid(invite.as_str(), LookupFailure::Corrupt(e.to_string()))
        })?;

        if single.mark_used(user.clone()).is_err() {
            debug!(code = %invite, "code already used");
            return Err(RedeemError::AlreadyUsed(invite.to_string()));
        }

        let draft = single.to_draft().map_err(|e| RedeemError::Redemption {
            code: invite.to_string(),
            reason: RedemptionFailure::Store(StorageError::InvalidData(e.to_string())),
        })?;

        match self.store.conditional_save(draft, version).await {
            Ok(saved) => {
                info!(code = %invite, user = %user, version = %saved.version, "code redeemed");
                Ok(single)
            }
            Err(StorageError::VersionConflict { .. }) => {
                warn!(code = %invite, user = %user, "lost redemption race");
                Err(RedeemError::Redemption {
                    code: invite.to_string(),
                    reason: RedemptionFailure::LostRace,
                })
            }
            Err(e) => {
                warn!(code = %invite, error = %e, "failed to save redemption");
                Err(RedeemError::Redemption {
                    code: invite.to_string(),
                    reason: RedemptionFailure::Store(e),
                })
            }
        }
    }
}
