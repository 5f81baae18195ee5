use crate::record::RecordVersion;
use thiserror::Error;

/// Errors raised by the core types themselves.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid code: {0}")]
    InvalidCode(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("code already used: {0}")]
    AlreadyUsed(String),
    #[error("record codec failed: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error(
        "record {id} changed since it was read: expected {expected}, found {}",
        display_version(.actual)
    )]
    VersionConflict {
        id: String,
        expected: RecordVersion,
        actual: Option<RecordVersion>,
    },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

fn display_version(version: &Option<RecordVersion>) -> String {
    match version {
        Some(version) => version.to_string(),
        None => "no record".to_string(),
    }
}

/// Errors returned when issuing codes.
#[derive(Debug, Clone, Error)]
pub enum IssueError {
    /// A collision-free batch was found but the store did not persist it.
    #[error("failed to persist generated codes: {0}")]
    Generation(#[source] StorageError),
    #[error("collision check failed: {0}")]
    CollisionCheck(#[source] StorageError),
    #[error("no collision-free batch after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
    #[error("batch of {requested} codes exceeds the limit of {max}")]
    BatchTooLarge { requested: usize, max: usize },
    #[error(transparent)]
    Codec(#[from] CoreError),
}

/// Why a code could not be resolved to an unused record.
#[derive(Debug, Clone, Error)]
pub enum LookupFailure {
    #[error("{0}")]
    Malformed(String),
    #[error("no such code")]
    NotFound,
    #[error("record is unreadable: {0}")]
    Corrupt(String),
    #[error("lookup failed: {0}")]
    Store(#[source] StorageError),
}

/// Why the write marking a code as used was not accepted.
#[derive(Debug, Clone, Error)]
pub enum RedemptionFailure {
    #[error("another redemption changed the code first")]
    LostRace,
    #[error("store rejected the write: {0}")]
    Store(#[source] StorageError),
}

/// Errors returned when redeeming a single-use code.
#[derive(Debug, Clone, Error)]
pub enum RedeemError {
    #[error("invalid code '{code}': {reason}")]
    InvalidCode { code: String, reason: LookupFailure },
    #[error("code '{0}' has already been used")]
    AlreadyUsed(String),
    #[error("failed to redeem code '{code}': {reason}")]
    Redemption {
        code: String,
        reason: RedemptionFailure,
    },
}

impl RedeemError {
    /// Whether trying the same redemption again could succeed.
    ///
    /// Store faults are retryable. A lost race is not: the code has been
    /// consumed by someone else.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RedeemError::InvalidCode {
                reason: LookupFailure::Store(_),
                ..
            } | RedeemError::Redemption {
                reason: RedemptionFailure::Store(_),
                ..
            }
        )
    }
}
