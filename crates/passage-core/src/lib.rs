//! Core types and traits for Passage invitation codes.
//!
//! This crate provides the code type, the single-use and multi-use data
//! models, the record abstraction shared by every store backend and the
//! service traits implemented by the issuer.

pub mod code;
pub mod error;
pub mod multi_use;
pub mod record;
pub mod service;
pub mod single_use;
pub mod store;
pub mod user;

pub use code::InviteCode;
pub use error::{
    CoreError, IssueError, LookupFailure, RedeemError, RedemptionFailure, StorageError,
};
pub use multi_use::MultiUseCode;
pub use record::{
    CodeRecord, RecordDraft, RecordId, RecordKind, RecordVersion, StoredRecord, Versioned,
};
pub use service::{CodeIssuer, CodeRedeemer};
pub use single_use::SingleUseCode;
pub use store::{BatchFetch, RecordStore, SavePolicy};
pub use user::UserId;
