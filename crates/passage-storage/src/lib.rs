//! Record store backends for Passage.
//!
//! Every backend implements [`passage_core::RecordStore`]: per-record
//! reads, a version-checked single-record write and an all-or-nothing
//! batch write.

pub mod memory;
pub mod mysql;
pub mod redis;

pub use memory::InMemoryRecordStore;
pub use mysql::MySqlRecordStore;
pub use passage_core::{RecordStore, SavePolicy, StorageError};
pub use self::redis::RedisRecordStore;
