use crate::code::InviteCode;
use crate::error::CoreError;
use jiff::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The persisted fields of a record, as a JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// The type of record a store entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SingleUse,
    MultiUse,
}

impl RecordKind {
    /// Every kind. A code string names at most one record across all of them.
    pub const ALL: [RecordKind; 2] = [RecordKind::SingleUse, RecordKind::MultiUse];

    /// Stable tag used by store backends as part of the record key.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::SingleUse => "single_use",
            RecordKind::MultiUse => "multi_use",
        }
    }

    /// Parses a tag produced by [`RecordKind::as_str`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "single_use" => Some(RecordKind::SingleUse),
            "multi_use" => Some(RecordKind::MultiUse),
            _ => None,
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one record in the store: its kind plus the code string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub kind: RecordKind,
    pub name: String,
}

impl RecordId {
    pub fn new(kind: RecordKind, code: &InviteCode) -> Self {
        Self {
            kind,
            name: code.as_str().to_owned(),
        }
    }

    pub fn single_use(code: &InviteCode) -> Self {
        Self::new(RecordKind::SingleUse, code)
    }

    pub fn multi_use(code: &InviteCode) -> Self {
        Self::new(RecordKind::MultiUse, code)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Store-assigned revision of a record.
///
/// A record is inserted at [`RecordVersion::INITIAL`] and every accepted
/// write moves it to [`RecordVersion::next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordVersion(u64);

impl RecordVersion {
    pub const INITIAL: RecordVersion = RecordVersion(1);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for RecordVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Record content handed to the store for writing.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub id: RecordId,
    pub fields: Fields,
}

/// A record as the store holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: Fields,
    pub version: RecordVersion,
    /// Assigned by the store when the record is first persisted.
    pub created_at: Timestamp,
}

/// A decoded record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: RecordVersion,
}

impl<T: CodeRecord> Versioned<T> {
    pub fn decode(stored: &StoredRecord) -> Result<Self, CoreError> {
        Ok(Self {
            record: T::from_stored(stored)?,
            version: stored.version,
        })
    }
}

/// A code data model that can be written to and read from a record store.
pub trait CodeRecord: Sized + Send + Sync + 'static {
    const KIND: RecordKind;

    fn code(&self) -> &InviteCode;

    fn record_id(&self) -> RecordId {
        RecordId::new(Self::KIND, self.code())
    }

    /// Encodes the persisted fields of this record.
    fn to_draft(&self) -> Result<RecordDraft, CoreError>;

    /// Decodes a stored record, taking the creation date from the store.
    fn from_stored(record: &StoredRecord) -> Result<Self, CoreError>;
}

pub(crate) fn encode_fields<T: Serialize>(value: &T) -> Result<Fields, CoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(CoreError::Codec(format!(
            "record fields must encode to an object, got {}",
            other
        ))),
        Err(e) => Err(CoreError::Codec(e.to_string())),
    }
}

pub(crate) fn decode_fields<T: DeserializeOwned>(record: &StoredRecord) -> Result<T, CoreError> {
    serde_json::from_value(serde_json::Value::Object(record.fields.clone()))
        .map_err(|e| CoreError::Codec(format!("record {}: {e}", record.id)))
}

/// Checks the record kind and recovers the code from the record name.
pub(crate) fn code_of(kind: RecordKind, record: &StoredRecord) -> Result<InviteCode, CoreError> {
    if record.id.kind != kind {
        return Err(CoreError::Codec(format!(
            "expected a {} record, got {}",
            kind, record.id
        )));
    }
    InviteCode::try_from(record.id.name.clone())
}
