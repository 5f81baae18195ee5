use crate::code::InviteCode;
use crate::error::CoreError;
use crate::record::{
    code_of, decode_fields, encode_fields, CodeRecord, RecordDraft, RecordKind, StoredRecord,
};
use crate::user::UserId;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A code that can be redeemed by exactly one user.
///
/// `used` only ever moves from `false` to `true`, and `used_by` is recorded
/// in the same step. There is no way to clear either once set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleUseCode {
    code: InviteCode,
    used: bool,
    used_by: Option<UserId>,
    generated_by: Option<UserId>,
    creation_date: Option<Timestamp>,
}

#[derive(Serialize, Deserialize)]
struct Fields {
    used: bool,
    #[serde(default)]
    used_by_user_id: Option<UserId>,
    #[serde(default)]
    generated_by_user_id: Option<UserId>,
}

impl SingleUseCode {
    /// Creates an unused code that has not been persisted yet.
    pub fn new(code: InviteCode, generated_by: Option<UserId>) -> Self {
        Self {
            code,
            used: false,
            used_by: None,
            generated_by,
            creation_date: None,
        }
    }

    pub fn code(&self) -> &InviteCode {
        &self.code
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn used_by(&self) -> Option<&UserId> {
        self.used_by.as_ref()
    }

    pub fn generated_by(&self) -> Option<&UserId> {
        self.generated_by.as_ref()
    }

    /// When the store first persisted this code, if it has been.
    pub fn creation_date(&self) -> Option<Timestamp> {
        self.creation_date
    }

    /// Marks the code as consumed by `user`.
    ///
    /// Fails with [`CoreError::AlreadyUsed`] and leaves the value untouched
    /// if the code was already used.
    pub fn mark_used(&mut self, user: UserId) -> Result<(), CoreError> {
        if self.used {
            return Err(CoreError::AlreadyUsed(self.code.to_string()));
        }
        self.used = true;
        self.used_by = Some(user);
        Ok(())
    }
}

impl CodeRecord for SingleUseCode {
    const KIND: RecordKind = RecordKind::SingleUse;

    fn code(&self) -> &InviteCode {
        &self.code
    }

    fn to_draft(&self) -> Result<RecordDraft, CoreError> {
        let fields = encode_fields(&Fields {
            used: self.used,
            used_by_user_id: self.used_by.clone(),
            generated_by_user_id: self.generated_by.clone(),
        })?;
        Ok(RecordDraft {
            id: self.record_id(),
            fields,
        })
    }

    fn from_stored(record: &StoredRecord) -> Result<Self, CoreError> {
        let code = code_of(Self::KIND, record)?;
        let fields: Fields = decode_fields(record)?;
        if fields.used != fields.used_by_user_id.is_some() {
            return Err(CoreError::Codec(format!(
                "record {}: used flag and redeeming user disagree",
                record.id
            )));
        }
        Ok(Self {
            code,
            used: fields.used,
            used_by: fields.used_by_user_id,
            generated_by: fields.generated_by_user_id,
            creation_date: Some(record.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordId, RecordVersion};

    fn code(s: &str) -> InviteCode {
        InviteCode::parse(s).unwrap()
    }

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn stored(draft: RecordDraft) -> StoredRecord {
        StoredRecord {
            id: draft.id,
            fields: draft.fields,
            version: RecordVersion::INITIAL,
            created_at: Timestamp::from_second(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn new_code_is_unused() {
        let single = SingleUseCode::new(code("ABC123"), Some(user("alice")));
        assert!(!single.is_used());
        assert!(single.used_by().is_none());
        assert_eq!(single.generated_by().unwrap().as_str(), "alice");
        assert!(single.creation_date().is_none());
    }

    #[test]
    fn mark_used_is_one_way() {
        let mut single = SingleUseCode::new(code("ABC123"), None);
        single.mark_used(user("bob")).unwrap();
        assert!(single.is_used());
        assert_eq!(single.used_by().unwrap().as_str(), "bob");

        let err = single.mark_used(user("carol")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyUsed(_)));
        assert_eq!(single.used_by().unwrap().as_str(), "bob");
    }

    #[test]
    fn draft_contains_persisted_fields_only() {
        let single = SingleUseCode::new(code("ABC123"), Some(user("alice")));
        let draft = single.to_draft().unwrap();

        assert_eq!(draft.id, RecordId::single_use(&code("ABC123")));
        assert_eq!(draft.fields["used"], serde_json::json!(false));
        assert_eq!(draft.fields["generated_by_user_id"], serde_json::json!("alice"));
        assert!(!draft.fields.contains_key("code"));
        assert!(!draft.fields.contains_key("creation_date"));
    }

    #[test]
    fn decode_takes_creation_date_from_store() {
        let mut single = SingleUseCode::new(code("K7Q2MX"), None);
        single.mark_used(user("bob")).unwrap();

        let record = stored(single.to_draft().unwrap());
        let decoded = SingleUseCode::from_stored(&record).unwrap();

        assert_eq!(decoded.code(), single.code());
        assert!(decoded.is_used());
        assert_eq!(decoded.used_by().unwrap().as_str(), "bob");
        assert_eq!(decoded.creation_date(), Some(record.created_at));
    }

    #[test]
    fn decode_rejects_wrong_kind() {
        let mut record = stored(SingleUseCode::new(code("ABC123"), None).to_draft().unwrap());
        record.id.kind = RecordKind::MultiUse;
        assert!(matches!(
            SingleUseCode::from_stored(&record),
            Err(CoreError::Codec(_))
        ));
    }

    #[test]
    fn decode_rejects_used_without_user() {
        let mut record = stored(SingleUseCode::new(code("ABC123"), None).to_draft().unwrap());
        record.fields.insert("used".into(), serde_json::json!(true));
        assert!(SingleUseCode::from_stored(&record).is_err());
    }
}
