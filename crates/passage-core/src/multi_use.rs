use crate::code::InviteCode;
use crate::error::CoreError;
use crate::record::{
    code_of, decode_fields, encode_fields, CodeRecord, RecordDraft, RecordKind, StoredRecord,
};
use crate::user::UserId;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A code that many distinct users can redeem, tied to a reward tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiUseCode {
    code: InviteCode,
    generated_by: Option<UserId>,
    redeemed_by: Vec<UserId>,
    tiered_reward_id: String,
    creation_date: Option<Timestamp>,
}

#[derive(Serialize, Deserialize)]
struct Fields {
    #[serde(default)]
    generated_by_user_id: Option<UserId>,
    #[serde(default)]
    redeemed_by_user_ids: Vec<UserId>,
    tiered_reward_id: String,
}

impl MultiUseCode {
    /// Creates a code for `tiered_reward_id` with no redeemers yet.
    pub fn new(
        code: InviteCode,
        generated_by: Option<UserId>,
        tiered_reward_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            generated_by,
            redeemed_by: Vec::new(),
            tiered_reward_id: tiered_reward_id.into(),
            creation_date: None,
        }
    }

    pub fn code(&self) -> &InviteCode {
        &self.code
    }

    pub fn generated_by(&self) -> Option<&UserId> {
        self.generated_by.as_ref()
    }

    /// Users that redeemed this code, oldest first.
    pub fn redeemed_by(&self) -> &[UserId] {
        &self.redeemed_by
    }

    pub fn tiered_reward_id(&self) -> &str {
        &self.tiered_reward_id
    }

    pub fn creation_date(&self) -> Option<Timestamp> {
        self.creation_date
    }

    /// Appends a redeemer. Duplicates are not rejected.
    pub fn append_redeemer(&mut self, user: UserId) {
        self.redeemed_by.push(user);
    }
}

impl CodeRecord for MultiUseCode {
    const KIND: RecordKind = RecordKind::MultiUse;

    fn code(&self) -> &InviteCode {
        &self.code
    }

    fn to_draft(&self) -> Result<RecordDraft, CoreError> {
        let fields = encode_fields(&Fields {
            generated_by_user_id: self.generated_by.clone(),
            redeemed_by_user_ids: self.redeemed_by.clone(),
            tiered_reward_id: self.tiered_reward_id.clone(),
        })?;
        Ok(RecordDraft {
            id: self.record_id(),
            fields,
        })
    }

    fn from_stored(record: &StoredRecord) -> Result<Self, CoreError> {
        let code = code_of(Self::KIND, record)?;
        let fields: Fields = decode_fields(record)?;
        Ok(Self {
            code,
            generated_by: fields.generated_by_user_id,
            redeemed_by: fields.redeemed_by_user_ids,
            tiered_reward_id: fields.tiered_reward_id,
            creation_date: Some(record.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordVersion;

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn new_code_has_no_redeemers() {
        let code =
            MultiUseCode::new(InviteCode::parse("TIER01").unwrap(), Some(user("alice")), "gold");
        assert!(code.redeemed_by().is_empty());
        assert_eq!(code.tiered_reward_id(), "gold");
        assert_eq!(code.generated_by().unwrap().as_str(), "alice");
    }

    #[test]
    fn redeemers_keep_order_and_duplicates() {
        let mut code = MultiUseCode::new(InviteCode::parse("TIER01").unwrap(), None, "gold");
        code.append_redeemer(user("bob"));
        code.append_redeemer(user("carol"));
        code.append_redeemer(user("bob"));

        let names: Vec<_> = code.redeemed_by().iter().map(UserId::as_str).collect();
        assert_eq!(names, ["bob", "carol", "bob"]);
    }

    #[test]
    fn stored_round_trip_keeps_redeemers() {
        let mut code = MultiUseCode::new(InviteCode::parse("TIER01").unwrap(), None, "silver");
        code.append_redeemer(user("bob"));

        let draft = code.to_draft().unwrap();
        let stored = StoredRecord {
            id: draft.id,
            fields: draft.fields,
            version: RecordVersion::new(3),
            created_at: Timestamp::from_second(1_700_000_000).unwrap(),
        };

        let decoded = MultiUseCode::from_stored(&stored).unwrap();
        assert_eq!(decoded.redeemed_by(), code.redeemed_by());
        assert_eq!(decoded.tiered_reward_id(), "silver");
        assert_eq!(decoded.creation_date(), Some(stored.created_at));
    }
}
