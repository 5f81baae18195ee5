use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of symbols in every invitation code.
pub const CODE_LENGTH: usize = 6;

/// The symbols a code is drawn from: `A-Z` followed by `0-9`.
pub const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Size of the code space, `36^6`.
pub const CODE_SPACE: u64 = 36_u64.pow(CODE_LENGTH as u32);

/// A validated invitation code.
///
/// Codes are exactly six characters from [`ALPHABET`]. The code string is
/// also the identifier of the record that backs it in the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InviteCode(String);

impl InviteCode {
    /// Parses a code typed or pasted by a person.
    ///
    /// Surrounding whitespace is ignored and lowercase letters are accepted
    /// as their uppercase form.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let normalized = input.trim().to_ascii_uppercase();
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Builds a code from alphabet positions.
    ///
    /// Each index selects `ALPHABET[index % 36]`, so every input maps to a
    /// valid code.
    pub fn from_indices(indices: [u8; CODE_LENGTH]) -> Self {
        let code = indices
            .iter()
            .map(|&i| ALPHABET[i as usize % ALPHABET.len()] as char)
            .collect();
        Self(code)
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(code: &str) -> Result<(), CoreError> {
        if code.len() != CODE_LENGTH {
            return Err(CoreError::InvalidCode(format!(
                "length must be {}, got {}",
                CODE_LENGTH,
                code.len()
            )));
        }

        if !code.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(CoreError::InvalidCode(format!(
                "must contain only A-Z or 0-9: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl TryFrom<String> for InviteCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(Self(value))
    }
}

impl From<InviteCode> for String {
    fn from(value: InviteCode) -> Self {
        value.0
    }
}

impl Display for InviteCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
