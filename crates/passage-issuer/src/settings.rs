use passage_core::{SavePolicy, UserId};
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Tunables for [`crate::BatchIssuer`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct IssuerSettings {
    /// Stamped onto every issued record as its generating user.
    #[builder(default, setter(into))]
    pub generated_by: Option<UserId>,
    /// Generate-and-check rounds before giving up. Zero is treated as one.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Largest `count` accepted by one `issue_batch` call; `None` is uncapped.
    #[builder(default, setter(into))]
    pub max_batch_size: Option<usize>,
    #[builder(default)]
    pub save_policy: SavePolicy,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
