use crate::error::{IssueError, RedeemError};
use crate::multi_use::MultiUseCode;
use crate::single_use::SingleUseCode;
use crate::user::UserId;
use async_trait::async_trait;

#[async_trait]
pub trait CodeIssuer: Send + Sync + 'static {
    /// Issues `count` fresh single-use codes and persists them together.
    ///
    /// A `count` of zero returns an empty list without touching the store.
    async fn issue_batch(&self, count: usize) -> Result<Vec<SingleUseCode>, IssueError>;

    /// Issues one multi-use code for the given reward tier.
    async fn issue_multi_use(&self, tiered_reward_id: &str) -> Result<MultiUseCode, IssueError>;
}

#[async_trait]
pub trait CodeRedeemer: Send + Sync + 'static {
    /// Marks a single-use code as used by `user`.
    ///
    /// At most one call per code succeeds, across every client sharing the
    /// store.
    async fn redeem(&self, code: &str, user: &UserId) -> Result<SingleUseCode, RedeemError>;
}
