pub mod random;
pub mod seq;

use passage_core::InviteCode;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

/// Trait for generating invitation code candidates.
///
/// Implementations are pure generators that don't interact with storage.
/// Candidates are not guaranteed to be unique; the issuer checks them
/// against the store before persisting.
pub trait Generator: Send + Sync + 'static {
    type Output: Into<InviteCode>;

    /// Generates one code candidate.
    fn generate(&self) -> Self::Output;

    /// Generates `count` candidates.
    fn generate_batch(&self, count: usize) -> Vec<InviteCode> {
        (0..count).map(|_| self.generate().into()).collect()
    }
}
