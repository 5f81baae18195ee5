use crate::Generator;
use passage_core::code::{ALPHABET, CODE_LENGTH, CODE_SPACE};
use passage_core::InviteCode;
use std::sync::atomic::{AtomicU64, Ordering};

/// A deterministic generator that walks the code space in order.
///
/// The counter is rendered in base 36 over the code alphabet, so the
/// sequence starts `AAAAAA`, `AAAAAB`, ... and wraps after `999999`.
/// Useful in tests and for reproducible runs; codes are predictable, so
/// it should not back a public deployment.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
        }
    }
}

impl SeqGenerator {
    /// Creates a generator starting at `AAAAAA`.
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Creates a generator starting from a specific counter value.
    ///
    /// Offsets larger than the code space wrap around.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
        }
    }

    fn render(value: u64) -> InviteCode {
        let mut value = value % CODE_SPACE;
        let mut indices = [0_u8; CODE_LENGTH];
        for slot in indices.iter_mut().rev() {
            *slot = (value % ALPHABET.len() as u64) as u8;
            value /= ALPHABET.len() as u64;
        }
        InviteCode::from_indices(indices)
    }
}

impl Default for SeqGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SeqGenerator {
    type Output = InviteCode;

    fn generate(&self) -> InviteCode {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        Self::render(count)
    }
}
