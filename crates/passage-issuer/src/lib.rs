//! Issuance and redemption services for Passage invitation codes.
//!
//! [`BatchIssuer`] implements [`passage_core::CodeIssuer`] on top of any
//! [`passage_core::RecordStore`] and code [`passage_generator::Generator`];
//! [`RedemptionCoordinator`] implements [`passage_core::CodeRedeemer`].

pub mod issuer;
pub mod redeemer;
pub mod settings;

pub use issuer::BatchIssuer;
pub use redeemer::RedemptionCoordinator;
pub use settings::IssuerSettings;
