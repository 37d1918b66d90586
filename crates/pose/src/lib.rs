//! Proof-of-Service engine (C11): challenge issuance, receipt acceptance,
//! replay protection, scoring, and HTTP envelope authentication.

pub mod accepted;
pub mod challenge;
pub mod error;
pub mod http_auth;
pub mod receipt;
pub mod replay;
pub mod scoring;

pub use accepted::AcceptedReceiptLog;
pub use challenge::{challenge_message, ChallengeIssuer};
pub use error::PoseError;
pub use http_auth::{AuthMode, ChallengerAuthorizer, PoseHttpAuthenticator, StaticAllowlist, MAX_CLOCK_SKEW_MS};
pub use receipt::{accept_receipt, receipt_message};
pub use replay::ReplayRegistry;
pub use scoring::{combined_score, storage_score, uptime_score};
