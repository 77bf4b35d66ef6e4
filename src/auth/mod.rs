//! Authentication — sessions, request guards, and identity verification.

pub mod session;
pub mod verifier;

pub use session::{CurrentUser, ProfileRequired};
pub use verifier::{IdentityVerifier, RemoteVerifier, VerifiedIdentity};
