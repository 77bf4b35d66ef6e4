//! Identity verification — remote assertion checking.
//!
//! The browser obtains an assertion from the identity provider and posts it
//! to `/verify`; this module sends the assertion to the remote verifier and
//! interprets the answer. Credentials never pass through this service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A successfully verified identity.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// The email the verifier attests to.
    pub email: String,
}

/// Seam for the remote verifier, so tests can inject a stub.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Check an assertion. `Ok` means the verifier attests to the identity;
    /// every failure cause collapses into `AuthError`.
    async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, AuthError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    assertion: &'a str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Production verifier: posts the assertion to the configured endpoint.
pub struct RemoteVerifier {
    client: reqwest::Client,
    verifier_url: String,
    audience: String,
}

impl RemoteVerifier {
    pub fn new(verifier_url: &str, audience: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            verifier_url: verifier_url.to_string(),
            audience: audience.to_string(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for RemoteVerifier {
    async fn verify(&self, assertion: &str) -> Result<VerifiedIdentity, AuthError> {
        let response = self
            .client
            .post(&self.verifier_url)
            .json(&VerifyRequest {
                assertion,
                audience: &self.audience,
            })
            .send()
            .await
            .map_err(|e| AuthError::VerifierRequest(e.to_string()))?;

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::VerifierRequest(format!("bad verifier response: {e}")))?;

        if body.status == "okay" {
            match body.email {
                Some(email) => Ok(VerifiedIdentity { email }),
                None => Err(AuthError::VerificationFailed(
                    "verifier returned okay without an email".to_string(),
                )),
            }
        } else {
            Err(AuthError::VerificationFailed(
                body.reason.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }
}
