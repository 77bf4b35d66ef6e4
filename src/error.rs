//! Error types for handraise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Authentication and identity-verification errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Identity verifier request failed: {0}")]
    VerifierRequest(String),

    #[error("Identity verification rejected: {0}")]
    VerificationFailed(String),
}

/// Handlers bubble infrastructure failures up as 500s. Anything the user can
/// act on (validation errors, missing auth, failed sign-in) is turned into a
/// redirect or a re-rendered form before it reaches this impl.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
