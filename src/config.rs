//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// URL of the remote identity-verification endpoint.
    pub verifier_url: String,
    /// Audience value sent with every verification request. Must match the
    /// public origin of this server or the verifier rejects the assertion.
    pub audience: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            db_path: PathBuf::from("./data/handraise.db"),
            verifier_url: "https://verifier.login.persona.org/verify".to_string(),
            audience: "http://localhost:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Build a config from `HANDRAISE_*` environment variables, falling back
    /// to defaults for everything except the audience, which has no safe
    /// default in production.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match std::env::var("HANDRAISE_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "HANDRAISE_PORT".to_string(),
                message: format!("not a port number: {raw}"),
            })?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            bind_addr: std::env::var("HANDRAISE_BIND").unwrap_or(defaults.bind_addr),
            port,
            db_path: std::env::var("HANDRAISE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            verifier_url: std::env::var("HANDRAISE_VERIFIER_URL")
                .unwrap_or(defaults.verifier_url),
            audience: std::env::var("HANDRAISE_AUDIENCE")
                .map_err(|_| ConfigError::MissingEnvVar("HANDRAISE_AUDIENCE".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 8080);
        assert!(cfg.verifier_url.starts_with("https://"));
    }
}
