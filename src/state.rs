//! Shared application state handed to every router.

use std::sync::Arc;

use tera::Tera;

use crate::auth::IdentityVerifier;
use crate::config::AppConfig;
use crate::store::Database;

/// Cloneable handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub templates: Arc<Tera>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn Database>,
        verifier: Arc<dyn IdentityVerifier>,
        templates: Tera,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            verifier,
            templates: Arc::new(templates),
            config: Arc::new(config),
        }
    }
}
