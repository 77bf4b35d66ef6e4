use std::sync::Arc;

use handraise::auth::{IdentityVerifier, RemoteVerifier};
use handraise::config::AppConfig;
use handraise::pages;
use handraise::state::AppState;
use handraise::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export HANDRAISE_AUDIENCE=https://your-public-origin");
        std::process::exit(1);
    });

    eprintln!("🙋 Handraise v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}:{}", config.bind_addr, config.port);
    eprintln!("   Verifier:  {}", config.verifier_url);
    eprintln!("   Database:  {}", config.db_path.display());

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    let verifier: Arc<dyn IdentityVerifier> =
        Arc::new(RemoteVerifier::new(&config.verifier_url, &config.audience));

    let templates = pages::templates()?;
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let state = AppState::new(db, verifier, templates, config);

    let app = handraise::app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
