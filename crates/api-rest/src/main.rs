//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the development REST server on its own.
//!
//! ## Intended use
//! Useful when working on the client or CLI against a local server. The workspace's main
//! `epr-run` binary starts the same server.

use api_rest::{router, AppState, EpisodeStore};
use epr_core::config::resolve_field_registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the EPR REST API server
///
/// # Environment Variables
/// - `EPR_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `EPR_SEED_PATH`: YAML or JSON seed file (default: start empty)
/// - `EPR_SCHEMA_PATH`: schema the seeded episodes must satisfy (default: built-in schema)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the seed file cannot be read or its episodes do not match the schema,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("EPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let store = match std::env::var("EPR_SEED_PATH").ok().map(PathBuf::from) {
        Some(path) => EpisodeStore::load(&path)?,
        None => {
            tracing::warn!("EPR_SEED_PATH not set; starting with an empty store");
            EpisodeStore::new()
        }
    };

    let registry =
        resolve_field_registry(std::env::var("EPR_SCHEMA_PATH").ok().map(PathBuf::from))?;
    store.validate(&registry)?;

    tracing::info!("-- Starting EPR REST API on {}", addr);

    let app = router(AppState {
        store: Arc::new(store),
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
