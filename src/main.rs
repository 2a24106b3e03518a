use api_rest::{router, AppState, EpisodeStore};
use epr_core::config::resolve_field_registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the EPR application
///
/// Starts the development REST server that the `epr` CLI and the HTTP transport talk to.
///
/// Seeded episodes are checked against the schema at startup, so bad seed data fails here
/// rather than on the first client request.
///
/// # Environment Variables
/// - `EPR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `EPR_SEED_PATH`: YAML or JSON seed file (default: start empty)
/// - `EPR_SCHEMA_PATH`: schema document (default: built-in schema)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("epr=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("EPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let registry =
        resolve_field_registry(std::env::var("EPR_SCHEMA_PATH").ok().map(PathBuf::from))?;
    let store = match std::env::var("EPR_SEED_PATH").ok().map(PathBuf::from) {
        Some(path) => EpisodeStore::load(&path)?,
        None => EpisodeStore::new(),
    };
    let checked = store.validate(&registry)?;
    tracing::info!(
        "++ {} seeded episodes valid against {} record fields",
        checked,
        registry.len()
    );

    tracing::info!("++ Starting EPR REST on {}", rest_addr);

    let rest_app = router(AppState {
        store: Arc::new(store),
    });

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, rest_app).await?;

    Ok(())
}
