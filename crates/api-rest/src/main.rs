//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development when you want the REST server (with OpenAPI/Swagger UI) without the
//! workspace's `rxcheck-run` wrapper, which adds reload on SIGHUP.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{api_key_from_env, core_config_from_env, router, AppState, DEFAULT_REST_ADDR};
use rxcheck_core::DrugSafetyService;

/// Main entry point for the rxcheck REST API server.
///
/// # Environment Variables
/// - `RXCHECK_REST_ADDR`: Server address (default: "0.0.0.0:5000")
/// - `RXCHECK_REFERENCE_DIR`: Reference data directory
/// - `RXCHECK_FUZZY_MAX_DISTANCE`, `RXCHECK_MAX_DRUGS`: Matching and request limits
/// - `RXCHECK_API_KEY`: Key required by the reload endpoint
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration or reference data fails to load,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rxcheck=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("RXCHECK_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = Arc::new(core_config_from_env()?);
    let service = DrugSafetyService::new(cfg)?;
    let app = router(AppState {
        service,
        api_key: api_key_from_env(),
    });

    tracing::info!("-- Starting rxcheck REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
