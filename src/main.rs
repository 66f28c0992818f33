use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{api_key_from_env, core_config_from_env, router, AppState, DEFAULT_REST_ADDR};
use rxcheck_core::DrugSafetyService;

/// Main entry point for rxcheck.
///
/// Loads the reference data, serves the REST API, and on Unix reloads the reference data
/// whenever the process receives SIGHUP. A failed reload keeps the current snapshot.
///
/// # Environment Variables
/// - `RXCHECK_REST_ADDR`: REST server address (default: "0.0.0.0:5000")
/// - `RXCHECK_REFERENCE_DIR`: Directory holding catalog.yaml, interactions.yaml and dosing.yaml
/// - `RXCHECK_FUZZY_MAX_DISTANCE`: Maximum edit distance for fuzzy name matching (default: 2)
/// - `RXCHECK_MAX_DRUGS`: Maximum drugs checked per request (default: 50)
/// - `RXCHECK_API_KEY`: Key required by `POST /api/reference/reload`
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rxcheck=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("RXCHECK_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = Arc::new(core_config_from_env()?);
    tracing::info!("++ Reference data from {}", cfg.reference_dir().display());
    let service = DrugSafetyService::new(cfg)?;

    #[cfg(unix)]
    spawn_reload_on_sighup(service.clone())?;

    let app = router(AppState {
        service,
        api_key: api_key_from_env(),
    });

    tracing::info!("++ Starting rxcheck REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(unix)]
fn spawn_reload_on_sighup(service: DrugSafetyService) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading reference data");
            let service = service.clone();
            match tokio::task::spawn_blocking(move || service.reload_reference()).await {
                Ok(Ok(info)) => tracing::info!("reference data v{} active", info.version),
                // Already logged by the store.
                Ok(Err(_)) => {}
                Err(e) => tracing::error!("reload task failed: {e}"),
            }
        }
    });
    Ok(())
}
