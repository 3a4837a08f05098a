mod config;
mod logging;
mod registry_directory;
mod routes;

use anyhow::Context;
use registry_directory::RegisteredLocations;
use routes::{router, AppState};
use rtls_locator::{LayeredDirectory, LocationEngine, StaticDirectory};
use rtls_storage::RegistryStore;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config();
    let log_path = logging::init_logging(&config);

    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.addr))?;

    let registry = match &config.db_path {
        Some(path) => RegistryStore::open(path)
            .with_context(|| format!("open registry {}", path.display()))?,
        None => {
            warn!(event = "registry_in_memory", reason = "no db path configured");
            RegistryStore::open_in_memory().context("open in-memory registry")?
        }
    };
    let registered =
        Arc::new(RegisteredLocations::load(&registry).context("load registered readers")?);
    let registry = Arc::new(Mutex::new(registry));

    let builtin: StaticDirectory = config.locations.clone().into_iter().collect();
    let directory = LayeredDirectory::new(Arc::clone(&registered), builtin);
    let engine = LocationEngine::with_directory(config.resolver, Arc::new(directory));

    let app = router(AppState {
        engine: Arc::new(engine),
        registry,
        locations: Arc::clone(&registered),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!(
        event = "hub_start",
        addr = %config.addr,
        log_file = ?log_path,
        stale_seconds = config.resolver.stale_window.num_seconds(),
        hysteresis_db = config.resolver.hysteresis_db,
        dwell_seconds = config.resolver.dwell.num_seconds(),
        locations = config.locations.len(),
        registered_readers = registered.len()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_shutdown");
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "hub_error", error = %err);
        return Err(err.into());
    }
    Ok(())
}
