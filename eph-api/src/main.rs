use std::sync::Arc;

use anyhow::Result;
use eph_api::{create_app, AppState};
use eph_config::Settings;
use eph_core::SystemClock;
use eph_orchestrator::{spawn_reapers, Lifecycle, WorkspaceLocks};
use eph_provider::{build_engine, build_registry};
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Held for the life of the process so buffered file logs are flushed.
    let _log_guard = eph_logging::init_subscriber();

    info!("Starting eph-api service...");

    let settings = Settings::load()?;
    settings.validate()?;
    info!(
        mode = %settings.mode,
        bind_addr = %settings.bind_addr,
        auth = settings.api_token.is_some(),
        "configuration loaded"
    );

    let engine = build_engine(&settings.engine)?;
    let registry = Arc::new(build_registry(engine, Arc::new(SystemClock), &settings)?);
    let locks = WorkspaceLocks::new();
    let lifecycle = Lifecycle::with_locks(registry.clone(), locks.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reapers = if settings.mode.runs_reaper() {
        let handles = spawn_reapers(&registry, &settings.reaper, locks, shutdown_rx)?;
        info!(
            count = handles.len(),
            interval_secs = settings.reaper.interval_secs,
            "reapers started"
        );
        handles
    } else {
        Vec::new()
    };

    if settings.mode.runs_api() {
        let app = create_app(AppState::new(lifecycle, settings.api_token.clone()));
        let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
        info!("Listening on http://{}", settings.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    info!("shutting down");
    // Err only means every reaper already exited.
    let _ = shutdown_tx.send(true);
    for handle in reapers {
        if let Err(e) = handle.await {
            warn!(error = %e, "reaper task ended abnormally");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
