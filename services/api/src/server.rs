use crate::cli::ServeArgs;
use crate::infra::{build_platform, AppState};
use crate::routes::with_admission_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use campusflow::config::AppConfig;
use campusflow::error::AppError;
use campusflow::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.no_worker {
        config.worker.enabled = false;
    }
    if let Some(interval) = args.worker_interval_seconds {
        config.worker.interval_seconds = interval;
    }
    if let Some(batch_size) = args.worker_batch_size {
        config.worker.batch_size = batch_size;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (platform, _backends) =
        build_platform(config.worker.clone(), config.prospection.ttl()).await;
    let worker = platform.worker.clone();
    let worker_task = worker.clone().spawn();

    let app = with_admission_routes(platform)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admissions platform ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let an in-flight reconciliation cycle finish before the process exits.
    worker.stop();
    if let Err(error) = worker_task.await {
        warn!(%error, "reconciliation worker did not shut down cleanly");
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "terminate handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("interrupt received, shutting down"),
        _ = terminate => info!("terminate received, shutting down"),
    }
}
