use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rating_notifier::api::{ApiServer, AppState};
use rating_notifier::config::AppConfig;
use rating_notifier::delivery::{
    HttpNotificationSink, NotificationSink, ProtectedSink, RatingNotifier, StoreSink,
};
use rating_notifier::logging::init_logging;
use rating_notifier::notification::NotificationService;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// How long to wait for the cleanup worker after cancellation.
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "APP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so it can supply APP_CONFIG too
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting rating-notifier"
    );

    let shutdown = CancellationToken::new();

    let service = Arc::new(NotificationService::new(
        config.notification_service_config(),
    ));
    let cleanup_handle = service.spawn_cleanup_worker(shutdown.child_token());

    let sink: Arc<dyn NotificationSink> = match &config.delivery.base_url {
        Some(base_url) => {
            info!(base_url = %base_url, "Rating notifications are sent over HTTP");
            Arc::new(HttpNotificationSink::new(base_url, config.delivery.timeout())?)
        }
        None => {
            info!("Rating notifications are written to the local store");
            Arc::new(StoreSink::new(Arc::clone(service.store())))
        }
    };
    let protected = ProtectedSink::new(
        sink,
        config.delivery.retry.clone(),
        config.delivery.circuit_breaker.clone(),
    )
    .with_predicate(config.delivery.retry_policy);
    let notifier = RatingNotifier::new(protected, &shutdown)
        .with_delivery_timeout(config.delivery.delivery_timeout());

    let state = AppState::new(Arc::clone(&service))
        .with_notifier(notifier.clone())
        .with_shutdown_token(shutdown.clone());
    let server = ApiServer::new(config.server.clone().into(), state);

    let server_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        server_token.cancel();
    });

    let served = server.run().await;

    notifier.shutdown(config.delivery.shutdown_grace()).await;
    shutdown.cancel();
    if tokio::time::timeout(WORKER_STOP_TIMEOUT, cleanup_handle)
        .await
        .is_err()
    {
        warn!("Cleanup worker did not stop in time");
    }

    served?;
    info!("rating-notifier stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
