use pulse::auth::SessionStore;
use pulse::clock::format_utc_time;
use pulse::events::PrefetchEvent;
use pulse::loaders::{LoadMode, ScreenLoader};
use pulse::persistence::SledKeyValueStore;
use pulse::ports::{AnalyticsSource, KeyValueStore};
use pulse::prefetch::AppLifecycle;
use pulse::preferences::Preferences;
use pulse::{Period, PrefetchContext, PrefetchOrchestrator, PrefetchScheduler, SystemClock};
use pulse_wp::WpClient;
use shared::config::Config;
use std::path::Path;
use std::sync::Arc;
use storage_engine::MokaKeyValueStore;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse=info,pulse_wp=info,pulse_agent=info,warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting Pulse agent");

    // Load environment variables
    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    let store = open_store(&config.data_dir);

    let client = WpClient::new(config.wp_base_url.clone(), config.request_timeout)?;
    info!("Using WordPress site at {}", client.base_url());

    // ============================================
    // STEP 1: Restore or create the session
    // ============================================
    let sessions = SessionStore::new(store.clone());
    let session = match sessions
        .restore_or_sign_in(&client, config.credentials())
        .await
    {
        Ok(Some(session)) => session,
        Ok(None) => {
            warn!("No stored session and no credentials configured (PULSE_USERNAME/PULSE_PASSWORD)");
            return Ok(());
        }
        Err(e) => {
            error!("Sign-in failed: {}", e);
            return Err(e.into());
        }
    };

    let preferences = Preferences::new(store.clone());
    if let Some(language) = &config.language {
        if let Err(e) = preferences.set_language(language).await {
            warn!("Ignoring PULSE_LANGUAGE: {}", e);
        }
    }
    info!("Interface language: {}", preferences.language().await);

    // ============================================
    // STEP 2: Wire the prefetch pipeline
    // ============================================
    let source: Arc<dyn AnalyticsSource> = Arc::new(client);
    let orchestrator = PrefetchOrchestrator::new(store.clone(), source.clone(), Arc::new(SystemClock));
    let loader = ScreenLoader::new(orchestrator.cache().clone(), source);
    let context = session.context(config.site_id.as_deref());

    let _summary = orchestrator.add_listener(summary_listener(loader, context.clone()));
    let event_log = tokio::spawn(log_events(orchestrator.subscribe_events()));

    let (lifecycle, _) = broadcast::channel(8);
    let scheduler = PrefetchScheduler::new(orchestrator, lifecycle.clone());
    scheduler.set_context(Some(context));

    // ============================================
    // STEP 3: Wait for lifecycle signals or shutdown
    // ============================================
    info!(
        "Pulse agent running for {} (admin: {})",
        session.name,
        session.is_admin()
    );

    tokio::select! {
        _ = forward_foreground_signals(lifecycle) => {},
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    scheduler.shutdown();
    event_log.abort();

    info!("Pulse agent shutting down");
    Ok(())
}

/// Open the on-disk store, falling back to memory if that fails
fn open_store(data_dir: &str) -> Arc<dyn KeyValueStore> {
    let path = Path::new(data_dir).join("pulse.sled");
    match SledKeyValueStore::new(&path) {
        Ok(store) => {
            info!("Opened store at {}", path.display());
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Failed to open store at {}: {}. Running in-memory mode.",
                path.display(),
                e
            );
            Arc::new(MokaKeyValueStore::new_unbounded())
        }
    }
}

/// Listener re-reading the refreshed dashboard numbers from the cache
fn summary_listener(loader: ScreenLoader, context: PrefetchContext) -> impl Fn() + Send + Sync + 'static {
    move || {
        let loader = loader.clone();
        let context = context.clone();
        tokio::spawn(async move {
            match loader
                .site_metrics(&context, Period::Day, LoadMode::CacheOnly)
                .await
            {
                Ok(loaded) => info!(
                    "Last 24h: {} visitors, {} visits, {} online (as of {})",
                    loaded.data.visitors,
                    loaded.data.visits,
                    loaded.data.online,
                    format_utc_time(loaded.fetched_at)
                ),
                Err(e) => warn!("No site metrics cached after prefetch: {}", e),
            }
        });
    }
}

/// Log prefetch events until the channel closes; returns how many were logged
async fn log_events(mut events: broadcast::Receiver<PrefetchEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                info!(
                    "Prefetch event for user {} at {}",
                    event.user_id(),
                    format_utc_time(event.timestamp())
                );
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event log fell behind, missed {} prefetch event(s)", skipped);
            }
            Err(RecvError::Closed) => return logged,
        }
    }
}

// SIGUSR1 stands in for the app returning to the foreground
#[cfg(unix)]
async fn forward_foreground_signals(lifecycle: broadcast::Sender<AppLifecycle>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut foreground = match signal(SignalKind::user_defined1()) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Failed to install SIGUSR1 handler: {}", e);
            return std::future::pending().await;
        }
    };

    while foreground.recv().await.is_some() {
        info!("Foreground transition requested");
        if lifecycle.send(AppLifecycle::Foreground).is_err() {
            warn!("No prefetch driver listening for lifecycle events");
        }
    }
}

#[cfg(not(unix))]
async fn forward_foreground_signals(_lifecycle: broadcast::Sender<AppLifecycle>) {
    std::future::pending::<()>().await
}

// Graceful shutdown handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
