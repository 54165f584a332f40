use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use greenhouse_core::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use greenhouse_auth::background;
use greenhouse_auth::cache::{CacheBackend, MemoryCache, RedisCache, SessionCache};
use greenhouse_auth::config::ServerConfig;
use greenhouse_auth::router::build_app_router;
use greenhouse_auth::service::AuthService;
use greenhouse_auth::session::SessionManager;
use greenhouse_auth::state::AppState;
use greenhouse_auth::store::PgStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenhouse_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let store_timeout = Duration::from_millis(config.store_timeout_ms);
    let pool = greenhouse_db::create_pool(&config.database_url, store_timeout)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    greenhouse_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    greenhouse_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool.clone(), store_timeout));

    // --- Session cache ---
    let backend: Arc<dyn CacheBackend> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCache::new(url, RetryPolicy::default()).expect("Invalid REDIS_URL"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set; using in-process session cache");
            Arc::new(MemoryCache::new())
        }
    };
    let cache = SessionCache::new(backend, Duration::from_millis(config.cache_timeout_ms));
    if !cache.is_healthy().await {
        tracing::warn!(
            backend = cache.backend_name(),
            "Session cache unreachable at startup; serving from the database"
        );
    }

    // --- Auth core ---
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        cache,
        config.session.clone(),
    ));
    let auth = Arc::new(AuthService::new(
        store,
        Arc::clone(&sessions),
        config.jwt.clone(),
    ));

    // --- Background tasks ---
    let shutdown = CancellationToken::new();
    let cleanup_handle = tokio::spawn(background::session_cleanup::run(
        Arc::clone(&sessions),
        Duration::from_secs(config.session.cleanup_interval_secs),
        shutdown.child_token(),
    ));

    // --- App state & router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        auth,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let drain_deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(Duration::from_secs(config.shutdown_timeout_secs)).await;
    };

    tokio::select! {
        result = server => result.expect("Server error"),
        () = drain_deadline => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Shutdown timeout elapsed; abandoning in-flight requests"
            );
        }
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let _ = tokio::time::timeout(Duration::from_secs(5), cleanup_handle).await;
    tracing::info!("Session cleanup job stopped");

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
