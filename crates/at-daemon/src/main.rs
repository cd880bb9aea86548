//! Standalone daemon binary: loads config, acquires the lockfile, builds
//! the `Runtime`, and serves the HTTP/WebSocket API until a shutdown
//! signal arrives.

use anyhow::{Context, Result};
use at_core::config::Config;
use at_core::lockfile::DaemonLockfile;
use at_core::rate_limiter::{MultiKeyRateLimiter, RateLimitConfig};
use at_daemon::daemon::Daemon;
use at_gateway::auth::AuthLayer;
use at_gateway::origin_validation::get_default_allowed_origins;
use at_gateway::rate_limit_middleware::RateLimitLayer;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    at_telemetry::logging::init_logging("at-daemon", "info");

    let config = load_config();
    info!(
        project = %config.general.project_name,
        db = %config.db.file_name,
        "daemon starting"
    );

    let replace_mode = std::env::args().any(|a| a == "--replace" || a == "-r");
    if let Some(existing) = DaemonLockfile::read_valid() {
        if replace_mode {
            info!(pid = existing.pid, "replacing existing daemon (--replace)");
            #[cfg(unix)]
            unsafe {
                libc::kill(existing.pid as i32, libc::SIGTERM);
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            DaemonLockfile::remove();
        } else {
            eprintln!(
                "daemon already running (pid={}, api={})\n\nHint: use --replace to restart it.",
                existing.pid,
                existing.api_url(),
            );
            std::process::exit(1);
        }
    }

    let bind_addr = if config.daemon.port == 9876 {
        format!("{}:0", config.daemon.host)
    } else {
        format!("{}:{}", config.daemon.host, config.daemon.port)
    };
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {bind_addr}"))?;
    let api_port = listener.local_addr()?.port();
    info!(api_port, "API listener bound");

    let lockfile = DaemonLockfile {
        pid: std::process::id(),
        api_port,
        frontend_port: api_port,
        host: config.daemon.host.clone(),
        started_at: chrono::Utc::now().to_rfc3339(),
        project_path: std::env::current_dir().ok().map(|p| p.to_string_lossy().into_owned()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    if let Err(msg) = lockfile.acquire_or_fail() {
        eprintln!("failed to acquire lockfile: {msg}");
        std::process::exit(1);
    }
    info!("lockfile written to {}", DaemonLockfile::path().display());

    let daemon = Daemon::new(config).await.context("failed to build daemon")?;
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        DaemonLockfile::remove();
        shutdown.trigger();
    });

    let result = run_with_middleware(&daemon, listener).await;
    DaemonLockfile::remove();
    result
}

/// Builds the full router for this process: the service layer from
/// [`at_gateway::build_router`] wrapped with auth, rate limiting, CORS and
/// tracing, then hands it to [`Daemon::run_with_listener`] indirectly by
/// swapping in the wrapped router before serving.
async fn run_with_middleware(daemon: &Daemon, listener: tokio::net::TcpListener) -> Result<()> {
    let api_key = std::env::var("AT_GATEWAY_API_KEY").ok().filter(|s| !s.is_empty());
    if api_key.is_none() {
        tracing::warn!("AT_GATEWAY_API_KEY not set — running in development mode, all requests pass through auth");
    }

    let rate_limiter = Arc::new(MultiKeyRateLimiter::new(
        RateLimitConfig::per_minute(1000),
        RateLimitConfig::per_minute(120),
        RateLimitConfig::per_minute(60),
    ));

    let allowed_origins = get_default_allowed_origins();
    let cors_origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let router = at_gateway::build_router(daemon.runtime())
        .layer(AuthLayer::new(api_key))
        .layer(RateLimitLayer::new(rate_limiter))
        .layer(CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins)))
        .layer(TraceLayer::new_for_http());

    info!(addr = %listener.local_addr()?, "API server listening");
    let mut shutdown_rx = daemon.shutdown_handle().subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP listener draining");
        })
        .await
        .context("API server error")
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    })
}
