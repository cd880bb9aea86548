use std::time::Duration;

use anyhow::{Context, Result};
use at_core::config::Config;
use at_core::shutdown::ShutdownSignal;
use at_gateway::Runtime;
use std::sync::Arc;
use tracing::{error, info};

/// How often the retention-sweep loop runs (SPEC_FULL.md §5).
const RETENTION_SWEEP_INTERVAL_SECS: u64 = 3600;

/// The coding-agent gateway's background daemon. Owns the [`Runtime`]
/// (event log, hub, CAAM, git-sync, DCG, audit sink), a [`ShutdownSignal`]
/// broadcast to the HTTP listener and every background loop, and drives
/// the retention sweep that expires old event-log rows.
pub struct Daemon {
    config: Config,
    runtime: Arc<Runtime>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    pub async fn new(config: Config) -> Result<Self> {
        let runtime = Runtime::open(&config)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("failed to build runtime")?;
        Ok(Self {
            config,
            runtime: Arc::new(runtime),
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        self.runtime.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Spawn the retention-sweep loop. Stops after its current pass once
    /// the shutdown signal fires (SPEC_FULL.md §5 "Graceful shutdown").
    fn spawn_retention_sweep(&self) {
        let event_log = self.runtime.event_log.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let guard = shutdown.guard("retention-sweep");
            let mut interval = tokio::time::interval(Duration::from_secs(RETENTION_SWEEP_INTERVAL_SECS));
            interval.tick().await;
            let mut shutdown_rx = shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match event_log.expire(chrono::Utc::now()).await {
                            Ok(removed) if removed > 0 => info!(removed, "retention sweep expired rows"),
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "retention sweep failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("retention sweep stopping");
                        break;
                    }
                }
            }
            guard.confirm();
        });
    }

    /// Serve the HTTP/WebSocket API on `listener` until the shutdown
    /// signal fires.
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<()> {
        self.spawn_retention_sweep();

        let router = at_gateway::build_router(self.runtime.clone());
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(addr = %listener.local_addr()?, "API server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP listener draining");
            })
            .await
            .context("API server error")?;
        Ok(())
    }
}
