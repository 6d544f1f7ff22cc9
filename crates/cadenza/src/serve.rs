// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cadenza serve` command implementation.
//!
//! Wires the full orchestrator: SQLite storage, transport driver, admission
//! pool, session registry, auto-reconnect scheduler, health monitor,
//! resource guard, cleanup janitor, conflict resolver, and the control-plane
//! gateway. Supports graceful shutdown via SIGINT/SIGTERM.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadenza_config::model::CadenzaConfig;
use cadenza_conflict::ConflictResolver;
use cadenza_core::{
    CadenzaError, DisconnectReason, LogNotifier, Notifier, OrchestratorStore, Transport,
};
use cadenza_gateway::{GatewayState, HealthState, ServerConfig};
use cadenza_guard::{CleanupJanitor, ResourceGuard, SysinfoProbe};
use cadenza_pacing::{QrLimiter, RateLimiter};
use cadenza_registry::{
    spawn_notifier_pump, AdmissionPool, AutoReconnect, HealthMonitor, SessionRegistry,
};
use cadenza_storage::SqliteStore;

use crate::loopback::{DriverEvent, LoopbackTransport};

/// Runs the `cadenza serve` command.
///
/// Initializes every orchestrator component and serves the control-plane
/// API until a shutdown signal arrives, then drains: background sweeps
/// stop, live transports disconnect, and the store checkpoints on close.
pub async fn run_serve(config: CadenzaConfig) -> Result<(), CadenzaError> {
    init_tracing(&config.orchestrator.log_level);

    info!(
        instance = %config.orchestrator.name,
        worker_index = ?config.orchestrator.worker_index,
        "starting cadenza serve"
    );

    // Storage first; everything else persists through it.
    let store: Arc<dyn OrchestratorStore> = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;

    // Chat-network driver. The loopback driver pairs instantly and keeps
    // the full event path exercised until a real device driver is wired in.
    let (transport, driver_rx) = LoopbackTransport::new();
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let qr_limiter = Arc::new(QrLimiter::new(config.qr.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit.clone(),
        config.risk.clone(),
    ));

    let registry = Arc::new(SessionRegistry::new(
        transport.clone(),
        store.clone(),
        qr_limiter,
        config.reconnect.clone(),
        config.orchestrator.worker_index,
    ));

    let shutdown = install_signal_handler();

    // Conflict resolver: paired-device activity pauses the session's
    // campaigns until the device has gone quiet.
    let resolver = Arc::new(ConflictResolver::new(
        config.conflict.clone(),
        store.clone(),
        transport.clone(),
    ));

    // Driver callbacks feed the per-session event loops and the resolver.
    let driver_pump = spawn_driver_pump(
        registry.clone(),
        resolver.clone(),
        driver_rx,
        shutdown.clone(),
    );

    // Application events flow to the notifier sink.
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let notifier_pump = spawn_notifier_pump(registry.subscribe(), notifier.clone());

    // Auto-reconnect scheduler.
    let reconnecter = Arc::new(AutoReconnect::new(config.reconnect.clone()));
    let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();
    registry.set_reconnect_channel(reconnect_tx).await;
    let reconnect_task = reconnecter
        .clone()
        .run(registry.clone(), reconnect_rx, shutdown.clone());

    // Admission pool with queue-promotion notifications.
    let pool = Arc::new(AdmissionPool::new(config.pool.clone()));
    let (promotion_tx, promotion_rx) = mpsc::unbounded_channel();
    pool.set_promotion_channel(promotion_tx).await;
    let promotion_task = spawn_promotion_drain(promotion_rx, shutdown.clone());

    // Background sweeps.
    let health_task = Arc::new(HealthMonitor::new(
        config.health.clone(),
        registry.clone(),
        notifier.clone(),
    ))
    .run(shutdown.clone());

    let guard_task = Arc::new(ResourceGuard::new(
        config.guard.clone(),
        registry.clone(),
        store.clone(),
        Box::new(SysinfoProbe::new()),
    ))
    .run(shutdown.clone());

    let janitor_task = Arc::new(CleanupJanitor::new(
        config.cleanup.clone(),
        registry.clone(),
        store.clone(),
        transport.clone(),
    ))
    .run(shutdown.clone());

    // Control-plane gateway.
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
        bearer_token: config.gateway.bearer_token.clone(),
    };
    if server_config.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set -- authenticated routes will reject all requests");
    }
    let state = GatewayState {
        registry: registry.clone(),
        pool,
        limiter: rate_limiter,
        reconnecter,
        store: store.clone(),
        health: HealthState {
            start_time: std::time::Instant::now(),
        },
    };

    info!("cadenza serve ready");

    tokio::select! {
        result = cadenza_gateway::start_server(&server_config, state) => {
            // The gateway only returns on a bind or accept failure.
            shutdown.cancel();
            result?;
        }
        _ = shutdown.cancelled() => {}
    }

    info!("shutting down");

    // Background tasks watch the token; wait for them to wind down.
    for task in [
        driver_pump,
        notifier_pump,
        reconnect_task,
        promotion_task,
        health_task,
        guard_task,
        janitor_task,
    ] {
        let _ = task.await;
    }

    // Orderly disconnect of every live session, then checkpoint and close.
    for record in registry.snapshot_all().await {
        if record.status.is_live() {
            if let Err(e) = registry
                .disconnect(&record.id, DisconnectReason::UserRequested)
                .await
            {
                warn!(session_id = %record.id, error = %e, "disconnect during drain failed");
            }
        }
    }
    store.close().await?;

    info!("shutdown complete");
    Ok(())
}

/// Forwards driver callbacks to their consumers until shutdown: transport
/// events into the session registry, mobile-activity reports into the
/// conflict resolver.
fn spawn_driver_pump(
    registry: Arc<SessionRegistry>,
    resolver: Arc<ConflictResolver>,
    mut rx: mpsc::UnboundedReceiver<DriverEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(DriverEvent::Transport(session_id, event)) => {
                        if let Err(e) = registry.deliver_event(&session_id, event).await {
                            // Races with session teardown are expected.
                            debug!(session_id = %session_id, error = %e, "dropped driver event");
                        }
                    }
                    Some(DriverEvent::MobileActivity {
                        session_id,
                        device_type,
                        observed_at,
                    }) => {
                        let Some(tenant_id) = registry.tenant_of(&session_id) else {
                            debug!(session_id = %session_id, "mobile activity for unknown session");
                            continue;
                        };
                        if let Err(e) = resolver
                            .handle_mobile_activity(
                                &tenant_id,
                                &session_id,
                                &device_type,
                                observed_at,
                            )
                            .await
                        {
                            warn!(session_id = %session_id, error = %e, "conflict pause failed");
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

/// Logs queue promotions. The reserved slot is picked up by the tenant's
/// next create request through the gateway.
fn spawn_promotion_drain(
    mut rx: mpsc::UnboundedReceiver<(cadenza_registry::SlotKey, cadenza_core::Priority)>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                promoted = rx.recv() => match promoted {
                    Some(((tenant_id, session_key), priority)) => {
                        info!(
                            tenant_id = %tenant_id,
                            session_key = %session_key,
                            priority = ?priority,
                            "queued admission promoted -- slot reserved"
                        );
                    }
                    None => break,
                },
            }
        }
    })
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cadenza={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
