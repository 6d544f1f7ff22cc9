// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed session store with one single-writer event loop per session.
//!
//! Every mutation of a session -- transport callbacks, control-plane
//! operations, reconnect attempts -- flows through that session's mpsc
//! command loop, so per-session history is linearized while distinct
//! sessions run fully in parallel. The transport handle lives inside the
//! loop task and never escapes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use cadenza_config::model::ReconnectConfig;
use cadenza_core::{
    CadenzaError, DisconnectReason, MessageReceipt, Notifier, OrchestratorStore,
    OutboundMessage, SessionEvent, SessionEventKind, SessionId, SessionRecord,
    SessionStatus, TenantId, Transport, TransportEvent, TransportHandle,
};
use cadenza_pacing::QrLimiter;

use crate::fsm;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUS_CAPACITY: usize = 256;

/// Ask the auto-reconnect scheduler to retry a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub session_id: SessionId,
    /// 1-based attempt number about to be made.
    pub attempt: u32,
}

enum Command {
    Event(TransportEvent),
    Snapshot(oneshot::Sender<SessionRecord>),
    Send {
        msg: OutboundMessage,
        reply: oneshot::Sender<Result<MessageReceipt, CadenzaError>>,
    },
    Disconnect {
        reason: DisconnectReason,
        reply: oneshot::Sender<Result<(), CadenzaError>>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<(), CadenzaError>>,
    },
    RegenerateQr {
        reply: oneshot::Sender<Result<String, CadenzaError>>,
    },
    SetPrimary(bool),
    SetHealth(u8),
    Probe {
        timeout: Duration,
        reply: oneshot::Sender<bool>,
    },
    SilentProbe {
        timeout: Duration,
        reply: oneshot::Sender<bool>,
    },
    Footprint(oneshot::Sender<u64>),
    Destroy {
        cleanup_artifacts: bool,
        reply: oneshot::Sender<Result<(), CadenzaError>>,
    },
}

struct SlotHandle {
    tx: mpsc::Sender<Command>,
    tenant_id: TenantId,
}

/// Shared collaborators handed to every slot loop.
struct SlotCtx {
    transport: Arc<dyn Transport>,
    store: Arc<dyn OrchestratorStore>,
    events: broadcast::Sender<SessionEvent>,
    reconnect: ReconnectConfig,
    reconnect_tx: Mutex<Option<mpsc::UnboundedSender<ReconnectRequest>>>,
}

impl SlotCtx {
    fn emit(&self, record: &SessionRecord, kind: SessionEventKind, detail: Option<String>) {
        let event = SessionEvent::now(
            record.id.clone(),
            record.tenant_id.clone(),
            kind,
            detail,
        );
        // Nobody listening is fine; the bus is at-least-once best effort.
        let _ = self.events.send(event);
    }

    async fn request_reconnect(&self, session_id: &SessionId, attempt: u32) {
        if let Some(tx) = self.reconnect_tx.lock().await.as_ref() {
            let _ = tx.send(ReconnectRequest {
                session_id: session_id.clone(),
                attempt,
            });
        }
    }
}

/// Registry of live sessions.
pub struct SessionRegistry {
    ctx: Arc<SlotCtx>,
    qr_limiter: Arc<QrLimiter>,
    slots: DashMap<SessionId, SlotHandle>,
    worker_index: Option<u32>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn OrchestratorStore>,
        qr_limiter: Arc<QrLimiter>,
        reconnect: ReconnectConfig,
        worker_index: Option<u32>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            ctx: Arc::new(SlotCtx {
                transport,
                store,
                events,
                reconnect,
                reconnect_tx: Mutex::new(None),
            }),
            qr_limiter,
            slots: DashMap::new(),
            worker_index,
        }
    }

    /// Subscribe to the application-layer event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.events.subscribe()
    }

    /// Register the channel feeding the auto-reconnect scheduler.
    pub async fn set_reconnect_channel(&self, tx: mpsc::UnboundedSender<ReconnectRequest>) {
        *self.ctx.reconnect_tx.lock().await = Some(tx);
    }

    /// Provision a new session: connect the transport, persist the record,
    /// and start its event loop. The session starts in QrPending and walks
    /// the FSM as transport events arrive.
    pub async fn create_session(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
        is_primary: bool,
    ) -> Result<SessionRecord, CadenzaError> {
        if self.slots.contains_key(session_id) {
            return Err(CadenzaError::AdmissionRejected {
                reason: format!("session '{session_id}' already exists"),
            });
        }

        let handle = self.ctx.transport.connect(tenant_id, session_id).await?;

        let now = Utc::now();
        let record = SessionRecord {
            id: session_id.clone(),
            tenant_id: tenant_id.clone(),
            status: SessionStatus::QrPending,
            health_score: 100,
            last_activity_at: now,
            reconnect_attempts: 0,
            is_primary,
            assigned_worker: self.worker_index,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.upsert_session(&record).await?;
        if is_primary {
            self.ctx.store.set_primary(tenant_id, session_id).await?;
        }

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        self.slots.insert(
            session_id.clone(),
            SlotHandle {
                tx,
                tenant_id: tenant_id.clone(),
            },
        );
        tokio::spawn(slot_loop(self.ctx.clone(), record.clone(), Some(handle), rx));

        info!(session_id = %session_id, tenant_id = %tenant_id, "session created");
        Ok(record)
    }

    /// Dispatch a transport callback into the session's event loop.
    pub async fn deliver_event(
        &self,
        session_id: &SessionId,
        event: TransportEvent,
    ) -> Result<(), CadenzaError> {
        self.command_tx(session_id)?
            .send(Command::Event(event))
            .await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))
    }

    /// In-memory snapshot of a live session.
    pub async fn snapshot(&self, session_id: &SessionId) -> Result<SessionRecord, CadenzaError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, Command::Snapshot(reply)).await?;
        rx.await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))
    }

    /// Snapshots of every live session.
    pub async fn snapshot_all(&self) -> Vec<SessionRecord> {
        let ids: Vec<SessionId> = self.slots.iter().map(|e| e.key().clone()).collect();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(record) = self.snapshot(&id).await {
                records.push(record);
            }
        }
        records
    }

    /// Send one message over a connected session. Rate limiting happens in
    /// the caller before this point.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        msg: OutboundMessage,
    ) -> Result<MessageReceipt, CadenzaError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, Command::Send { msg, reply }).await?;
        rx.await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))?
    }

    /// Disconnect a session. User-requested disconnects clear reconnect
    /// state; technical reasons go through the normal retry path.
    pub async fn disconnect(
        &self,
        session_id: &SessionId,
        reason: DisconnectReason,
    ) -> Result<(), CadenzaError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, Command::Disconnect { reason, reply })
            .await?;
        rx.await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))?
    }

    /// Attempt to re-establish a disconnected session now.
    pub async fn reconnect(&self, session_id: &SessionId) -> Result<(), CadenzaError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, Command::Reconnect { reply }).await?;
        rx.await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))?
    }

    /// Issue a fresh pairing QR. Only legal for sessions that are not
    /// currently live, and throttled by the QR limiter.
    pub async fn regenerate_qr(&self, session_id: &SessionId) -> Result<String, CadenzaError> {
        let tenant_id = self
            .slots
            .get(session_id)
            .map(|slot| slot.tenant_id.clone())
            .ok_or_else(|| CadenzaError::SessionNotFound(session_id.clone()))?;

        // Reject ineligible states before spending a QR-quota token. The
        // slot re-validates under its own lock, so a racing transition
        // costs at worst one token, never a bad state change.
        let current = self.snapshot(session_id).await?;
        if !matches!(
            current.status,
            SessionStatus::Disconnected | SessionStatus::QrPending | SessionStatus::Failed
        ) {
            return Err(CadenzaError::InvalidTransition {
                session: session_id.clone(),
                status: current.status,
                event: "regenerate_qr".to_string(),
            });
        }
        self.qr_limiter.acquire(&tenant_id, Utc::now())?;

        let (reply, rx) = oneshot::channel();
        self.send_command(session_id, Command::RegenerateQr { reply })
            .await?;
        rx.await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))?
    }

    /// Mark a session as its tenant's primary, clearing the previous one.
    pub async fn set_primary(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
    ) -> Result<(), CadenzaError> {
        self.ctx.store.set_primary(tenant_id, session_id).await?;
        // Refresh the in-memory flags of this tenant's live sessions.
        let peers: Vec<(SessionId, mpsc::Sender<Command>)> = self
            .slots
            .iter()
            .filter(|e| &e.value().tenant_id == tenant_id)
            .map(|e| (e.key().clone(), e.value().tx.clone()))
            .collect();
        for (id, tx) in peers {
            let _ = tx.send(Command::SetPrimary(&id == session_id)).await;
        }
        Ok(())
    }

    /// Record the health monitor's latest score for a session.
    pub async fn set_health_score(
        &self,
        session_id: &SessionId,
        score: u8,
    ) -> Result<(), CadenzaError> {
        self.send_command(session_id, Command::SetHealth(score)).await
    }

    /// Responsiveness probe with a caller-chosen timeout. Timeout counts
    /// as unresponsive.
    pub async fn probe(&self, session_id: &SessionId, timeout: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .send_command(session_id, Command::Probe { timeout, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Exercise the send path against a sentinel target to detect silent
    /// death. Any response, including an error, proves the driver is alive.
    pub async fn silent_probe(&self, session_id: &SessionId, timeout: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .send_command(session_id, Command::SilentProbe { timeout, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Reported transport memory footprint, 0 when not live.
    pub async fn memory_footprint(&self, session_id: &SessionId) -> u64 {
        let (reply, rx) = oneshot::channel();
        if self
            .send_command(session_id, Command::Footprint(reply))
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Tear a session down: disconnect, delete the record, optionally
    /// remove on-disk artifacts, and stop the event loop.
    pub async fn destroy(
        &self,
        session_id: &SessionId,
        cleanup_artifacts: bool,
    ) -> Result<(), CadenzaError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(
            session_id,
            Command::Destroy {
                cleanup_artifacts,
                reply,
            },
        )
        .await?;
        let result = rx
            .await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))?;
        self.slots.remove(session_id);
        result
    }

    /// Tenant owning a live session.
    pub fn tenant_of(&self, session_id: &SessionId) -> Option<TenantId> {
        self.slots.get(session_id).map(|s| s.tenant_id.clone())
    }

    /// Number of live sessions.
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    fn command_tx(&self, session_id: &SessionId) -> Result<mpsc::Sender<Command>, CadenzaError> {
        self.slots
            .get(session_id)
            .map(|slot| slot.tx.clone())
            .ok_or_else(|| CadenzaError::SessionNotFound(session_id.clone()))
    }

    async fn send_command(
        &self,
        session_id: &SessionId,
        command: Command,
    ) -> Result<(), CadenzaError> {
        self.command_tx(session_id)?
            .send(command)
            .await
            .map_err(|_| CadenzaError::SessionNotFound(session_id.clone()))
    }
}

/// Forward every bus event to the notifier, at-least-once. Lagged receivers
/// skip ahead rather than wedge the pump.
pub fn spawn_notifier_pump(
    mut rx: broadcast::Receiver<SessionEvent>,
    notifier: Arc<dyn Notifier>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = notifier.notify(&event).await {
                        warn!(error = %e, "notifier delivery failed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notifier pump lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// The per-session single writer. Owns the record and the transport handle.
async fn slot_loop(
    ctx: Arc<SlotCtx>,
    mut record: SessionRecord,
    mut handle: Option<TransportHandle>,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Event(event) => {
                handle_transport_event(&ctx, &mut record, &mut handle, event).await;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(record.clone());
            }
            Command::Send { msg, reply } => {
                let result = do_send(&ctx, &mut record, handle, &msg).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reason, reply } => {
                let result = do_disconnect(&ctx, &mut record, &mut handle, reason).await;
                let _ = reply.send(result);
            }
            Command::Reconnect { reply } => {
                let result = do_reconnect(&ctx, &mut record, &mut handle).await;
                let _ = reply.send(result);
            }
            Command::RegenerateQr { reply } => {
                let result = do_regenerate_qr(&ctx, &mut record).await;
                let _ = reply.send(result);
            }
            Command::SetPrimary(flag) => {
                record.is_primary = flag;
            }
            Command::SetHealth(score) => {
                record.health_score = score;
                persist(&ctx, &mut record).await;
            }
            Command::Probe { timeout, reply } => {
                let responsive = match handle {
                    Some(h) => {
                        matches!(
                            tokio::time::timeout(timeout, ctx.transport.probe(h)).await,
                            Ok(Ok(true))
                        )
                    }
                    None => false,
                };
                let _ = reply.send(responsive);
            }
            Command::SilentProbe { timeout, reply } => {
                let alive = match handle {
                    Some(h) => {
                        let sentinel = OutboundMessage {
                            recipient: "status@invalid.probe".to_string(),
                            body: String::new(),
                        };
                        // A timely error still proves liveness; only a
                        // timeout means the driver died silently.
                        tokio::time::timeout(timeout, ctx.transport.send(h, &sentinel))
                            .await
                            .is_ok()
                    }
                    None => false,
                };
                let _ = reply.send(alive);
            }
            Command::Footprint(reply) => {
                let bytes = match handle {
                    Some(h) => ctx.transport.memory_footprint(h).await.unwrap_or(0),
                    None => 0,
                };
                let _ = reply.send(bytes);
            }
            Command::Destroy {
                cleanup_artifacts,
                reply,
            } => {
                let result = do_destroy(&ctx, &record, &mut handle, cleanup_artifacts).await;
                let _ = reply.send(result);
                break;
            }
        }
    }
    debug!(session_id = %record.id, "session loop stopped");
}

async fn persist(ctx: &SlotCtx, record: &mut SessionRecord) {
    record.updated_at = Utc::now();
    if let Err(e) = ctx.store.upsert_session(record).await {
        warn!(session_id = %record.id, error = %e, "failed to persist session record");
    }
}

async fn handle_transport_event(
    ctx: &SlotCtx,
    record: &mut SessionRecord,
    handle: &mut Option<TransportHandle>,
    event: TransportEvent,
) {
    let transition = match fsm::apply(&record.id, record.status, &event) {
        Ok(t) => t,
        Err(e) => {
            warn!(session_id = %record.id, error = %e, "transport event dropped");
            return;
        }
    };

    record.status = transition.next;
    if transition.activity {
        record.last_activity_at = Utc::now();
    }

    let detail = match &event {
        TransportEvent::QrIssued { code } => Some(code.clone()),
        TransportEvent::AuthFailed { reason } => Some(reason.clone()),
        TransportEvent::Disconnected { reason } => Some(reason.to_string()),
        TransportEvent::MessageReceived { from } => Some(from.clone()),
        TransportEvent::MessageSent { to } => Some(to.clone()),
        _ => None,
    };

    if let TransportEvent::Disconnected { reason } = &event {
        *handle = None;
        if reason.is_user_initiated() {
            record.reconnect_attempts = 0;
        } else if transition.emit.is_some() {
            schedule_retry(ctx, record).await;
        }
    }

    persist(ctx, record).await;
    if let Some(kind) = transition.emit {
        ctx.emit(record, kind, detail);
    }
}

/// Count one more reconnect attempt; schedule it or give up at the cap.
async fn schedule_retry(ctx: &SlotCtx, record: &mut SessionRecord) {
    record.reconnect_attempts += 1;
    if record.reconnect_attempts > ctx.reconnect.max_attempts {
        warn!(
            session_id = %record.id,
            attempts = record.reconnect_attempts - 1,
            "reconnect attempts exhausted"
        );
        ctx.emit(
            record,
            SessionEventKind::ReconnectFailed,
            Some("max attempts reached".to_string()),
        );
        record.reconnect_attempts = 0;
    } else {
        ctx.request_reconnect(&record.id, record.reconnect_attempts).await;
    }
}

async fn do_send(
    ctx: &SlotCtx,
    record: &mut SessionRecord,
    handle: Option<TransportHandle>,
    msg: &OutboundMessage,
) -> Result<MessageReceipt, CadenzaError> {
    if record.status != SessionStatus::Connected {
        return Err(CadenzaError::InvalidTransition {
            session: record.id.clone(),
            status: record.status,
            event: "send".to_string(),
        });
    }
    let handle = handle.ok_or_else(|| CadenzaError::Transport {
        message: "no live transport handle".to_string(),
        source: None,
    })?;
    let receipt = ctx.transport.send(handle, msg).await?;
    record.last_activity_at = Utc::now();
    persist(ctx, record).await;
    ctx.emit(
        record,
        SessionEventKind::MessageSent,
        Some(msg.recipient.clone()),
    );
    Ok(receipt)
}

async fn do_disconnect(
    ctx: &SlotCtx,
    record: &mut SessionRecord,
    handle: &mut Option<TransportHandle>,
    reason: DisconnectReason,
) -> Result<(), CadenzaError> {
    if let Some(h) = handle.take() {
        ctx.transport.disconnect(h).await?;
    }
    if record.status.is_live() || record.status == SessionStatus::QrPending {
        record.status = SessionStatus::Disconnected;
    }
    if reason.is_user_initiated() {
        record.reconnect_attempts = 0;
    }
    persist(ctx, record).await;
    ctx.emit(
        record,
        SessionEventKind::Disconnected,
        Some(reason.to_string()),
    );
    Ok(())
}

async fn do_reconnect(
    ctx: &SlotCtx,
    record: &mut SessionRecord,
    handle: &mut Option<TransportHandle>,
) -> Result<(), CadenzaError> {
    if record.status.is_live() {
        return Ok(());
    }
    match ctx.transport.connect(&record.tenant_id, &record.id).await {
        Ok(h) => {
            *handle = Some(h);
            // The device session is already paired; reconnection resumes it
            // without a fresh QR scan.
            record.status = SessionStatus::Connected;
            record.reconnect_attempts = 0;
            record.last_activity_at = Utc::now();
            persist(ctx, record).await;
            ctx.emit(record, SessionEventKind::Reconnected, None);
            Ok(())
        }
        Err(e) => {
            debug!(session_id = %record.id, error = %e, "reconnect attempt failed");
            schedule_retry(ctx, record).await;
            persist(ctx, record).await;
            Err(e)
        }
    }
}

async fn do_regenerate_qr(
    ctx: &SlotCtx,
    record: &mut SessionRecord,
) -> Result<String, CadenzaError> {
    if !matches!(
        record.status,
        SessionStatus::Disconnected | SessionStatus::QrPending | SessionStatus::Failed
    ) {
        return Err(CadenzaError::InvalidTransition {
            session: record.id.clone(),
            status: record.status,
            event: "regenerate_qr".to_string(),
        });
    }
    let code = ctx
        .transport
        .regenerate_qr(&record.tenant_id, &record.id)
        .await?;
    record.status = SessionStatus::QrPending;
    record.reconnect_attempts = 0;
    persist(ctx, record).await;
    ctx.emit(record, SessionEventKind::Qr, Some(code.clone()));
    Ok(code)
}

async fn do_destroy(
    ctx: &SlotCtx,
    record: &SessionRecord,
    handle: &mut Option<TransportHandle>,
    cleanup_artifacts: bool,
) -> Result<(), CadenzaError> {
    if let Some(h) = handle.take() {
        if let Err(e) = ctx.transport.disconnect(h).await {
            warn!(session_id = %record.id, error = %e, "disconnect during destroy failed");
        }
    }
    ctx.store.delete_session(&record.id).await?;
    if cleanup_artifacts {
        ctx.transport.remove_artifacts(&record.id).await?;
    }
    ctx.emit(record, SessionEventKind::Destroyed, None);
    info!(session_id = %record.id, cleanup_artifacts, "session destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_config::model::QrConfig;
    use cadenza_test_utils::{MemoryStore, MockTransport};

    fn registry_with(transport: Arc<MockTransport>) -> SessionRegistry {
        SessionRegistry::new(
            transport,
            Arc::new(MemoryStore::new()),
            Arc::new(QrLimiter::new(QrConfig::default())),
            ReconnectConfig::default(),
            Some(0),
        )
    }

    async fn connected_session(registry: &SessionRegistry, id: &str) -> SessionId {
        let sid = SessionId::from(id);
        registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap();
        registry
            .deliver_event(&sid, TransportEvent::Authenticated)
            .await
            .unwrap();
        registry
            .deliver_event(&sid, TransportEvent::Connected)
            .await
            .unwrap();
        sid
    }

    #[tokio::test]
    async fn create_walks_fsm_to_connected() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let mut events = registry.subscribe();

        let sid = connected_session(&registry, "s1").await;
        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Connected);

        let ready = events.recv().await.unwrap();
        assert_eq!(ready.kind, SessionEventKind::Ready);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let sid = SessionId::from("s1");
        registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap();
        let err = registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CadenzaError::AdmissionRejected { .. }));
    }

    #[tokio::test]
    async fn send_requires_connected_status() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone());
        let sid = SessionId::from("s1");
        registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap();

        let msg = OutboundMessage {
            recipient: "r1".to_string(),
            body: "hi".to_string(),
        };
        // Still QrPending.
        assert!(registry.send_message(&sid, msg.clone()).await.is_err());

        registry
            .deliver_event(&sid, TransportEvent::Authenticated)
            .await
            .unwrap();
        registry
            .deliver_event(&sid, TransportEvent::Connected)
            .await
            .unwrap();
        registry.send_message(&sid, msg).await.unwrap();
        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test]
    async fn technical_disconnect_schedules_reconnect() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.set_reconnect_channel(tx).await;

        let sid = connected_session(&registry, "s1").await;
        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::NetworkError,
                },
            )
            .await
            .unwrap();

        let request = rx.recv().await.unwrap();
        assert_eq!(request.session_id, sid);
        assert_eq!(request.attempt, 1);

        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Disconnected);
        assert_eq!(snapshot.reconnect_attempts, 1);
    }

    #[tokio::test]
    async fn user_initiated_disconnect_never_schedules() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.set_reconnect_channel(tx).await;

        let sid = connected_session(&registry, "s1").await;
        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::Logout,
                },
            )
            .await
            .unwrap();

        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn successful_reconnect_resets_attempts_and_emits() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let sid = connected_session(&registry, "s1").await;
        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::Crash,
                },
            )
            .await
            .unwrap();

        let mut events = registry.subscribe();
        registry.reconnect(&sid).await.unwrap();

        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Connected);
        assert_eq!(snapshot.reconnect_attempts, 0);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::Reconnected);
    }

    #[tokio::test]
    async fn failed_reconnect_reschedules_until_exhausted() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.set_reconnect_channel(tx).await;
        let mut events = registry.subscribe();

        let sid = connected_session(&registry, "s1").await;
        // Every future connect fails.
        transport.fail_next_connects(10, "still down").await;
        registry
            .deliver_event(
                &sid,
                TransportEvent::Disconnected {
                    reason: DisconnectReason::NetworkError,
                },
            )
            .await
            .unwrap();

        // Drive the scheduled attempts by hand; default max is 5.
        let mut attempts = Vec::new();
        while let Ok(request) = rx.try_recv() {
            attempts.push(request.attempt);
            let _ = registry.reconnect(&request.session_id).await;
        }
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);

        // The exhaustion event is on the bus after the Disconnected one.
        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            if event.kind == SessionEventKind::ReconnectFailed {
                saw_failed = true;
            }
        }
        assert!(saw_failed, "expected a reconnect_failed event");
    }

    #[tokio::test]
    async fn regenerate_qr_only_from_non_live_states() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let sid = connected_session(&registry, "s1").await;

        let err = registry.regenerate_qr(&sid).await.unwrap_err();
        assert!(matches!(err, CadenzaError::InvalidTransition { .. }));

        registry
            .disconnect(&sid, DisconnectReason::UserRequested)
            .await
            .unwrap();
        let code = registry.regenerate_qr(&sid).await.unwrap();
        assert!(code.starts_with("mock-qr-"));

        let snapshot = registry.snapshot(&sid).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::QrPending);
    }

    #[tokio::test]
    async fn qr_limiter_applies_to_regeneration() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let sid = SessionId::from("s1");
        registry
            .create_session(&TenantId::from("t1"), &sid, false)
            .await
            .unwrap();

        // Default tenant cap is 5 per hour.
        for _ in 0..5 {
            registry.regenerate_qr(&sid).await.unwrap();
        }
        let err = registry.regenerate_qr(&sid).await.unwrap_err();
        assert!(matches!(err, CadenzaError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn rejected_regeneration_does_not_burn_qr_quota() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let sid = connected_session(&registry, "s1").await;

        // Regeneration is ineligible while connected; hammer it well past
        // the tenant's hourly quota of 5.
        for _ in 0..6 {
            let err = registry.regenerate_qr(&sid).await.unwrap_err();
            assert!(matches!(err, CadenzaError::InvalidTransition { .. }));
        }

        registry
            .disconnect(&sid, DisconnectReason::UserRequested)
            .await
            .unwrap();

        // The full quota is still available: five succeed, the sixth is
        // the first to hit the limiter.
        for _ in 0..5 {
            registry.regenerate_qr(&sid).await.unwrap();
        }
        let err = registry.regenerate_qr(&sid).await.unwrap_err();
        assert!(matches!(err, CadenzaError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn set_primary_updates_live_snapshots() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport);
        let s1 = connected_session(&registry, "s1").await;
        let s2 = connected_session(&registry, "s2").await;

        registry
            .set_primary(&TenantId::from("t1"), &s2)
            .await
            .unwrap();

        assert!(!registry.snapshot(&s1).await.unwrap().is_primary);
        assert!(registry.snapshot(&s2).await.unwrap().is_primary);
    }

    #[tokio::test]
    async fn destroy_removes_slot_and_optionally_artifacts() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone());
        let sid = connected_session(&registry, "s1").await;

        registry.destroy(&sid, true).await.unwrap();
        assert_eq!(registry.live_count(), 0);
        assert!(registry.snapshot(&sid).await.is_err());
        assert_eq!(transport.removed_artifacts().await, vec![sid]);
        assert_eq!(transport.connected_count().await, 0);
    }

    #[tokio::test]
    async fn probe_times_out_as_unresponsive() {
        let transport = Arc::new(MockTransport::new());
        let registry = registry_with(transport.clone());
        let sid = connected_session(&registry, "s1").await;

        assert!(registry.probe(&sid, Duration::from_millis(200)).await);

        // Delay beyond the caller timeout: counts as unresponsive.
        let handle = TransportHandle(1);
        transport
            .set_probe_delay(handle, Duration::from_millis(500))
            .await;
        assert!(!registry.probe(&sid, Duration::from_millis(50)).await);
    }
}
