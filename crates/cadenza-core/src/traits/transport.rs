// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport trait for the opaque chat-network driver.
//!
//! The real driver is a headless-browser-backed device session; the
//! orchestrator core only ever talks to this seam, so it is testable
//! without a browser. Asynchronous callbacks (QR issued, authenticated,
//! disconnected, ...) are pushed by the embedding layer into
//! `SessionRegistry::deliver_event`, keeping this trait pull-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CadenzaError;
use crate::types::{
    MessageReceipt, OutboundMessage, SessionId, TenantId, TransportHandle,
};

/// Driver for persistent, stateful chat-network connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes a connection for the session and returns its handle.
    ///
    /// The handle is owned exclusively by the session's registry entry.
    async fn connect(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
    ) -> Result<TransportHandle, CadenzaError>;

    /// Sends one message over the live connection.
    async fn send(
        &self,
        handle: TransportHandle,
        msg: &OutboundMessage,
    ) -> Result<MessageReceipt, CadenzaError>;

    /// Tears the connection down. Idempotent on already-dead handles.
    async fn disconnect(&self, handle: TransportHandle) -> Result<(), CadenzaError>;

    /// Lightweight responsiveness check. Callers enforce the timeout and
    /// treat timeout as unresponsive, never as a hang.
    async fn probe(&self, handle: TransportHandle) -> Result<bool, CadenzaError>;

    /// Issues a fresh pairing QR for a disconnected or pending session.
    async fn regenerate_qr(
        &self,
        tenant_id: &TenantId,
        session_id: &SessionId,
    ) -> Result<String, CadenzaError>;

    /// When manual device activity was last observed on the account, if known.
    async fn last_mobile_activity(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<DateTime<Utc>>, CadenzaError>;

    /// Approximate memory footprint of the live connection, in bytes.
    /// Used by the resource guard to pick eviction victims.
    async fn memory_footprint(&self, handle: TransportHandle) -> Result<u64, CadenzaError>;

    /// Deletes any on-disk artifacts (auth state, cache) for the session.
    async fn remove_artifacts(&self, session_id: &SessionId) -> Result<(), CadenzaError>;
}
