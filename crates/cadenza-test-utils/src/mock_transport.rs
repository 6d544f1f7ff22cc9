// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport driver for deterministic testing.
//!
//! `MockTransport` implements `Transport` with scriptable connect outcomes,
//! per-handle probe responses, and captured sends for assertion in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use cadenza_core::{
    CadenzaError, MessageReceipt, OutboundMessage, SessionId, TenantId, Transport,
    TransportHandle,
};

/// A mock chat-network transport for testing.
///
/// Connects succeed by default and hand out monotonically increasing
/// handles. Failures can be scripted with [`fail_next_connects`]; probe
/// results and memory footprints are settable per handle.
///
/// [`fail_next_connects`]: MockTransport::fail_next_connects
pub struct MockTransport {
    next_handle: AtomicU64,
    connected: Mutex<HashSet<TransportHandle>>,
    sent: Mutex<Vec<(TransportHandle, OutboundMessage)>>,
    connect_failures: Mutex<VecDeque<String>>,
    probe_results: Mutex<HashMap<TransportHandle, bool>>,
    probe_delays: Mutex<HashMap<TransportHandle, std::time::Duration>>,
    send_delays: Mutex<HashMap<TransportHandle, std::time::Duration>>,
    footprints: Mutex<HashMap<TransportHandle, u64>>,
    mobile_activity: Mutex<HashMap<SessionId, DateTime<Utc>>>,
    removed_artifacts: Mutex<Vec<SessionId>>,
    qr_counter: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            connected: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            connect_failures: Mutex::new(VecDeque::new()),
            probe_results: Mutex::new(HashMap::new()),
            probe_delays: Mutex::new(HashMap::new()),
            send_delays: Mutex::new(HashMap::new()),
            footprints: Mutex::new(HashMap::new()),
            mobile_activity: Mutex::new(HashMap::new()),
            removed_artifacts: Mutex::new(Vec::new()),
            qr_counter: AtomicU64::new(0),
        }
    }

    /// Script the next `count` connect calls to fail with `reason`.
    pub async fn fail_next_connects(&self, count: usize, reason: &str) {
        let mut failures = self.connect_failures.lock().await;
        for _ in 0..count {
            failures.push_back(reason.to_string());
        }
    }

    /// Set the result the next probes of `handle` will return.
    pub async fn set_probe_result(&self, handle: TransportHandle, responsive: bool) {
        self.probe_results.lock().await.insert(handle, responsive);
    }

    /// Delay probe responses for `handle`, to exercise probe timeouts.
    pub async fn set_probe_delay(&self, handle: TransportHandle, delay: std::time::Duration) {
        self.probe_delays.lock().await.insert(handle, delay);
    }

    /// Delay send responses for `handle`, to simulate a hung driver.
    pub async fn set_send_delay(&self, handle: TransportHandle, delay: std::time::Duration) {
        self.send_delays.lock().await.insert(handle, delay);
    }

    /// Set the reported memory footprint for `handle`.
    pub async fn set_footprint(&self, handle: TransportHandle, bytes: u64) {
        self.footprints.lock().await.insert(handle, bytes);
    }

    /// Record manual device activity for a session.
    pub async fn set_mobile_activity(&self, session_id: &SessionId, at: DateTime<Utc>) {
        self.mobile_activity
            .lock()
            .await
            .insert(session_id.clone(), at);
    }

    /// All messages passed to `send`, in order.
    pub async fn sent_messages(&self) -> Vec<(TransportHandle, OutboundMessage)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Whether `handle` is currently connected.
    pub async fn is_connected(&self, handle: TransportHandle) -> bool {
        self.connected.lock().await.contains(&handle)
    }

    pub async fn connected_count(&self) -> usize {
        self.connected.lock().await.len()
    }

    /// Sessions whose artifacts were removed, in order.
    pub async fn removed_artifacts(&self) -> Vec<SessionId> {
        self.removed_artifacts.lock().await.clone()
    }

    /// How many QR codes have been issued.
    pub fn qr_count(&self) -> u64 {
        self.qr_counter.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _tenant_id: &TenantId,
        _session_id: &SessionId,
    ) -> Result<TransportHandle, CadenzaError> {
        if let Some(reason) = self.connect_failures.lock().await.pop_front() {
            return Err(CadenzaError::Transport {
                message: reason,
                source: None,
            });
        }
        let handle = TransportHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.connected.lock().await.insert(handle);
        Ok(handle)
    }

    async fn send(
        &self,
        handle: TransportHandle,
        msg: &OutboundMessage,
    ) -> Result<MessageReceipt, CadenzaError> {
        let delay = self.send_delays.lock().await.get(&handle).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.connected.lock().await.contains(&handle) {
            return Err(CadenzaError::Transport {
                message: format!("handle {} is not connected", handle.0),
                source: None,
            });
        }
        self.sent.lock().await.push((handle, msg.clone()));
        Ok(MessageReceipt {
            message_id: format!("mock-msg-{}", uuid::Uuid::new_v4()),
            delivered_at: Utc::now(),
        })
    }

    async fn disconnect(&self, handle: TransportHandle) -> Result<(), CadenzaError> {
        self.connected.lock().await.remove(&handle);
        Ok(())
    }

    async fn probe(&self, handle: TransportHandle) -> Result<bool, CadenzaError> {
        let delay = self.probe_delays.lock().await.get(&handle).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.probe_results.lock().await.get(&handle).unwrap_or(&true))
    }

    async fn regenerate_qr(
        &self,
        _tenant_id: &TenantId,
        session_id: &SessionId,
    ) -> Result<String, CadenzaError> {
        let n = self.qr_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("mock-qr-{session_id}-{n}"))
    }

    async fn last_mobile_activity(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<DateTime<Utc>>, CadenzaError> {
        Ok(self.mobile_activity.lock().await.get(session_id).copied())
    }

    async fn memory_footprint(&self, handle: TransportHandle) -> Result<u64, CadenzaError> {
        Ok(*self.footprints.lock().await.get(&handle).unwrap_or(&0))
    }

    async fn remove_artifacts(&self, session_id: &SessionId) -> Result<(), CadenzaError> {
        self.removed_artifacts.lock().await.push(session_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_hands_out_unique_handles() {
        let transport = MockTransport::new();
        let h1 = transport
            .connect(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .unwrap();
        let h2 = transport
            .connect(&TenantId::from("t1"), &SessionId::from("s2"))
            .await
            .unwrap();
        assert_ne!(h1, h2);
        assert!(transport.is_connected(h1).await);
        assert!(transport.is_connected(h2).await);
    }

    #[tokio::test]
    async fn scripted_connect_failures_are_consumed_in_order() {
        let transport = MockTransport::new();
        transport.fail_next_connects(2, "network down").await;

        for _ in 0..2 {
            let err = transport
                .connect(&TenantId::from("t1"), &SessionId::from("s1"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("network down"));
        }
        // Third connect succeeds.
        assert!(transport
            .connect(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn send_requires_a_live_handle() {
        let transport = MockTransport::new();
        let handle = transport
            .connect(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .unwrap();
        let msg = OutboundMessage {
            recipient: "r1".to_string(),
            body: "hello".to_string(),
        };
        transport.send(handle, &msg).await.unwrap();
        assert_eq!(transport.sent_count().await, 1);

        transport.disconnect(handle).await.unwrap();
        assert!(transport.send(handle, &msg).await.is_err());
    }

    #[tokio::test]
    async fn probe_defaults_true_and_is_scriptable() {
        let transport = MockTransport::new();
        let handle = transport
            .connect(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .unwrap();
        assert!(transport.probe(handle).await.unwrap());
        transport.set_probe_result(handle, false).await;
        assert!(!transport.probe(handle).await.unwrap());
    }

    #[tokio::test]
    async fn qr_counter_increments() {
        let transport = MockTransport::new();
        transport
            .regenerate_qr(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .unwrap();
        transport
            .regenerate_qr(&TenantId::from("t1"), &SessionId::from("s1"))
            .await
            .unwrap();
        assert_eq!(transport.qr_count(), 2);
    }

    #[tokio::test]
    async fn artifacts_removal_is_recorded() {
        let transport = MockTransport::new();
        transport
            .remove_artifacts(&SessionId::from("s1"))
            .await
            .unwrap();
        assert_eq!(
            transport.removed_artifacts().await,
            vec![SessionId::from("s1")]
        );
    }
}
