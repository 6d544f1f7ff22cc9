// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notifier that records every event it receives.

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use cadenza_core::{CadenzaError, Notifier, SessionEvent, SessionEventKind};

/// Event sink for assertions.
pub struct MockNotifier {
    events: Mutex<Vec<SessionEvent>>,
    notify: Notify,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// All events received so far, in order.
    pub async fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().await.clone()
    }

    /// Events of one kind, in order.
    pub async fn events_of_kind(&self, kind: SessionEventKind) -> Vec<SessionEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Block until at least `count` events have arrived.
    pub async fn wait_for_count(&self, count: usize) {
        loop {
            if self.events.lock().await.len() >= count {
                return;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, event: &SessionEvent) -> Result<(), CadenzaError> {
        self.events.lock().await.push(event.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
