// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier trait for the external alerting/webhook collaborator.

use async_trait::async_trait;

use crate::error::CadenzaError;
use crate::events::SessionEvent;

/// Sink for application-layer events and health alerts.
///
/// Delivery is at-least-once; consumers deduplicate on
/// `(session_id, event, timestamp)`. Formatting and webhook transport are
/// the collaborator's concern, not the orchestrator's.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, event: &SessionEvent) -> Result<(), CadenzaError>;
}

/// Notifier that only logs, for deployments without a webhook consumer.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &SessionEvent) -> Result<(), CadenzaError> {
        tracing::info!(
            session_id = %event.session_id,
            tenant_id = %event.tenant_id,
            event = %event.kind,
            detail = event.detail.as_deref().unwrap_or(""),
            "session event"
        );
        Ok(())
    }
}
