// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session registry for the Cadenza orchestrator.
//!
//! Owns the in-memory side of session management: the admission pool that
//! gates slot allocation, the lifecycle state machine, the per-session
//! single-writer event loops, the health monitor, and the auto-reconnect
//! backoff scheduler. Durable state goes through the `OrchestratorStore`
//! seam; the chat network itself is behind `Transport`.

pub mod admission;
pub mod fsm;
pub mod health;
pub mod reconnect;
pub mod registry;

pub use admission::{Admission, AdmissionPool, SlotKey};
pub use fsm::{apply, Transition};
pub use health::{health_score, HealthMonitor};
pub use reconnect::AutoReconnect;
pub use registry::{spawn_notifier_pump, ReconnectRequest, SessionRegistry};
