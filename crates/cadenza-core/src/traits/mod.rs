// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the orchestrator core and its external collaborators.

pub mod notify;
pub mod store;
pub mod transport;

pub use notify::{LogNotifier, Notifier};
pub use store::{OrchestratorStore, ResumeOutcome};
pub use transport::Transport;
