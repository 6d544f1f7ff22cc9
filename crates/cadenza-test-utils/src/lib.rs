// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cadenza integration tests.
//!
//! Provides mock collaborators for fast, deterministic, CI-runnable tests
//! without a real chat-network driver.
//!
//! # Components
//!
//! - [`MockTransport`] - Scriptable transport driver with captured sends
//! - [`MockNotifier`] - Event sink that records everything it receives
//! - [`MemoryStore`] - In-memory `OrchestratorStore` for SQLite-free tests

pub mod memory_store;
pub mod mock_notifier;
pub mod mock_transport;

pub use memory_store::MemoryStore;
pub use mock_notifier::MockNotifier;
pub use mock_transport::MockTransport;
