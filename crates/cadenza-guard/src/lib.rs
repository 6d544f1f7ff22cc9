// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resource guarding for the Cadenza orchestrator: the memory guard that
//! sheds session load under pressure, and the janitor that removes stale
//! sessions on a schedule.

pub mod janitor;
pub mod memory;

pub use janitor::CleanupJanitor;
pub use memory::{MemoryProbe, ResourceGuard, SysinfoProbe};
