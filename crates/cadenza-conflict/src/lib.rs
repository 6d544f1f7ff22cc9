// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mobile-conflict campaign pause/resume for the Cadenza orchestrator.

pub mod resolver;

pub use resolver::ConflictResolver;
