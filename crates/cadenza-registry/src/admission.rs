// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission pool: global and per-tenant concurrency caps with a
//! priority-ordered wait queue.
//!
//! A slot is identified by `(tenant_id, session_key)`. High-priority
//! requests may evict one low-priority active slot when the global pool is
//! full; everything else waits in the queue, High before Normal, FIFO
//! within a class. Releasing a slot promotes the next eligible queued
//! request immediately rather than on a poll.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use cadenza_config::model::PoolConfig;
use cadenza_core::{Priority, TenantId};

/// Seed for the moving-average session duration before any slot has been
/// released, in seconds.
const INITIAL_AVG_SESSION_SECS: f64 = 300.0;

/// Outcome of an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A slot was granted; provision the session now.
    Admitted {
        /// Session key evicted to make room, if any.
        evicted: Option<SlotKey>,
    },
    /// The pool is full; the request waits in the queue.
    Queued { position: usize, eta_ms: u64 },
    /// The request is invalid and was not queued.
    Rejected { reason: String },
}

/// Identity of a pool slot.
pub type SlotKey = (TenantId, String);

#[derive(Debug, Clone)]
struct QueuedRequest {
    key: SlotKey,
    priority: Priority,
}

struct ActiveSlot {
    priority: Priority,
    since: Instant,
}

struct PoolState {
    active: HashMap<SlotKey, ActiveSlot>,
    queue: VecDeque<QueuedRequest>,
    avg_session_secs: f64,
    released: u64,
}

impl PoolState {
    fn tenant_active(&self, tenant: &TenantId) -> usize {
        self.active.keys().filter(|(t, _)| t == tenant).count()
    }

    fn is_known(&self, key: &SlotKey) -> bool {
        self.active.contains_key(key) || self.queue.iter().any(|q| &q.key == key)
    }

    /// Insert keeping High ahead of Normal ahead of Low, FIFO within class.
    fn enqueue(&mut self, request: QueuedRequest) -> usize {
        let pos = self
            .queue
            .iter()
            .position(|q| q.priority < request.priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, request);
        pos
    }
}

/// Concurrency gatekeeper for session slots.
pub struct AdmissionPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Queued requests that got a slot on release are pushed here for the
    /// wiring layer to provision.
    promotions: Mutex<Option<mpsc::UnboundedSender<(SlotKey, Priority)>>>,
}

impl AdmissionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                active: HashMap::new(),
                queue: VecDeque::new(),
                avg_session_secs: INITIAL_AVG_SESSION_SECS,
                released: 0,
            }),
            promotions: Mutex::new(None),
        }
    }

    /// Register the channel that receives promoted requests.
    pub async fn set_promotion_channel(&self, tx: mpsc::UnboundedSender<(SlotKey, Priority)>) {
        *self.promotions.lock().await = Some(tx);
    }

    /// Request a slot for `(tenant_id, session_key)`.
    pub async fn request(
        &self,
        tenant_id: &TenantId,
        session_key: &str,
        priority: Priority,
    ) -> Admission {
        let key: SlotKey = (tenant_id.clone(), session_key.to_string());
        let mut state = self.state.lock().await;

        if state.is_known(&key) {
            return Admission::Rejected {
                reason: format!("session key '{session_key}' is already active or queued"),
            };
        }

        let tenant_full = state.tenant_active(tenant_id) >= self.config.tenant_max;
        let global_full = state.active.len() >= self.config.global_max;

        if !tenant_full && !global_full {
            state.active.insert(
                key.clone(),
                ActiveSlot {
                    priority,
                    since: Instant::now(),
                },
            );
            debug!(tenant_id = %tenant_id, session_key, "slot admitted");
            return Admission::Admitted { evicted: None };
        }

        // A high-priority request may evict one low-priority active slot
        // when only the global cap is in the way.
        if global_full && !tenant_full && priority == Priority::High {
            let victim = state
                .active
                .iter()
                .filter(|(_, slot)| slot.priority == Priority::Low)
                .min_by_key(|(_, slot)| slot.since)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                state.active.remove(&victim);
                state.active.insert(
                    key.clone(),
                    ActiveSlot {
                        priority,
                        since: Instant::now(),
                    },
                );
                warn!(
                    tenant_id = %tenant_id,
                    session_key,
                    evicted_tenant = %victim.0,
                    evicted_key = %victim.1,
                    "high-priority admission evicted a low-priority slot"
                );
                return Admission::Admitted {
                    evicted: Some(victim),
                };
            }
        }

        let position = state.enqueue(QueuedRequest {
            key: key.clone(),
            priority,
        });
        let eta_secs =
            ((position as f64 + 1.0) * state.avg_session_secs).min(self.config.eta_cap_secs as f64);
        debug!(tenant_id = %tenant_id, session_key, position, "request queued");
        Admission::Queued {
            position,
            eta_ms: (eta_secs * 1000.0) as u64,
        }
    }

    /// Release a slot and promote the next eligible queued request.
    pub async fn release(&self, tenant_id: &TenantId, session_key: &str) {
        let key: SlotKey = (tenant_id.clone(), session_key.to_string());
        let mut state = self.state.lock().await;

        let Some(slot) = state.active.remove(&key) else {
            // Releasing a queued (never-admitted) request just drops it.
            state.queue.retain(|q| q.key != key);
            return;
        };

        // Update the moving average used for queue ETAs.
        let duration = slot.since.elapsed().as_secs_f64();
        let n = state.released as f64;
        state.avg_session_secs = (state.avg_session_secs * n + duration) / (n + 1.0);
        state.released += 1;

        // Promote in priority order, skipping requests whose tenant is
        // still at capacity.
        let mut promoted = Vec::new();
        while state.active.len() < self.config.global_max {
            let idx = state.queue.iter().position(|q| {
                state.tenant_active(&q.key.0) < self.config.tenant_max
            });
            let Some(idx) = idx else { break };
            let Some(request) = state.queue.remove(idx) else {
                break;
            };
            state.active.insert(
                request.key.clone(),
                ActiveSlot {
                    priority: request.priority,
                    since: Instant::now(),
                },
            );
            promoted.push(request);
            // Only one release happened; promote exactly one slot.
            break;
        }
        drop(state);

        if !promoted.is_empty() {
            let promotions = self.promotions.lock().await;
            for request in promoted {
                info!(
                    tenant_id = %request.key.0,
                    session_key = %request.key.1,
                    "queued request promoted"
                );
                if let Some(tx) = promotions.as_ref() {
                    let _ = tx.send((request.key, request.priority));
                }
            }
        }
    }

    /// Current occupancy counts for stats reporting.
    pub async fn occupancy(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.active.len(), state.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(global: usize, tenant: usize) -> AdmissionPool {
        AdmissionPool::new(PoolConfig {
            global_max: global,
            tenant_max: tenant,
            eta_cap_secs: 1800,
        })
    }

    fn t(name: &str) -> TenantId {
        TenantId::from(name)
    }

    #[tokio::test]
    async fn admits_until_global_cap_then_queues() {
        let pool = pool(2, 10);
        assert!(matches!(
            pool.request(&t("a"), "s1", Priority::Normal).await,
            Admission::Admitted { evicted: None }
        ));
        assert!(matches!(
            pool.request(&t("b"), "s2", Priority::Normal).await,
            Admission::Admitted { evicted: None }
        ));
        match pool.request(&t("c"), "s3", Priority::Normal).await {
            Admission::Queued { position, eta_ms } => {
                assert_eq!(position, 0);
                assert!(eta_ms > 0);
            }
            other => panic!("expected queue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tenant_cap_queues_even_with_global_room() {
        let pool = pool(10, 1);
        pool.request(&t("a"), "s1", Priority::Normal).await;
        assert!(matches!(
            pool.request(&t("a"), "s2", Priority::Normal).await,
            Admission::Queued { .. }
        ));
        // Another tenant still has room.
        assert!(matches!(
            pool.request(&t("b"), "s1", Priority::Normal).await,
            Admission::Admitted { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let pool = pool(10, 10);
        pool.request(&t("a"), "s1", Priority::Normal).await;
        assert!(matches!(
            pool.request(&t("a"), "s1", Priority::Normal).await,
            Admission::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn high_priority_evicts_a_low_priority_slot_when_full() {
        let pool = pool(2, 10);
        pool.request(&t("a"), "low", Priority::Low).await;
        pool.request(&t("b"), "normal", Priority::Normal).await;

        match pool.request(&t("c"), "vip", Priority::High).await {
            Admission::Admitted { evicted } => {
                assert_eq!(evicted, Some((t("a"), "low".to_string())));
            }
            other => panic!("expected eviction, got {other:?}"),
        }

        // With no low-priority slot left, the next High waits.
        assert!(matches!(
            pool.request(&t("d"), "vip2", Priority::High).await,
            Admission::Queued { .. }
        ));
    }

    #[tokio::test]
    async fn queue_orders_high_before_normal_fifo_within_class() {
        let pool = pool(1, 10);
        pool.request(&t("x"), "active", Priority::Normal).await;

        pool.request(&t("a"), "n1", Priority::Normal).await;
        pool.request(&t("b"), "n2", Priority::Normal).await;
        match pool.request(&t("c"), "h1", Priority::High).await {
            Admission::Queued { position, .. } => assert_eq!(position, 0),
            other => panic!("expected queue, got {other:?}"),
        }
        match pool.request(&t("d"), "h2", Priority::High).await {
            Admission::Queued { position, .. } => assert_eq!(position, 1),
            other => panic!("expected queue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_promotes_next_eligible_request() {
        let pool = pool(1, 10);
        let (tx, mut rx) = mpsc::unbounded_channel();
        pool.set_promotion_channel(tx).await;

        pool.request(&t("a"), "active", Priority::Normal).await;
        pool.request(&t("b"), "waiting", Priority::Normal).await;

        pool.release(&t("a"), "active").await;

        let (key, priority) = rx.recv().await.unwrap();
        assert_eq!(key, (t("b"), "waiting".to_string()));
        assert_eq!(priority, Priority::Normal);

        let (active, queued) = pool.occupancy().await;
        assert_eq!(active, 1);
        assert_eq!(queued, 0);
    }

    #[tokio::test]
    async fn promotion_skips_tenants_still_at_capacity() {
        let pool = pool(2, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        pool.set_promotion_channel(tx).await;

        pool.request(&t("a"), "a1", Priority::Normal).await;
        pool.request(&t("b"), "b1", Priority::Normal).await;
        // tenant a is at its cap of 1; this waits behind the tenant limit.
        pool.request(&t("a"), "a2", Priority::Normal).await;
        pool.request(&t("c"), "c1", Priority::Normal).await;

        // Releasing b's slot must promote c1, not a2 (tenant a still full).
        pool.release(&t("b"), "b1").await;
        let (key, _) = rx.recv().await.unwrap();
        assert_eq!(key, (t("c"), "c1".to_string()));

        // Releasing a's slot now frees a2.
        pool.release(&t("a"), "a1").await;
        let (key, _) = rx.recv().await.unwrap();
        assert_eq!(key, (t("a"), "a2".to_string()));
    }

    #[tokio::test]
    async fn eta_is_capped() {
        let pool = AdmissionPool::new(PoolConfig {
            global_max: 1,
            tenant_max: 1,
            eta_cap_secs: 10,
        });
        pool.request(&t("a"), "active", Priority::Normal).await;
        match pool.request(&t("b"), "w", Priority::Normal).await {
            Admission::Queued { eta_ms, .. } => assert!(eta_ms <= 10_000),
            other => panic!("expected queue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn releasing_a_queued_request_drops_it() {
        let pool = pool(1, 10);
        pool.request(&t("a"), "active", Priority::Normal).await;
        pool.request(&t("b"), "waiting", Priority::Normal).await;
        pool.release(&t("b"), "waiting").await;
        let (active, queued) = pool.occupancy().await;
        assert_eq!((active, queued), (1, 0));
    }
}
