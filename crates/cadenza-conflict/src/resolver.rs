// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mobile-conflict pause/resume.
//!
//! Manual activity on the paired mobile device while a campaign is sending
//! looks exactly like the account being in two places at once, which is a
//! ban signal. When a trigger device becomes active, every ongoing campaign
//! of that tenant-session pair is paused in one atomic store operation,
//! then resumed after a per-tier cooldown once the device has gone quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadenza_config::model::ConflictConfig;
use cadenza_core::{
    CadenzaError, CampaignId, OrchestratorStore, ResumeOutcome, SessionId, TenantId,
    Transport,
};

pub struct ConflictResolver {
    config: ConflictConfig,
    store: Arc<dyn OrchestratorStore>,
    transport: Arc<dyn Transport>,
    timers: DashMap<CampaignId, (u64, CancellationToken)>,
    generation: AtomicU64,
}

impl ConflictResolver {
    pub fn new(
        config: ConflictConfig,
        store: Arc<dyn OrchestratorStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            timers: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// React to manual activity on a paired device. Pauses every ongoing
    /// campaign of the tenant-session pair and schedules their auto-resume.
    /// Returns the ids that were paused.
    pub async fn handle_mobile_activity(
        self: &Arc<Self>,
        tenant_id: &TenantId,
        session_id: &SessionId,
        device_type: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, CadenzaError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        if !self.is_trigger_device(device_type) {
            debug!(device_type, "device type does not trigger a pause");
            return Ok(Vec::new());
        }

        // The stored resume hint uses the slowest tier's cooldown; the
        // per-campaign timers below use each campaign's own tier.
        let hint = observed_at
            + chrono::Duration::from_std(self.config.cooldown_for_tier(1))
                .unwrap_or(chrono::Duration::seconds(60));
        let reason = format!("mobile_activity:{device_type}");
        let paused = self
            .store
            .pause_ongoing_campaigns(tenant_id, session_id, hint, &reason)
            .await?;
        if paused.is_empty() {
            return Ok(paused);
        }

        info!(
            tenant_id = %tenant_id,
            session_id = %session_id,
            device_type,
            count = paused.len(),
            "campaigns paused for mobile conflict"
        );

        for campaign_id in &paused {
            let tier = match self.store.get_campaign(campaign_id).await? {
                Some(record) => record.speed_tier,
                None => 1,
            };
            let cooldown = self.config.cooldown_for_tier(tier);
            self.schedule_resume(campaign_id.clone(), session_id.clone(), cooldown);
        }
        Ok(paused)
    }

    /// Resume a campaign now, cancelling its pending auto-resume timer.
    pub async fn resume_now(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<ResumeOutcome, CadenzaError> {
        self.cancel(campaign_id);
        self.store.resume_campaign(campaign_id).await
    }

    /// Drop the pending timer for a campaign, if any.
    pub fn cancel(&self, campaign_id: &CampaignId) {
        if let Some((_, (_, token))) = self.timers.remove(campaign_id) {
            token.cancel();
        }
    }

    /// Number of campaigns with a pending auto-resume timer.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    fn is_trigger_device(&self, device_type: &str) -> bool {
        self.config
            .trigger_devices
            .iter()
            .any(|d| d.eq_ignore_ascii_case(device_type))
    }

    fn schedule_resume(
        self: &Arc<Self>,
        campaign_id: CampaignId,
        session_id: SessionId,
        cooldown: Duration,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        if let Some((_, previous)) = self
            .timers
            .insert(campaign_id.clone(), (generation, token.clone()))
        {
            previous.cancel();
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = cooldown;
            for attempt in 1..=this.config.max_resume_attempts {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                match this.quiet_for(&session_id, cooldown).await {
                    Ok(None) => {
                        this.finish_resume(&campaign_id).await;
                        break;
                    }
                    Ok(Some(remaining)) => {
                        if attempt == this.config.max_resume_attempts {
                            warn!(
                                campaign_id = %campaign_id,
                                attempts = attempt,
                                "auto-resume gave up, campaign stays paused"
                            );
                        } else {
                            debug!(
                                campaign_id = %campaign_id,
                                attempt,
                                remaining_secs = remaining.as_secs(),
                                "device still active, auto-resume deferred"
                            );
                            delay = remaining;
                        }
                    }
                    Err(e) => {
                        warn!(campaign_id = %campaign_id, error = %e, "auto-resume check failed");
                        delay = cooldown;
                    }
                }
            }
            this.timers
                .remove_if(&campaign_id, |_, (g, _)| *g == generation);
        });
    }

    /// `None` when the device has been quiet for a full cooldown, otherwise
    /// how long until the cooldown would elapse.
    async fn quiet_for(
        &self,
        session_id: &SessionId,
        cooldown: Duration,
    ) -> Result<Option<Duration>, CadenzaError> {
        let Some(last) = self.transport.last_mobile_activity(session_id).await? else {
            // Unknown activity reads as quiet; the pause already bought
            // a full cooldown of silence.
            return Ok(None);
        };
        let elapsed = (Utc::now() - last).to_std().unwrap_or_default();
        if elapsed >= cooldown {
            Ok(None)
        } else {
            Ok(Some((cooldown - elapsed).max(Duration::from_secs(1))))
        }
    }

    async fn finish_resume(&self, campaign_id: &CampaignId) {
        match self.store.resume_campaign(campaign_id).await {
            Ok(ResumeOutcome::Resumed) => {
                info!(campaign_id = %campaign_id, "campaign auto-resumed");
            }
            Ok(ResumeOutcome::AlreadyOngoing) => {
                debug!(campaign_id = %campaign_id, "campaign already resumed");
            }
            Ok(ResumeOutcome::NotFound | ResumeOutcome::NotResumable) => {
                debug!(campaign_id = %campaign_id, "campaign no longer resumable");
            }
            Err(e) => {
                warn!(campaign_id = %campaign_id, error = %e, "auto-resume failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::{CampaignRecord, CampaignStatus};
    use cadenza_test_utils::{MemoryStore, MockTransport};

    fn campaign(id: &str, tenant: &str, session: &str, tier: u8) -> CampaignRecord {
        CampaignRecord {
            id: CampaignId::from(id),
            tenant_id: TenantId::from(tenant),
            session_id: SessionId::from(session),
            status: CampaignStatus::Ongoing,
            speed_tier: tier,
            paused_at: None,
            pause_reason: None,
            auto_resume_at: None,
            pause_count: 0,
            paused_by_session: None,
            updated_at: Utc::now(),
        }
    }

    fn resolver(
        config: ConflictConfig,
        store: Arc<MemoryStore>,
        transport: Arc<MockTransport>,
    ) -> Arc<ConflictResolver> {
        Arc::new(ConflictResolver::new(config, store, transport))
    }

    #[tokio::test]
    async fn mobile_activity_pauses_ongoing_campaigns_on_the_session() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c1", "t1", "s1", 2)).await;
        store.put_campaign(campaign("c2", "t1", "s1", 3)).await;
        store.put_campaign(campaign("c3", "t2", "s2", 2)).await;

        let resolver = resolver(
            ConflictConfig::default(),
            store.clone(),
            Arc::new(MockTransport::new()),
        );
        let paused = resolver
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "android",
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(paused, vec![CampaignId::from("c1"), CampaignId::from("c2")]);
        assert_eq!(resolver.pending(), 2);

        let c1 = store.get_campaign(&CampaignId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.status, CampaignStatus::PausedMobile);
        assert_eq!(c1.pause_count, 1);
        assert_eq!(c1.paused_by_session, Some(SessionId::from("s1")));

        let c3 = store.get_campaign(&CampaignId::from("c3")).await.unwrap().unwrap();
        assert_eq!(c3.status, CampaignStatus::Ongoing);
    }

    #[tokio::test]
    async fn campaigns_on_the_tenants_other_sessions_stay_ongoing() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c-s1", "t1", "s1", 2)).await;
        store.put_campaign(campaign("c-s2", "t1", "s2", 2)).await;

        let resolver = resolver(
            ConflictConfig::default(),
            store.clone(),
            Arc::new(MockTransport::new()),
        );
        let paused = resolver
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "android",
                Utc::now(),
            )
            .await
            .unwrap();

        // Activity on s1 must not touch the campaign sending through s2.
        assert_eq!(paused, vec![CampaignId::from("c-s1")]);
        assert_eq!(resolver.pending(), 1);

        let other = store
            .get_campaign(&CampaignId::from("c-s2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.status, CampaignStatus::Ongoing);
        assert_eq!(other.pause_count, 0);
        assert!(other.paused_by_session.is_none());
    }

    #[tokio::test]
    async fn non_trigger_devices_and_disabled_flag_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c1", "t1", "s1", 1)).await;
        let transport = Arc::new(MockTransport::new());

        let resolver_on = resolver(ConflictConfig::default(), store.clone(), transport.clone());
        let paused = resolver_on
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "desktop",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(paused.is_empty());

        let config = ConflictConfig {
            enabled: false,
            ..ConflictConfig::default()
        };
        let resolver_off = resolver(config, store.clone(), transport);
        let paused = resolver_off
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "android",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(paused.is_empty());

        let c1 = store.get_campaign(&CampaignId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.status, CampaignStatus::Ongoing);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_device_auto_resumes_after_the_tier_cooldown() {
        let store = Arc::new(MemoryStore::new());
        // Tier 2 cools down in 45s.
        store.put_campaign(campaign("c1", "t1", "s1", 2)).await;
        let transport = Arc::new(MockTransport::new());
        // Last activity long before the pause: reads as quiet.
        transport
            .set_mobile_activity(&SessionId::from("s1"), Utc::now() - chrono::Duration::hours(1))
            .await;

        let resolver = resolver(ConflictConfig::default(), store.clone(), transport);
        resolver
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "ios",
                Utc::now(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(46)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let c1 = store.get_campaign(&CampaignId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.status, CampaignStatus::Ongoing);
        assert_eq!(c1.pause_count, 1, "resume keeps the pause counter");
        assert!(c1.auto_resume_at.is_none());
        assert_eq!(resolver.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn active_device_defers_and_eventually_gives_up() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c1", "t1", "s1", 4)).await;
        let transport = Arc::new(MockTransport::new());

        let config = ConflictConfig {
            max_resume_attempts: 3,
            ..ConflictConfig::default()
        };
        let resolver = resolver(config, store.clone(), transport.clone());
        resolver
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "android",
                Utc::now(),
            )
            .await
            .unwrap();
        // The device keeps looking freshly active on every check.
        transport
            .set_mobile_activity(&SessionId::from("s1"), Utc::now())
            .await;

        // Far beyond 3 attempts x 20s tier-4 cooldown.
        tokio::time::sleep(Duration::from_secs(600)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let c1 = store.get_campaign(&CampaignId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.status, CampaignStatus::PausedMobile, "stays paused for manual resume");
        assert_eq!(resolver.pending(), 0, "timer retired after giving up");
    }

    #[tokio::test(start_paused = true)]
    async fn manual_resume_cancels_the_pending_timer() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c1", "t1", "s1", 1)).await;
        let transport = Arc::new(MockTransport::new());

        let resolver = resolver(ConflictConfig::default(), store.clone(), transport);
        resolver
            .handle_mobile_activity(
                &TenantId::from("t1"),
                &SessionId::from("s1"),
                "android",
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(resolver.pending(), 1);

        let outcome = resolver.resume_now(&CampaignId::from("c1")).await.unwrap();
        assert_eq!(outcome, ResumeOutcome::Resumed);
        assert_eq!(resolver.pending(), 0);

        // Idempotent: a second resume is a no-op.
        let outcome = resolver.resume_now(&CampaignId::from("c1")).await.unwrap();
        assert_eq!(outcome, ResumeOutcome::AlreadyOngoing);
    }

    #[tokio::test]
    async fn repeated_activity_replaces_the_timer_and_counts_pauses() {
        let store = Arc::new(MemoryStore::new());
        store.put_campaign(campaign("c1", "t1", "s1", 1)).await;
        let transport = Arc::new(MockTransport::new());

        let resolver = resolver(ConflictConfig::default(), store.clone(), transport);
        for _ in 0..2 {
            resolver
                .handle_mobile_activity(
                    &TenantId::from("t1"),
                    &SessionId::from("s1"),
                    "android",
                    Utc::now(),
                )
                .await
                .unwrap();
            // Simulate the campaign runner resuming in between.
            if resolver.pending() == 1 {
                resolver.resume_now(&CampaignId::from("c1")).await.unwrap();
            }
        }

        let c1 = store.get_campaign(&CampaignId::from("c1")).await.unwrap().unwrap();
        assert_eq!(c1.pause_count, 2);
    }
}
