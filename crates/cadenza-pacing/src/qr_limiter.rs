// SPDX-FileCopyrightText: 2026 Cadenza Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! QR issuance throttling.
//!
//! QR generation is the most detectable operation a session performs, so it
//! is throttled three ways: per tenant per hour, per tenant per day, and
//! globally per hour across all tenants. The global window is checked first
//! so a single tenant cannot learn anything about others' usage from which
//! limit rejects them.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use cadenza_config::model::QrConfig;
use cadenza_core::{CadenzaError, RateLimitKind, TenantId};

const HOUR: TimeDelta = TimeDelta::seconds(3600);
const DAY: TimeDelta = TimeDelta::seconds(86_400);

#[derive(Debug, Default)]
struct TenantQrWindow {
    hour: VecDeque<DateTime<Utc>>,
    day: VecDeque<DateTime<Utc>>,
}

pub struct QrLimiter {
    config: QrConfig,
    tenants: DashMap<TenantId, TenantQrWindow>,
    global_hour: Mutex<VecDeque<DateTime<Utc>>>,
}

impl QrLimiter {
    pub fn new(config: QrConfig) -> Self {
        Self {
            config,
            tenants: DashMap::new(),
            global_hour: Mutex::new(VecDeque::new()),
        }
    }

    /// Check and record one QR generation for `tenant`.
    ///
    /// On rejection, `retry_after` is the time until the oldest timestamp
    /// in the violated window ages out, i.e. the earliest instant a retry
    /// can succeed.
    pub fn acquire(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<(), CadenzaError> {
        {
            let mut global = self
                .global_hour
                .lock()
                .map_err(|_| CadenzaError::Internal("qr limiter lock poisoned".into()))?;
            prune(&mut global, now, HOUR);
            if global.len() as u32 >= self.config.global_per_hour {
                return Err(rejection(
                    RateLimitKind::QrGlobalHourly,
                    &global,
                    self.config.global_per_hour,
                    HOUR,
                    now,
                ));
            }
        }

        let mut entry = self.tenants.entry(tenant.clone()).or_default();
        prune(&mut entry.hour, now, HOUR);
        prune(&mut entry.day, now, DAY);

        if entry.hour.len() as u32 >= self.config.tenant_per_hour {
            return Err(rejection(
                RateLimitKind::QrTenantHourly,
                &entry.hour,
                self.config.tenant_per_hour,
                HOUR,
                now,
            ));
        }
        if entry.day.len() as u32 >= self.config.tenant_per_day {
            return Err(rejection(
                RateLimitKind::QrTenantDaily,
                &entry.day,
                self.config.tenant_per_day,
                DAY,
                now,
            ));
        }

        entry.hour.push_back(now);
        entry.day.push_back(now);
        drop(entry);

        if let Ok(mut global) = self.global_hour.lock() {
            global.push_back(now);
        }
        Ok(())
    }

    /// Forget a tenant's windows, e.g. when its last session is destroyed.
    /// Global counts are kept; they reflect real issuance.
    pub fn forget_tenant(&self, tenant: &TenantId) {
        self.tenants.remove(tenant);
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, span: TimeDelta) {
    while window.front().is_some_and(|t| now - *t >= span) {
        window.pop_front();
    }
}

fn rejection(
    kind: RateLimitKind,
    window: &VecDeque<DateTime<Utc>>,
    limit: u32,
    span: TimeDelta,
    now: DateTime<Utc>,
) -> CadenzaError {
    let retry_after = window
        .front()
        .map(|oldest| *oldest + span - now)
        .and_then(|delta| delta.to_std().ok());
    CadenzaError::RateLimited {
        kind,
        current: window.len() as u64 + 1,
        limit: u64::from(limit),
        retry_after,
    }
}
