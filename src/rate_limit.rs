// Fixed-window limiter. Counters live in process memory and reset on restart;
// bursts of up to twice the cap are possible across a window seam.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::metrics::RATE_LIMIT_ENTRIES;

// Rate limit entry - tracks requests per IP/project key
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

// Separate namespaces so a project id can never share a counter with an IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    Ip,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatePreset {
    PublicPerMinute,
    PublicPerHour,
    ProjectPerDay,
    WebhookPerMinute,
}

impl RatePreset {
    pub fn name(&self) -> &'static str {
        match self {
            RatePreset::PublicPerMinute => "public-minute",
            RatePreset::PublicPerHour => "public-hour",
            RatePreset::ProjectPerDay => "project-day",
            RatePreset::WebhookPerMinute => "webhook-minute",
        }
    }

    pub fn bucket(&self) -> BucketKind {
        match self {
            RatePreset::ProjectPerDay => BucketKind::Project,
            _ => BucketKind::Ip,
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            RatePreset::PublicPerMinute | RatePreset::WebhookPerMinute => Duration::seconds(60),
            RatePreset::PublicPerHour => Duration::seconds(3600),
            RatePreset::ProjectPerDay => Duration::seconds(86400),
        }
    }
}

// caps for each preset, filled in from the CLI
#[derive(Debug, Clone, Copy)]
pub struct RatePresets {
    pub public_per_minute: u32,
    pub public_per_hour: u32,
    pub project_per_day: u32,
    pub webhook_per_minute: u32,
}

impl Default for RatePresets {
    fn default() -> Self {
        Self {
            public_per_minute: 100,
            public_per_hour: 1000,
            project_per_day: 10000,
            webhook_per_minute: 30,
        }
    }
}

impl RatePresets {
    pub fn limit(&self, preset: RatePreset) -> u32 {
        match preset {
            RatePreset::PublicPerMinute => self.public_per_minute,
            RatePreset::PublicPerHour => self.public_per_hour,
            RatePreset::ProjectPerDay => self.project_per_day,
            RatePreset::WebhookPerMinute => self.webhook_per_minute,
        }
    }
}

pub struct RateLimiter {
    ip: DashMap<String, RateLimitEntry>,
    project: DashMap<String, RateLimitEntry>,
    presets: RatePresets,
    purge_probability: f64,
}

impl RateLimiter {
    pub fn new(presets: RatePresets, purge_probability: f64) -> Self {
        Self {
            ip: DashMap::new(),
            project: DashMap::new(),
            presets,
            purge_probability: purge_probability.clamp(0.0, 1.0),
        }
    }

    fn map(&self, kind: BucketKind) -> &DashMap<String, RateLimitEntry> {
        match kind {
            BucketKind::Ip => &self.ip,
            BucketKind::Project => &self.project,
        }
    }

    pub fn check(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        kind: BucketKind,
    ) -> RateDecision {
        let now = Utc::now();
        if self.purge_probability > 0.0 && fastrand::f64() < self.purge_probability {
            self.purge_expired(now);
        }
        self.check_at(identifier, limit, window, kind, now)
    }

    pub fn check_at(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        kind: BucketKind,
        now: DateTime<Utc>,
    ) -> RateDecision {
        // entry() holds the shard lock for the whole read-modify-write
        let mut entry = self
            .map(kind)
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                reset_at: now + window,
            });

        // fresh entry or expired window
        if entry.count == 0 || now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + window;
            return RateDecision {
                allowed: limit > 0,
                remaining: limit.saturating_sub(1),
                reset_at: entry.reset_at,
            };
        }

        if entry.count >= limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: limit - entry.count,
            reset_at: entry.reset_at,
        }
    }

    pub fn check_preset(&self, preset: RatePreset, identifier: &str, now: DateTime<Utc>) -> RateDecision {
        self.check_at(
            &Self::preset_key(preset, identifier),
            self.presets.limit(preset),
            preset.window(),
            preset.bucket(),
            now,
        )
    }

    // Denied if any preset denies. A denied request consumes nothing: slots
    // already taken from earlier presets are handed back. reset_at is the
    // latest among the denying presets, remaining the tightest budget.
    pub fn check_presets(&self, checks: &[(RatePreset, &str)], now: DateTime<Utc>) -> RateDecision {
        if self.purge_probability > 0.0 && fastrand::f64() < self.purge_probability {
            self.purge_expired(now);
        }

        let mut granted: Vec<(RatePreset, &str, RateDecision)> = Vec::with_capacity(checks.len());
        for (i, &(preset, identifier)) in checks.iter().enumerate() {
            let decision = self.check_preset(preset, identifier, now);
            if !decision.allowed {
                for (preset, identifier, taken) in &granted {
                    self.refund(*preset, identifier, taken.reset_at);
                }
                // the rest are only inspected so the caller learns the longest wait
                let mut denied = decision;
                for &(preset, identifier) in &checks[i + 1..] {
                    denied = merge(denied, self.peek_preset(preset, identifier, now));
                }
                return denied;
            }
            granted.push((preset, identifier, decision));
        }

        granted
            .into_iter()
            .map(|(_, _, decision)| decision)
            .reduce(merge)
            .unwrap_or(RateDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_at: now,
            })
    }

    fn preset_key(preset: RatePreset, identifier: &str) -> String {
        format!("{}:{}", preset.name(), identifier)
    }

    // gives back one slot, unless the window has rolled over since
    fn refund(&self, preset: RatePreset, identifier: &str, reset_at: DateTime<Utc>) {
        let key = Self::preset_key(preset, identifier);
        if let Some(mut entry) = self.map(preset.bucket()).get_mut(&key) {
            if entry.reset_at == reset_at && entry.count > 0 {
                entry.count -= 1;
            }
        }
    }

    // decision the next request would get, without consuming a slot
    pub fn peek_preset(&self, preset: RatePreset, identifier: &str, now: DateTime<Utc>) -> RateDecision {
        let limit = self.presets.limit(preset);
        let key = Self::preset_key(preset, identifier);
        match self.map(preset.bucket()).get(&key) {
            Some(entry) if entry.count > 0 && now <= entry.reset_at => RateDecision {
                allowed: entry.count < limit,
                remaining: limit.saturating_sub(entry.count),
                reset_at: entry.reset_at,
            },
            _ => RateDecision {
                allowed: limit > 0,
                remaining: limit,
                reset_at: now + preset.window(),
            },
        }
    }

    // drops entries whose window has passed; only affects memory use
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.len();
        self.ip.retain(|_, entry| entry.reset_at >= now);
        self.project.retain(|_, entry| entry.reset_at >= now);
        let after = self.len();

        RATE_LIMIT_ENTRIES.set(after as f64);
        if before > after {
            tracing::debug!(purged = before - after, remaining = after, "purged expired rate limit entries");
        }
        before - after
    }

    pub fn len(&self) -> usize {
        self.ip.len() + self.project.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn merge(a: RateDecision, b: RateDecision) -> RateDecision {
    match (a.allowed, b.allowed) {
        (true, true) => RateDecision {
            allowed: true,
            remaining: a.remaining.min(b.remaining),
            reset_at: a.reset_at.min(b.reset_at),
        },
        (false, false) => RateDecision {
            allowed: false,
            remaining: 0,
            reset_at: a.reset_at.max(b.reset_at),
        },
        (false, true) => a,
        (true, false) => b,
    }
}
