//! Per-provider rate-limit countdowns
//!
//! A provider goes Unknown → Active on a rate-limit message and Active →
//! Expired once its countdown reaches zero. The tracker asks for a one-second
//! tick only while some provider is still Active.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::message::RateLimitMsg;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

const UNKNOWN_PROVIDER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    Unknown,
    Active,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRateLimit {
    pub provider: String,
    pub agent: String,
    pub reset_at: DateTime<Utc>,
    pub remaining: Duration,
    pub active: bool,
}

impl ProviderRateLimit {
    /// `mm:ss` while counting down, `OK` after
    pub fn countdown(&self) -> String {
        if !self.active {
            return "OK".into();
        }
        let secs = self.remaining.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

fn remaining_until(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // Negative deltas fail `to_std`, which floors them at zero.
    (reset_at - now).to_std().unwrap_or(Duration::ZERO)
}

fn provider_key(msg: &RateLimitMsg) -> &str {
    if !msg.provider.is_empty() {
        &msg.provider
    } else if !msg.agent.is_empty() {
        &msg.agent
    } else {
        UNKNOWN_PROVIDER
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitTracker {
    limits: Arc<Vec<ProviderRateLimit>>,
    ticking: bool,
    interval: Duration,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::with_interval(TICK_INTERVAL)
    }
}

impl RateLimitTracker {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            limits: Arc::default(),
            ticking: false,
            interval,
        }
    }

    /// Record a rate-limit event. Returns a tick request if no tick chain is running.
    pub fn apply(&mut self, msg: &RateLimitMsg) -> Option<Duration> {
        let key = provider_key(msg).to_string();
        let remaining = remaining_until(msg.reset_at, msg.timestamp);
        let limit = ProviderRateLimit {
            provider: key.clone(),
            agent: msg.agent.clone(),
            reset_at: msg.reset_at,
            remaining,
            active: !remaining.is_zero(),
        };

        let limits = Arc::make_mut(&mut self.limits);
        match limits.iter_mut().find(|l| l.provider == key) {
            Some(existing) => *existing = limit,
            None => limits.push(limit),
        }

        self.request_tick()
    }

    /// Recompute every active countdown against `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        // A tick owns the chain; it is re-armed below only if still needed.
        self.ticking = false;
        if self.limits.iter().any(|l| l.active) {
            let limits = Arc::make_mut(&mut self.limits);
            for limit in limits.iter_mut().filter(|l| l.active) {
                limit.remaining = remaining_until(limit.reset_at, now);
                if limit.remaining.is_zero() {
                    limit.active = false;
                }
            }
        }
        self.request_tick()
    }

    fn request_tick(&mut self) -> Option<Duration> {
        if self.ticking || !self.any_active() {
            return None;
        }
        self.ticking = true;
        Some(self.interval)
    }

    pub fn any_active(&self) -> bool {
        self.limits.iter().any(|l| l.active)
    }

    pub fn state(&self, provider: &str) -> LimitState {
        match self.limits.iter().find(|l| l.provider == provider) {
            None => LimitState::Unknown,
            Some(l) if l.active => LimitState::Active,
            Some(_) => LimitState::Expired,
        }
    }

    /// First-seen order
    pub fn snapshot(&self) -> Arc<Vec<ProviderRateLimit>> {
        Arc::clone(&self.limits)
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}
