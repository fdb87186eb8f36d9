use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, cheap enough to bump from any hot path.
/// Exposed as JSON at `/metrics`.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    sessions_started: AtomicU64,
    sessions_finished: AtomicU64,
    sessions_abandoned: AtomicU64,
    actions_accepted: AtomicU64,
    actions_rejected: AtomicU64,
    deaths_resolved: AtomicU64,
    phase_transitions: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    retry_attempts: AtomicU64,
    retry_successes: AtomicU64,
    subscribers_active: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub sessions_abandoned: u64,
    pub actions_accepted: u64,
    pub actions_rejected: u64,
    pub deaths_resolved: u64,
    pub phase_transitions: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    pub retry_attempts: u64,
    pub retry_successes: u64,
    pub subscribers_active: u64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sessions_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_finished(&self) {
        self.sessions_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sessions_abandoned(&self) {
        self.sessions_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_actions_accepted(&self) {
        self.actions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_actions_rejected(&self) {
        self.actions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_deaths_resolved(&self, count: u64) {
        self.deaths_resolved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_phase_transitions(&self) {
        self.phase_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retry_attempts(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retry_successes(&self) {
        self.retry_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_subscribers_active(&self) {
        self.subscribers_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_subscribers_active(&self) {
        // Saturating: a late unsubscribe after drain must not wrap
        let _ = self
            .subscribers_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_finished: self.sessions_finished.load(Ordering::Relaxed),
            sessions_abandoned: self.sessions_abandoned.load(Ordering::Relaxed),
            actions_accepted: self.actions_accepted.load(Ordering::Relaxed),
            actions_rejected: self.actions_rejected.load(Ordering::Relaxed),
            deaths_resolved: self.deaths_resolved.load(Ordering::Relaxed),
            phase_transitions: self.phase_transitions.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            retry_successes: self.retry_successes.load(Ordering::Relaxed),
            subscribers_active: self.subscribers_active.load(Ordering::Relaxed),
        }
    }
}
