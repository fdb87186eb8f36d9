use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::game::state::SessionConfig;
use crate::hub::EventHub;
use crate::metrics::{MetricsSnapshot, ServerMetrics};
use crate::protocol::SessionId;
use crate::store::{create_store, MemoryStore, StoreConfig};

mod action_service;
mod scheduler;
mod session_service;
mod voice_service;

pub use action_service::SubmitReceipt;
pub use voice_service::{HmacVoiceTokenProvider, VoiceGrant, VoiceTokenProvider};

/// Engine tuning, derived from the loaded [`Config`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bound on waiting for a session lock before `Busy`
    pub lock_timeout: Duration,
    /// Replay buffer length per session
    pub event_buffer_size: usize,
    /// Cap on concurrently retained sessions
    pub max_sessions: usize,
    /// Game defaults for sessions started without an explicit config
    pub default_session: SessionConfig,
    /// Arm the per-session deadline timers. Always on in production;
    /// deterministic tests and offline tooling step sessions manually
    /// through [`GameServer::advance_session`] instead.
    pub drive_timers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            event_buffer_size: 128,
            max_sessions: 1_024,
            default_session: SessionConfig::default(),
            drive_timers: true,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_timeout: Duration::from_millis(config.server.lock_timeout_ms),
            event_buffer_size: config.server.event_buffer_size,
            max_sessions: config.server.max_sessions,
            default_session: config.game.clone(),
            drive_timers: true,
        }
    }
}

/// Per-session scheduler handle: the early-fire doorbell and the timer
/// task's cancellation token.
pub(crate) struct SchedulerHandle {
    pub(crate) notify: Arc<Notify>,
    pub(crate) cancel: CancellationToken,
}

/// The authoritative game server: session registry, store, event hub and
/// per-session phase timers. One instance per process; sessions are pinned
/// to it.
pub struct GameServer {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) hub: Arc<EventHub>,
    pub(crate) metrics: Arc<ServerMetrics>,
    pub(crate) config: EngineConfig,
    pub(crate) voice: Arc<dyn VoiceTokenProvider>,
    pub(crate) timers: DashMap<SessionId, SchedulerHandle>,
    pub(crate) shutdown: CancellationToken,
}

impl GameServer {
    pub fn new(config: EngineConfig, voice: Arc<dyn VoiceTokenProvider>) -> Arc<Self> {
        let metrics = Arc::new(ServerMetrics::new());
        let store = create_store(StoreConfig::InMemory);
        let hub = Arc::new(EventHub::new(config.event_buffer_size, metrics.clone()));
        Arc::new(Self {
            store,
            hub,
            metrics,
            config,
            voice,
            timers: DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn health_check(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Graceful shutdown: stop all timers and drain subscriber streams.
    /// Session state stays in the store until the process exits.
    pub async fn shutdown(&self) {
        tracing::info!("draining game server");
        self.shutdown.cancel();
        for entry in self.timers.iter() {
            entry.value().cancel.cancel();
        }
        self.timers.clear();
        self.hub.drain().await;
    }

    pub(crate) fn lock_timeout(&self) -> Duration {
        self.config.lock_timeout
    }
}
