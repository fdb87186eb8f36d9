//! Per-session event fan-out.
//!
//! Each connected client subscribes with its player identity; published
//! rows are filtered per recipient, phase-change snapshots are projected
//! per recipient, and the last K rows are buffered so a reconnecting
//! client can replay what it missed. Delivery is at-least-once from the
//! client's perspective; `(phase_number, sequence)` is the dedup key.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::game::state::EventRow;
use crate::game::view;
use crate::metrics::ServerMetrics;
use crate::protocol::messages::{EventBody, EventEnvelope, ServerEvent};
use crate::protocol::{PlayerId, SessionId};
use crate::store::SessionRecord;

/// Lower bound on the replay buffer, per the event-surface contract.
pub const MIN_EVENT_BUFFER: usize = 64;

/// Outbound queue depth per subscriber before events are dropped (the
/// client recovers them via reconnect replay).
const SUBSCRIBER_QUEUE: usize = 256;

struct SessionChannel {
    subscribers: RwLock<HashMap<PlayerId, mpsc::Sender<ServerEvent>>>,
    buffer: RwLock<VecDeque<EventRow>>,
}

/// Process-wide fan-out hub. Lifecycle: created at boot, drained at
/// shutdown; per-session channels appear on first use.
pub struct EventHub {
    sessions: DashMap<SessionId, Arc<SessionChannel>>,
    buffer_size: usize,
    metrics: Arc<ServerMetrics>,
}

impl EventHub {
    pub fn new(buffer_size: usize, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer_size: buffer_size.max(MIN_EVENT_BUFFER),
            metrics,
        }
    }

    fn channel(&self, id: &SessionId) -> Arc<SessionChannel> {
        self.sessions
            .entry(*id)
            .or_insert_with(|| {
                Arc::new(SessionChannel {
                    subscribers: RwLock::new(HashMap::new()),
                    buffer: RwLock::new(VecDeque::new()),
                })
            })
            .clone()
    }

    /// Register `player` as a subscriber. The receiver first yields the
    /// current projection, then the recipient-filtered backlog after
    /// `after_sequence` (when given), then live events. A previous
    /// subscription for the same player is replaced.
    pub async fn subscribe(
        &self,
        record: &SessionRecord,
        player: PlayerId,
        after_sequence: Option<u64>,
    ) -> mpsc::Receiver<ServerEvent> {
        let channel = self.channel(&record.session.id);
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE);

        let projection = view::project(record, Some(player));
        let _ = sender.send(ServerEvent::State(Box::new(projection))).await;

        if let Some(after) = after_sequence {
            let buffer = channel.buffer.read().await;
            for row in buffer.iter().filter(|row| row.sequence > after) {
                if let Some(event) = deliverable(record, row, player) {
                    let _ = sender.send(event).await;
                }
            }
        }

        let mut subscribers = channel.subscribers.write().await;
        if subscribers.insert(player, sender).is_none() {
            self.metrics.increment_subscribers_active();
        }
        debug!(session = %record.session.id, %player, "subscriber registered");
        receiver
    }

    /// Remove one subscriber; its stream ends.
    pub async fn unsubscribe(&self, session_id: &SessionId, player: &PlayerId) {
        if let Some(channel) = self.sessions.get(session_id).map(|e| Arc::clone(e.value())) {
            let mut subscribers = channel.subscribers.write().await;
            if subscribers.remove(player).is_some() {
                self.metrics.decrement_subscribers_active();
            }
        }
    }

    /// Fan committed events out to entitled subscribers and append them to
    /// the replay buffer. `record` is the post-commit snapshot used for
    /// per-recipient phase-change projections.
    pub async fn publish(&self, record: &SessionRecord, events: &[EventRow]) {
        if events.is_empty() {
            return;
        }
        let channel = self.channel(&record.session.id);

        {
            let mut buffer = channel.buffer.write().await;
            for row in events {
                buffer.push_back(row.clone());
                while buffer.len() > self.buffer_size {
                    buffer.pop_front();
                }
            }
        }

        // Stack-allocated for typical table sizes
        let subscribers: SmallVec<[(PlayerId, mpsc::Sender<ServerEvent>); 16]> = {
            let guard = channel.subscribers.read().await;
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        for row in events {
            self.metrics.increment_events_published();
            for (player, sender) in &subscribers {
                if let Some(event) = deliverable(record, row, *player) {
                    if sender.try_send(event).is_err() {
                        self.metrics.increment_events_dropped();
                        warn!(
                            session = %record.session.id,
                            %player,
                            sequence = row.sequence,
                            "subscriber queue full, event dropped"
                        );
                    }
                }
            }
        }
    }

    /// Drop every subscriber of one session (terminal teardown). The
    /// replay buffer is retained for late `get_state`-and-subscribe flows.
    pub async fn close_session(&self, session_id: &SessionId) {
        if let Some(channel) = self.sessions.get(session_id).map(|e| Arc::clone(e.value())) {
            let mut subscribers = channel.subscribers.write().await;
            for _ in subscribers.drain() {
                self.metrics.decrement_subscribers_active();
            }
        }
    }

    /// Drain everything at process shutdown.
    pub async fn drain(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.close_session(&id).await;
        }
    }
}

/// Compute what `player` receives for `row`: the full body when entitled,
/// a redacted body when one exists, nothing otherwise. Phase changes and
/// game over carry a per-recipient snapshot.
fn deliverable(record: &SessionRecord, row: &EventRow, player: PlayerId) -> Option<ServerEvent> {
    let entitled = row.recipients.contains(&player);
    let body = if entitled {
        row.body.clone()
    } else {
        row.body.redacted()?
    };
    let snapshot = matches!(
        body,
        EventBody::PhaseChange(_) | EventBody::GameOver { .. }
    )
    .then(|| Box::new(view::project(record, Some(player))));

    Some(ServerEvent::Event(Box::new(EventEnvelope {
        phase_number: row.phase_number,
        sequence: row.sequence,
        body,
        snapshot,
    })))
}
