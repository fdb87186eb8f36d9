//! Transactional in-memory row store.
//!
//! Four logical tables per session (session, players, actions, events)
//! held together in one [`SessionRecord`]. One write lock per session
//! serializes all writers; a transaction runs against a working copy of the
//! record, so rollback is simply dropping the copy. Readers clone a
//! consistent snapshot without contending with writers beyond the lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::game::error::EngineError;
use crate::game::state::{ActionRow, EventRow, PlayerRow, Recipients, SessionRow};
use crate::protocol::messages::EventBody;
use crate::protocol::{ActionKind, PlayerId, SessionId, UserId};

/// Store configuration: in-memory only for wolfden-server.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    #[default]
    InMemory,
}

/// Create a store instance based on configuration.
pub fn create_store(config: StoreConfig) -> Arc<MemoryStore> {
    match config {
        StoreConfig::InMemory => Arc::new(MemoryStore::new()),
    }
}

/// All rows owned by one session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: SessionRow,
    /// Ordered by seat
    pub players: Vec<PlayerRow>,
    pub actions: Vec<ActionRow>,
    /// Append-only, ordered by sequence
    pub events: Vec<EventRow>,
    next_sequence: u64,
}

impl SessionRecord {
    pub fn new(session: SessionRow, players: Vec<PlayerRow>) -> Self {
        Self {
            session,
            players,
            actions: Vec::new(),
            events: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerRow> {
        self.players.iter().find(|p| p.id == *id)
    }

    pub fn player_by_user(&self, user_id: &UserId) -> Option<&PlayerRow> {
        self.players.iter().find(|p| p.user_id == *user_id)
    }
}

/// In-memory store for single-process deployments. Sessions are retained
/// for history; there is no delete path.
pub struct MemoryStore {
    sessions: DashMap<SessionId, Arc<RwLock<SessionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a freshly assigned session. Fails with `Conflict` if the ID
    /// already exists.
    pub fn create_session(&self, record: SessionRecord) -> Result<(), EngineError> {
        let id = record.session.id;
        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::new(RwLock::new(record)));
                Ok(())
            }
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::Conflict(format!("session {id} already exists")))
            }
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    fn slot(&self, id: &SessionId) -> Result<Arc<RwLock<SessionRecord>>, EngineError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::NotFound)
    }

    /// Clone a consistent snapshot for read-only projection.
    pub async fn snapshot(&self, id: &SessionId) -> Result<SessionRecord, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.read().await;
        Ok(guard.clone())
    }

    /// Events with sequence greater than `after`, in order.
    pub async fn events_after(
        &self,
        id: &SessionId,
        after: u64,
    ) -> Result<Vec<EventRow>, EngineError> {
        let slot = self.slot(id)?;
        let guard = slot.read().await;
        Ok(guard
            .events
            .iter()
            .filter(|e| e.sequence > after)
            .cloned()
            .collect())
    }

    /// Run `f` against a working copy of the session record. On `Ok` the
    /// copy replaces the stored record atomically; on `Err` nothing is
    /// written. Returns the closure value plus the events appended inside
    /// the transaction, for post-commit fan-out.
    ///
    /// The per-session write lock is the serialization point required by
    /// the concurrency model: acquisition is bounded by `lock_timeout` and
    /// surfaces as `Busy` when exceeded.
    pub async fn with_transaction<T, F>(
        &self,
        id: &SessionId,
        lock_timeout: Duration,
        f: F,
    ) -> Result<(T, Vec<EventRow>), EngineError>
    where
        F: FnOnce(&mut SessionTxn) -> Result<T, EngineError>,
    {
        let slot = self.slot(id)?;
        let mut guard = timeout(lock_timeout, slot.write())
            .await
            .map_err(|_| EngineError::Busy)?;

        let mut txn = SessionTxn::new(guard.clone());
        let value = f(&mut txn)?;
        txn.check_invariants()?;

        let SessionTxn { record, appended } = txn;
        *guard = record;
        Ok((value, appended))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A transaction working copy with typed reads and writes. Read-your-writes
/// holds trivially; no other writer can interleave while the session lock
/// is held.
pub struct SessionTxn {
    record: SessionRecord,
    appended: Vec<EventRow>,
}

impl SessionTxn {
    fn new(record: SessionRecord) -> Self {
        Self {
            record,
            appended: Vec::new(),
        }
    }

    pub fn session(&self) -> &SessionRow {
        &self.record.session
    }

    pub fn session_mut(&mut self) -> &mut SessionRow {
        &mut self.record.session
    }

    pub fn players(&self) -> &[PlayerRow] {
        &self.record.players
    }

    pub fn player(&self, id: &PlayerId) -> Result<&PlayerRow, EngineError> {
        self.record
            .player(id)
            .ok_or_else(|| EngineError::Internal(format!("player {id} not in session")))
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Result<&mut PlayerRow, EngineError> {
        self.record
            .players
            .iter_mut()
            .find(|p| p.id == *id)
            .ok_or_else(|| EngineError::Internal(format!("player {id} not in session")))
    }

    pub fn player_by_user(&self, user_id: &UserId) -> Option<&PlayerRow> {
        self.record.player_by_user(user_id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &PlayerRow> {
        self.record.players.iter().filter(|p| p.is_alive)
    }

    pub fn actions(&self) -> &[ActionRow] {
        &self.record.actions
    }

    /// Actions recorded at or after `phase_number`, in insertion order.
    pub fn actions_since(&self, phase_number: u32) -> impl Iterator<Item = &ActionRow> {
        self.record
            .actions
            .iter()
            .filter(move |a| a.phase_number >= phase_number)
    }

    /// Actions recorded in exactly `phase_number`, in insertion order.
    pub fn actions_in_phase(&self, phase_number: u32) -> impl Iterator<Item = &ActionRow> {
        self.record
            .actions
            .iter()
            .filter(move |a| a.phase_number == phase_number)
    }

    pub fn has_action(&self, actor: &PlayerId, phase_number: u32, kind: ActionKind) -> bool {
        self.record
            .actions
            .iter()
            .any(|a| a.actor == *actor && a.phase_number == phase_number && a.kind == kind)
    }

    /// Insert one action row. The unique index on
    /// (session, phase_number, actor, kind) is enforced here.
    pub fn record_action(&mut self, action: ActionRow) -> Result<(), EngineError> {
        if self.has_action(&action.actor, action.phase_number, action.kind) {
            return Err(EngineError::Conflict(format!(
                "action `{}` already recorded for actor {} in phase {}",
                action.kind, action.actor, action.phase_number
            )));
        }
        self.record.actions.push(action);
        Ok(())
    }

    /// Append one event row; the store assigns the per-session sequence.
    pub fn append_event(&mut self, body: EventBody, recipients: Recipients) {
        let row = EventRow {
            session_id: self.record.session.id,
            phase_number: self.record.session.phase_number,
            sequence: self.record.next_sequence,
            body,
            recipients,
            created_at: Utc::now(),
        };
        self.record.next_sequence += 1;
        self.record.events.push(row.clone());
        self.appended.push(row);
    }

    /// Commit-time checks for the invariants every committed transaction
    /// must preserve. A violation quarantines the session upstream.
    fn check_invariants(&self) -> Result<(), EngineError> {
        let session = &self.record.session;
        let alive = self.record.players.iter().filter(|p| p.is_alive).count() as u32;
        if session.werewolves_alive + session.villagers_alive != alive {
            return Err(EngineError::Internal(format!(
                "alive counts {}+{} do not match {alive} living players",
                session.werewolves_alive, session.villagers_alive
            )));
        }
        for player in &self.record.players {
            if let Some(lover) = player.lover_id {
                let partner = self.record.player(&lover).ok_or_else(|| {
                    EngineError::Internal(format!("lover {lover} not in session"))
                })?;
                if partner.lover_id != Some(player.id) {
                    return Err(EngineError::Internal(format!(
                        "lover link {} -> {lover} is not symmetric",
                        player.id
                    )));
                }
            }
        }
        Ok(())
    }
}
