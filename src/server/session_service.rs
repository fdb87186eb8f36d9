//! Session lifecycle: lobby handoff, state reads, subscriptions and
//! cancellation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::RngExt;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::game::assign::assign_roles;
use crate::game::error::EngineError;
use crate::game::state::{PlayerRow, RoleState, RosterEntry, SessionConfig, SessionRow};
use crate::game::view;
use crate::protocol::messages::{ServerEvent, SessionProjection};
use crate::protocol::{Phase, SessionId, Team, UserId, Winner};
use crate::store::SessionRecord;

use super::scheduler::finalize;
use super::GameServer;

impl GameServer {
    /// Create a session from a seated roster. Roles are dealt with the
    /// session seed, the timer is armed, and the public (unseated)
    /// projection is returned for the lobby handoff.
    pub async fn start_session(
        self: &Arc<Self>,
        roster: Vec<RosterEntry>,
        config: Option<SessionConfig>,
    ) -> Result<(SessionId, SessionProjection), EngineError> {
        if self.store.session_ids().len() >= self.config.max_sessions {
            return Err(EngineError::Busy);
        }
        let mut seen = HashSet::new();
        for entry in &roster {
            if entry.display_name.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "seat for user {} has an empty display name",
                    entry.user_id
                )));
            }
            if !seen.insert(entry.user_id) {
                return Err(EngineError::Config(format!(
                    "user {} occupies more than one seat",
                    entry.user_id
                )));
            }
        }

        let config = config.unwrap_or_else(|| self.config.default_session.clone());
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let roles = assign_roles(roster.len(), &config, seed)?;

        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let werewolves = roles.iter().filter(|r| r.team() == Team::Werewolves).count() as u32;
        let deadline =
            now + chrono::Duration::milliseconds(config.durations.starting_ms as i64);

        let players: Vec<PlayerRow> = roster
            .into_iter()
            .zip(roles)
            .enumerate()
            .map(|(seat, (entry, role))| PlayerRow {
                id: Uuid::new_v4(),
                session_id,
                user_id: entry.user_id,
                display_name: entry.display_name,
                seat: seat as u8,
                role,
                team: role.team(),
                is_alive: true,
                died_at_phase: None,
                death_reason: None,
                role_state: RoleState::default(),
                lover_id: None,
            })
            .collect();

        let session = SessionRow {
            id: session_id,
            config,
            phase: Phase::Starting,
            phase_number: 0,
            day_number: 0,
            phase_deadline: Some(deadline),
            night_started_phase: 0,
            werewolves_alive: werewolves,
            villagers_alive: players.len() as u32 - werewolves,
            winner: None,
            pending_hunter: None,
            resume_phase: None,
            seed,
            created_at: now,
        };

        let record = SessionRecord::new(session, players);
        let projection = view::project(&record, None);
        self.store.create_session(record)?;
        self.metrics.increment_sessions_started();
        if self.config.drive_timers {
            self.spawn_session_timer(session_id);
        }

        info!(
            %session_id,
            seats = projection.players.len(),
            werewolves,
            "session started"
        );
        Ok((session_id, projection))
    }

    /// The viewer's projection of current state. Read-only; does not take
    /// the session lock.
    pub async fn get_state(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<SessionProjection, EngineError> {
        let snapshot = self.store.snapshot(session_id).await?;
        let player = snapshot
            .player_by_user(user_id)
            .ok_or(EngineError::Forbidden)?;
        Ok(view::project(&snapshot, Some(player.id)))
    }

    /// Open the viewer's event stream: current state first, then the
    /// buffered backlog after `after_sequence`, then live events.
    pub async fn subscribe(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        after_sequence: Option<u64>,
    ) -> Result<mpsc::Receiver<ServerEvent>, EngineError> {
        let snapshot = self.store.snapshot(session_id).await?;
        let player = snapshot
            .player_by_user(user_id)
            .ok_or(EngineError::Forbidden)?;
        Ok(self.hub.subscribe(&snapshot, player.id, after_sequence).await)
    }

    /// Abandon a session (room torn down). Terminal winner `abandoned`,
    /// timer cancelled, subscribers told.
    pub async fn cancel_session(
        self: &Arc<Self>,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(), EngineError> {
        let user = *user_id;
        let (_, events) = self
            .store
            .with_transaction(session_id, self.lock_timeout(), move |txn| {
                if txn.player_by_user(&user).is_none() {
                    return Err(EngineError::Forbidden);
                }
                if txn.session().is_terminal() {
                    return Ok(());
                }
                finalize(txn, Winner::Abandoned, &[]);
                Ok(())
            })
            .await?;

        self.metrics.increment_sessions_abandoned();
        let snapshot = self.store.snapshot(session_id).await?;
        self.hub.publish(&snapshot, &events).await;
        self.finish_session(session_id);
        info!(%session_id, "session cancelled");
        Ok(())
    }

    /// Re-arm timers for every live session, recomputing each from its
    /// stored `phase_deadline`. Called once at boot; sessions need no
    /// in-memory continuation state to resume.
    pub fn resume_all_sessions(self: &Arc<Self>) {
        if !self.config.drive_timers {
            return;
        }
        for session_id in self.store.session_ids() {
            if !self.timers.contains_key(&session_id) {
                self.spawn_session_timer(session_id);
            }
        }
    }
}
