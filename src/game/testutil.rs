//! Shared fixtures for engine unit tests.

use chrono::Utc;
use uuid::Uuid;

use crate::protocol::Phase;
use crate::store::SessionRecord;

use super::roles::Role;
use super::state::{PlayerRow, RoleState, SessionConfig, SessionRow};

/// Build a session record seating one player per role, alive, with
/// consistent alive-counts, parked in `phase`.
pub fn record_with_roles(roles: &[Role], phase: Phase) -> SessionRecord {
    let session_id = Uuid::new_v4();
    let players: Vec<PlayerRow> = roles
        .iter()
        .enumerate()
        .map(|(i, role)| PlayerRow {
            id: Uuid::new_v4(),
            session_id,
            user_id: Uuid::new_v4(),
            display_name: format!("p{i}"),
            seat: i as u8,
            role: *role,
            team: role.team(),
            is_alive: true,
            died_at_phase: None,
            death_reason: None,
            role_state: RoleState::default(),
            lover_id: None,
        })
        .collect();
    let werewolves = players.iter().filter(|p| p.counts_as_werewolf()).count() as u32;
    let session = SessionRow {
        id: session_id,
        config: SessionConfig::default(),
        phase,
        phase_number: 4,
        day_number: 1,
        phase_deadline: None,
        night_started_phase: 2,
        werewolves_alive: werewolves,
        villagers_alive: players.len() as u32 - werewolves,
        winner: None,
        pending_hunter: None,
        resume_phase: None,
        seed: 0,
        created_at: Utc::now(),
    };
    SessionRecord::new(session, players)
}

/// First player holding `role`.
pub fn player_id(record: &SessionRecord, role: Role) -> Uuid {
    record
        .players
        .iter()
        .find(|p| p.role == role)
        .map(|p| p.id)
        .expect("role present in fixture")
}

/// Nth player holding `role` (0-based).
pub fn nth_player_id(record: &SessionRecord, role: Role, n: usize) -> Uuid {
    record
        .players
        .iter()
        .filter(|p| p.role == role)
        .nth(n)
        .map(|p| p.id)
        .expect("enough players of role in fixture")
}

/// Link two players as lovers, symmetrically.
pub fn pair_lovers(record: &mut SessionRecord, a: Uuid, b: Uuid) {
    for p in &mut record.players {
        if p.id == a {
            p.lover_id = Some(b);
        } else if p.id == b {
            p.lover_id = Some(a);
        }
    }
}
