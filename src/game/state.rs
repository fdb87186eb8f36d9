use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::messages::EventBody;
use crate::protocol::{
    ActionId, ActionKind, DeathReason, Phase, PlayerId, SessionId, Team, UserId, Winner,
};

use super::roles::Role;

/// One seat handed over by the lobby at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub display_name: String,
}

/// Per-phase durations in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseDurations {
    pub starting_ms: u64,
    pub night_0_ms: u64,
    pub cupid_ms: u64,
    pub werewolf_ms: u64,
    pub seer_ms: u64,
    pub witch_ms: u64,
    pub bodyguard_ms: u64,
    pub discussion_ms: u64,
    pub voting_ms: u64,
    pub hunter_ms: u64,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            starting_ms: 5_000,
            night_0_ms: 10_000,
            cupid_ms: 45_000,
            werewolf_ms: 40_000,
            seer_ms: 30_000,
            witch_ms: 30_000,
            bodyguard_ms: 30_000,
            discussion_ms: 120_000,
            voting_ms: 60_000,
            hunter_ms: 25_000,
        }
    }
}

impl PhaseDurations {
    /// Duration for entering `phase`; `None` for phases without a timer.
    pub fn for_phase(&self, phase: Phase) -> Option<u64> {
        match phase {
            Phase::Starting => Some(self.starting_ms),
            Phase::Night0 => Some(self.night_0_ms),
            Phase::CupidPhase => Some(self.cupid_ms),
            Phase::WerewolfPhase => Some(self.werewolf_ms),
            Phase::SeerPhase => Some(self.seer_ms),
            Phase::WitchPhase => Some(self.witch_ms),
            Phase::BodyguardPhase => Some(self.bodyguard_ms),
            Phase::DayDiscussion => Some(self.discussion_ms),
            Phase::DayVoting => Some(self.voting_ms),
            Phase::HunterPhase => Some(self.hunter_ms),
            Phase::MayorReveal | Phase::GameOver => None,
        }
    }
}

/// Role distribution requested by the lobby: either an explicit role list
/// covering every seat, or a werewolf count plus enabled unique roles with
/// plain villagers filling the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub werewolf_count: usize,
    /// Unique roles in play (seer, witch, hunter, cupid, bodyguard, ...)
    #[serde(default)]
    pub enabled_roles: Vec<Role>,
    /// Overrides `werewolf_count`/`enabled_roles` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_roles: Option<Vec<Role>>,
    #[serde(default = "default_true")]
    pub allow_mayor_reveal: bool,
    #[serde(default)]
    pub bodyguard_self_protect: bool,
    /// Probability the little girl is caught peeking each night; 0 disables
    #[serde(default)]
    pub little_girl_peek_risk: f64,
    #[serde(default)]
    pub durations: PhaseDurations,
    /// Seed for reproducible role assignment; randomized when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            werewolf_count: 2,
            enabled_roles: vec![Role::Seer, Role::Witch, Role::Hunter],
            explicit_roles: None,
            allow_mayor_reveal: true,
            bodyguard_self_protect: false,
            little_girl_peek_risk: 0.0,
            durations: PhaseDurations::default(),
            seed: None,
        }
    }
}

/// Mutable per-role bookkeeping carried on a player row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleState {
    pub heal_used: bool,
    pub poison_used: bool,
    pub has_shot: bool,
    pub last_protected_target: Option<PlayerId>,
    pub is_revealed_mayor: bool,
}

/// The session row. The Phase Scheduler exclusively owns `phase`,
/// `phase_number` and `phase_deadline`; the Death Resolver exclusively owns
/// the alive-counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub config: SessionConfig,
    pub phase: Phase,
    /// Monotone, bumped on every phase entry (sub-phases included)
    pub phase_number: u32,
    pub day_number: u32,
    pub phase_deadline: Option<DateTime<Utc>>,
    /// First phase_number of the night cycle currently open (or last open)
    pub night_started_phase: u32,
    pub werewolves_alive: u32,
    pub villagers_alive: u32,
    pub winner: Option<Winner>,
    /// Hunter whose shot window is currently open
    pub pending_hunter: Option<PlayerId>,
    /// Coarse marker for where to resume after the hunter window:
    /// a day phase or a night entry phase
    pub resume_phase: Option<Phase>,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    pub fn is_terminal(&self) -> bool {
        self.winner.is_some() || self.phase.is_terminal()
    }

    pub fn alive_total(&self) -> u32 {
        self.werewolves_alive + self.villagers_alive
    }
}

/// One seat occupant. The Death Resolver exclusively owns `is_alive`,
/// `died_at_phase` and `death_reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRow {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub display_name: String,
    pub seat: u8,
    pub role: Role,
    pub team: Team,
    pub is_alive: bool,
    pub died_at_phase: Option<u32>,
    pub death_reason: Option<DeathReason>,
    pub role_state: RoleState,
    /// Symmetric: if A.lover_id == B then B.lover_id == A
    pub lover_id: Option<PlayerId>,
}

impl PlayerRow {
    /// Which alive-count bucket this player belongs to. The neutral tanner
    /// is carried on the village side so the counts always sum to the
    /// number of living players.
    pub fn counts_as_werewolf(&self) -> bool {
        self.team == Team::Werewolves
    }
}

/// One recorded intent. Unique per (session, phase_number, actor, kind).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRow {
    pub id: ActionId,
    pub session_id: SessionId,
    pub actor: PlayerId,
    pub phase_number: u32,
    pub kind: ActionKind,
    pub primary_target: Option<PlayerId>,
    pub secondary_target: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

/// Who may see an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recipients {
    All,
    Players(Vec<PlayerId>),
}

impl Recipients {
    pub fn contains(&self, player: &PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Players(list) => list.contains(player),
        }
    }
}

/// One appended, never-mutated observable. `sequence` is assigned by the
/// store and is monotone per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub session_id: SessionId,
    pub phase_number: u32,
    pub sequence: u64,
    pub body: EventBody,
    pub recipients: Recipients,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn is_public(&self) -> bool {
        matches!(self.recipients, Recipients::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_durations_defaults_cover_timed_phases() {
        let durations = PhaseDurations::default();
        for phase in [
            Phase::Night0,
            Phase::CupidPhase,
            Phase::WerewolfPhase,
            Phase::SeerPhase,
            Phase::WitchPhase,
            Phase::BodyguardPhase,
            Phase::DayDiscussion,
            Phase::DayVoting,
            Phase::HunterPhase,
        ] {
            assert!(durations.for_phase(phase).unwrap() > 0, "{phase}");
        }
        assert!(durations.for_phase(Phase::Starting).is_some());
        assert!(durations.for_phase(Phase::GameOver).is_none());
        assert!(durations.for_phase(Phase::MayorReveal).is_none());
    }

    #[test]
    fn test_session_config_round_trip() {
        let config = SessionConfig {
            werewolf_count: 3,
            enabled_roles: vec![Role::Seer, Role::Cupid],
            seed: Some(7),
            ..SessionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_recipients_containment() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        assert!(Recipients::All.contains(&a));
        let only_a = Recipients::Players(vec![a]);
        assert!(only_a.contains(&a));
        assert!(!only_a.contains(&b));
    }
}
