use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum seated players for a session to start.
pub const MIN_PLAYERS: usize = 5;
/// Upper bound on roster size; sessions are designed for up to ~20 seats.
pub const MAX_PLAYERS: usize = 20;

/// Unique identifier for sessions
pub type SessionId = Uuid;
/// Unique identifier for players (seat occupants within a session)
pub type PlayerId = Uuid;
/// External authenticated principal, provided by the identity layer
pub type UserId = Uuid;
/// Unique identifier for recorded actions
pub type ActionId = Uuid;

/// Named stage of the game. Exactly one phase is active per session at a
/// time. Wire values are stable; clients and stored rows rely on them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Session created, roles dealt, first night not yet begun
    Starting,
    /// First-night opening beat before any role acts
    #[serde(rename = "night_0")]
    Night0,
    /// Cupid pairs the lovers; first night only
    CupidPhase,
    /// Werewolves vote for a victim
    WerewolfPhase,
    /// Seer divines one player's role
    SeerPhase,
    /// Witch may heal the victim or poison a player
    WitchPhase,
    /// Bodyguard protects one player
    BodyguardPhase,
    /// Open discussion, all survivors
    DayDiscussion,
    /// Lynch voting
    DayVoting,
    /// Bounded window for a freshly dead hunter to shoot
    HunterPhase,
    /// Reserved wire value; the reveal is an action during day phases
    MayorReveal,
    /// Terminal phase; state is frozen
    GameOver,
}

impl Phase {
    /// Stable wire name for this phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Night0 => "night_0",
            Self::CupidPhase => "cupid_phase",
            Self::WerewolfPhase => "werewolf_phase",
            Self::SeerPhase => "seer_phase",
            Self::WitchPhase => "witch_phase",
            Self::BodyguardPhase => "bodyguard_phase",
            Self::DayDiscussion => "day_discussion",
            Self::DayVoting => "day_voting",
            Self::HunterPhase => "hunter_phase",
            Self::MayorReveal => "mayor_reveal",
            Self::GameOver => "game_over",
        }
    }

    /// True for the role-scoped night sub-phases and the night opening.
    pub fn is_night(self) -> bool {
        matches!(
            self,
            Self::Night0
                | Self::CupidPhase
                | Self::WerewolfPhase
                | Self::SeerPhase
                | Self::WitchPhase
                | Self::BodyguardPhase
        )
    }

    /// True for the phases where the whole village talks.
    pub fn is_day(self) -> bool {
        matches!(self, Self::DayDiscussion | Self::DayVoting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GameOver)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side a role fights for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Werewolves,
    Villagers,
    /// The tanner wins alone; counted on the village side for bookkeeping
    Neutral,
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Werewolves => "werewolves",
            Self::Villagers => "villagers",
            Self::Neutral => "neutral",
        })
    }
}

/// How a player died.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    WerewolfKill,
    Poison,
    Lynched,
    HunterShot,
    LoverDeath,
}

impl std::fmt::Display for DeathReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::WerewolfKill => "werewolf_kill",
            Self::Poison => "poison",
            Self::Lynched => "lynched",
            Self::HunterShot => "hunter_shot",
            Self::LoverDeath => "lover_death",
        })
    }
}

/// One recordable intent kind. At most one row may exist per
/// (session, phase_number, actor, kind).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CupidChoose,
    WerewolfVote,
    SeerDivine,
    BodyguardProtect,
    WitchHeal,
    WitchPoison,
    VoteLynch,
    HunterShoot,
    MayorReveal,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CupidChoose => "cupid_choose",
            Self::WerewolfVote => "werewolf_vote",
            Self::SeerDivine => "seer_divine",
            Self::BodyguardProtect => "bodyguard_protect",
            Self::WitchHeal => "witch_heal",
            Self::WitchPoison => "witch_poison",
            Self::VoteLynch => "vote_lynch",
            Self::HunterShoot => "hunter_shoot",
            Self::MayorReveal => "mayor_reveal",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared winner of a finished session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Werewolves,
    Villagers,
    Lovers,
    Tanner,
    /// Session cancelled or quarantined; nobody won
    Abandoned,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Werewolves => "werewolves",
            Self::Villagers => "villagers",
            Self::Lovers => "lovers",
            Self::Tanner => "tanner",
            Self::Abandoned => "abandoned",
        })
    }
}

/// Voice sub-room a player may be granted access to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoiceChannel {
    /// Werewolf pack channel, night only
    Werewolf,
    /// The village square
    Main,
    /// The graveyard; dead players only
    Dead,
}

impl VoiceChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Werewolf => "werewolf",
            Self::Main => "main",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for VoiceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The channel directive embedded in every projection. Clients must trust
/// it: the server refuses to mint tokens for any other channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceDirective {
    /// Channel the client should currently inhabit; `None` means muted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<VoiceChannel>,
    /// Channels the server will mint tokens for right now
    pub allowed: Vec<VoiceChannel>,
}

impl VoiceDirective {
    pub fn muted() -> Self {
        Self {
            channel: None,
            allowed: Vec::new(),
        }
    }

    pub fn single(channel: VoiceChannel) -> Self {
        Self {
            channel: Some(channel),
            allowed: vec![channel],
        }
    }
}
