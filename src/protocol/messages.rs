use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::roles::Role;
use crate::game::state::{RosterEntry, SessionConfig};

use super::error_codes::ErrorCode;
use super::types::{
    ActionId, ActionKind, DeathReason, Phase, PlayerId, SessionId, Team, UserId, VoiceChannel,
    VoiceDirective, Winner,
};

/// Commands sent from client to server. Transport framing and identity
/// verification happen upstream; `user_id` is the authenticated principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Hand off a seated lobby and start the session; the server's
    /// configured game defaults apply when `config` is omitted
    StartSession {
        roster: Vec<RosterEntry>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<SessionConfig>,
    },
    /// Record one action for the current phase
    SubmitAction {
        session_id: SessionId,
        user_id: UserId,
        action: ActionRequest,
    },
    /// Fetch the viewer's projection of current state
    GetState {
        session_id: SessionId,
        user_id: UserId,
    },
    /// Open the event stream; replays the buffered backlog first
    Subscribe {
        session_id: SessionId,
        user_id: UserId,
        /// Last sequence the client applied, for backlog replay
        #[serde(skip_serializing_if = "Option::is_none")]
        after_sequence: Option<u64>,
    },
    /// Mint a short-lived token for the viewer's entitled voice channel
    VoiceToken {
        session_id: SessionId,
        user_id: UserId,
    },
    /// Abandon the session (room abandoned / host teardown)
    CancelSession {
        session_id: SessionId,
        user_id: UserId,
    },
}

/// One submitted intent; targets are validated against phase and role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_target: Option<PlayerId>,
    /// Cupid only: the second lover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_target: Option<PlayerId>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Session created; carries the public (unseated) projection
    SessionStarted {
        session_id: SessionId,
        projection: Box<SessionProjection>,
    },
    /// Action validated and recorded
    ActionAccepted {
        action_id: ActionId,
        kind: ActionKind,
        phase_number: u32,
    },
    /// The viewer's projection of current state
    State(Box<SessionProjection>),
    /// Voice channel token for the entitled channel
    VoiceGrant {
        channel: VoiceChannel,
        token: String,
        expires_at: DateTime<Utc>,
    },
    /// Session cancelled
    Cancelled { session_id: SessionId },
    /// One ordered session event (boxed to reduce enum size)
    Event(Box<EventEnvelope>),
    /// Command failed
    Error { code: ErrorCode, message: String },
}

/// A delivered session event. `(phase_number, sequence)` totally orders
/// events within a session; clients dedup on it across reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub phase_number: u32,
    pub sequence: u64,
    pub body: EventBody,
    /// Per-recipient state snapshot, attached to phase changes and game over
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Box<SessionProjection>>,
}

/// An observable thing that happened inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventBody {
    /// The session moved to a new phase (boxed to reduce enum size)
    PhaseChange(Box<PhaseChangePayload>),
    /// Someone acted. Actor and kind are present only for entitled viewers.
    PlayerAction {
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<ActionKind>,
        phase_number: u32,
    },
    /// A player died; the role is revealed to everyone
    PlayerDeath {
        player: PlayerId,
        role: Role,
        reason: DeathReason,
        phase_number: u32,
    },
    /// Role-private information (seer results, witch notice, lover pairing)
    PrivateKnowledge {
        kind: KnowledgeKind,
        data: serde_json::Value,
    },
    /// Terminal result
    GameOver { winner: Winner },
}

impl EventBody {
    /// The variant delivered to subscribers outside the recipient list.
    /// `PlayerAction` degrades to an anonymous "someone acted" signal;
    /// everything else private is withheld entirely.
    pub fn redacted(&self) -> Option<EventBody> {
        match self {
            Self::PlayerAction { phase_number, .. } => Some(Self::PlayerAction {
                actor: None,
                kind: None,
                phase_number: *phase_number,
            }),
            _ => None,
        }
    }
}

/// Kinds of per-recipient private knowledge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    /// Seer learns a player's role
    SeerResult,
    /// Witch learns the tentative werewolf victim
    WitchNotice,
    /// Each lover learns their partner
    LoverNotice,
    /// Werewolves noticed the little girl peeking
    LittleGirlSeen,
    /// Dead hunter is told the shot window deadline
    HunterWindow,
}

/// Payload for the `PhaseChange` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseChangePayload {
    pub from: Phase,
    pub to: Phase,
    pub phase_number: u32,
    pub day_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Deaths resolved on the transition into this phase
    pub deaths: Vec<DeathRecord>,
}

/// One resolved death, role revealed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeathRecord {
    pub player: PlayerId,
    pub role: Role,
    pub reason: DeathReason,
}

/// A per-viewer redacted view of session state. The store holds the full
/// truth; this is the only shape that ever leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProjection {
    pub session_id: SessionId,
    pub phase: Phase,
    pub phase_number: u32,
    pub day_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub werewolves_alive: u32,
    pub villagers_alive: u32,
    /// The viewer's own seat, when the viewer is seated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub you: Option<PlayerId>,
    pub players: Vec<PlayerProjection>,
    pub voice: VoiceDirective,
    /// Current night's pack votes; werewolf viewers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub werewolf_votes: Option<Vec<WerewolfVoteView>>,
}

/// One seat as a given viewer is allowed to see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProjection {
    pub player_id: PlayerId,
    pub user_id: UserId,
    pub display_name: String,
    pub seat: u8,
    pub is_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub died_at_phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub death_reason: Option<DeathReason>,
    pub is_revealed_mayor: bool,
    /// Visible to the lover themself only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lover_id: Option<PlayerId>,
}

/// One pack vote as shown to werewolf viewers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WerewolfVoteView {
    pub voter: PlayerId,
    pub target: PlayerId,
}
