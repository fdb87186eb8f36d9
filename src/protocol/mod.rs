//! Wire protocol: commands clients send, events the server publishes, and
//! the stable error-code vocabulary. The core engine consumes already-parsed
//! commands and emits already-typed events; all framing lives in
//! [`crate::websocket`].

pub mod error_codes;
pub mod messages;
pub mod types;

pub use error_codes::ErrorCode;
pub use messages::{
    ActionRequest, ClientCommand, DeathRecord, EventBody, EventEnvelope, KnowledgeKind,
    PhaseChangePayload, PlayerProjection, ServerEvent, SessionProjection, WerewolfVoteView,
};
pub use types::{
    ActionId, ActionKind, DeathReason, Phase, PlayerId, SessionId, Team, UserId, VoiceChannel,
    VoiceDirective, Winner, MAX_PLAYERS, MIN_PLAYERS,
};
