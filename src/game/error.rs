use thiserror::Error;

use crate::protocol::ErrorCode;

/// Client mistakes surfaced synchronously by the Action Intake.
/// Non-retryable without changing inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action is not valid in the current phase")]
    WrongPhase,
    #[error("player role does not authorize this action")]
    NotActor,
    #[error("dead players cannot act")]
    Dead,
    #[error("action already submitted for this phase")]
    Duplicate,
    #[error("invalid action target: {0}")]
    BadTarget(String),
    #[error("session is already finished")]
    Terminal,
}

/// The engine-wide error taxonomy. Resolvers never leak partial writes:
/// any error inside a transaction rolls the working copy back.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad role distribution or roster; surfaced at session start
    #[error("invalid session configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Action(#[from] ActionError),
    /// Uniqueness clash inside the store; mapped to
    /// [`ActionError::Duplicate`] at the intake boundary
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Transient store failure; retried with backoff by the owner of the
    /// transaction
    #[error("storage failure: {0}")]
    Store(String),
    /// Session lock not acquired within the request deadline
    #[error("session is busy")]
    Busy,
    #[error("session not found")]
    NotFound,
    #[error("viewer is not seated in this session")]
    Forbidden,
    /// Viewer is muted; no voice channel available right now
    #[error("no voice channel available")]
    NoChannel,
    /// Invariant violation; the session gets quarantined
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Action(ActionError::WrongPhase) => ErrorCode::WrongPhase,
            Self::Action(ActionError::NotActor) => ErrorCode::NotActor,
            Self::Action(ActionError::Dead) => ErrorCode::ActorDead,
            Self::Action(ActionError::Duplicate) => ErrorCode::DuplicateAction,
            Self::Action(ActionError::BadTarget(_)) => ErrorCode::BadTarget,
            Self::Action(ActionError::Terminal) => ErrorCode::SessionFinished,
            Self::Conflict(_) => ErrorCode::DuplicateAction,
            Self::Store(_) => ErrorCode::StorageError,
            Self::Busy => ErrorCode::SessionBusy,
            Self::NotFound => ErrorCode::SessionNotFound,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::NoChannel => ErrorCode::NoChannel,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Transient failures worth retrying inside the owning component.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Busy)
    }
}
