use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for structured error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Session setup errors
    ConfigInvalid,
    SessionNotFound,
    Forbidden,

    // Transport errors
    InvalidCommand,

    // Action errors
    WrongPhase,
    NotActor,
    ActorDead,
    DuplicateAction,
    BadTarget,
    SessionFinished,

    // Voice errors
    NoChannel,

    // Contention & server errors
    SessionBusy,
    StorageError,
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// Messages are safe to surface to end users; no internal detail leaks.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ConfigInvalid => {
                "The session configuration is invalid. Check the roster size and role distribution."
            }
            Self::SessionNotFound => {
                "The requested session could not be found. It may have ended or the ID is incorrect."
            }
            Self::Forbidden => {
                "You are not seated in this session. Only seated players may view or act on it."
            }
            Self::InvalidCommand => {
                "The command could not be parsed. Check the JSON shape against the protocol."
            }
            Self::WrongPhase => {
                "That action is not valid during the current phase. Wait for the right phase."
            }
            Self::NotActor => {
                "Your role does not authorize that action."
            }
            Self::ActorDead => {
                "Dead players cannot act. You may still watch from the graveyard."
            }
            Self::DuplicateAction => {
                "You already submitted that action this phase. Actions cannot be changed once recorded."
            }
            Self::BadTarget => {
                "The action target is invalid. Targets must be living players and satisfy role rules."
            }
            Self::SessionFinished => {
                "The session has already finished. No further actions are accepted."
            }
            Self::NoChannel => {
                "You are muted right now. No voice channel is available during this phase."
            }
            Self::SessionBusy => {
                "The session is busy processing another request. Please retry."
            }
            Self::StorageError => {
                "A storage error occurred while processing your request. Please try again later."
            }
            Self::InternalError => {
                "An internal server error occurred. The session may have been quarantined."
            }
        }
    }

    /// Whether a client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SessionBusy | Self::StorageError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: [ErrorCode; 14] = [
        ErrorCode::ConfigInvalid,
        ErrorCode::SessionNotFound,
        ErrorCode::Forbidden,
        ErrorCode::InvalidCommand,
        ErrorCode::WrongPhase,
        ErrorCode::NotActor,
        ErrorCode::ActorDead,
        ErrorCode::DuplicateAction,
        ErrorCode::BadTarget,
        ErrorCode::SessionFinished,
        ErrorCode::NoChannel,
        ErrorCode::SessionBusy,
        ErrorCode::StorageError,
        ErrorCode::InternalError,
    ];

    #[test]
    fn test_all_error_codes_have_descriptions() {
        for error_code in &ALL_CODES {
            let description = error_code.description();
            assert!(
                description.len() > 10,
                "ErrorCode::{:?} has suspiciously short description: '{}'",
                error_code,
                description
            );
        }
    }

    #[test]
    fn test_display_uses_description() {
        let error = ErrorCode::WrongPhase;
        assert_eq!(format!("{error}"), error.description());
    }

    #[test]
    fn test_serialization_is_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::DuplicateAction).unwrap();
        assert_eq!(json, "\"DUPLICATE_ACTION\"");
        let json = serde_json::to_string(&ErrorCode::SessionBusy).unwrap();
        assert_eq!(json, "\"SESSION_BUSY\"");
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::SessionBusy.is_retryable());
        assert!(ErrorCode::StorageError.is_retryable());
        assert!(!ErrorCode::DuplicateAction.is_retryable());
        assert!(!ErrorCode::ConfigInvalid.is_retryable());
    }
}
