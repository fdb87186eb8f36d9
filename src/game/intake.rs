//! Action intake validation.
//!
//! Pure checks of one submitted action against the session, the actor row
//! and the already-recorded actions. Recording itself (and the duplicate
//! race under concurrency) is handled by the store's unique index; the
//! pre-check here gives the common case a precise error.

use crate::protocol::messages::ActionRequest;
use crate::protocol::{ActionKind, Phase, PlayerId, Team};

use super::error::ActionError;
use super::state::{ActionRow, PlayerRow, SessionRow};

/// Phases in which an action kind may be submitted.
pub fn allowed_in_phase(kind: ActionKind, phase: Phase) -> bool {
    match kind {
        ActionKind::CupidChoose => phase == Phase::CupidPhase,
        ActionKind::WerewolfVote => phase == Phase::WerewolfPhase,
        ActionKind::SeerDivine => phase == Phase::SeerPhase,
        ActionKind::WitchHeal | ActionKind::WitchPoison => phase == Phase::WitchPhase,
        ActionKind::BodyguardProtect => phase == Phase::BodyguardPhase,
        ActionKind::VoteLynch => phase == Phase::DayVoting,
        ActionKind::HunterShoot => phase == Phase::HunterPhase,
        ActionKind::MayorReveal => phase.is_day(),
    }
}

/// Validate a submitted action. Returns `Ok(())` when the action may be
/// recorded for the current phase.
pub fn validate(
    session: &SessionRow,
    players: &[PlayerRow],
    actions: &[ActionRow],
    actor: &PlayerRow,
    request: &ActionRequest,
) -> Result<(), ActionError> {
    if session.is_terminal() {
        return Err(ActionError::Terminal);
    }
    if !allowed_in_phase(request.kind, session.phase) {
        return Err(ActionError::WrongPhase);
    }
    check_authorization(session, actor, request.kind)?;

    // The pending-shot window deliberately outlives the hunter's death.
    let shooting_hunter =
        request.kind == ActionKind::HunterShoot && session.pending_hunter == Some(actor.id);
    if !actor.is_alive && !shooting_hunter {
        return Err(ActionError::Dead);
    }

    let duplicate = actions.iter().any(|a| {
        a.actor == actor.id && a.phase_number == session.phase_number && a.kind == request.kind
    });
    if duplicate {
        return Err(ActionError::Duplicate);
    }

    check_targets(session, players, actor, request)
}

fn check_authorization(
    session: &SessionRow,
    actor: &PlayerRow,
    kind: ActionKind,
) -> Result<(), ActionError> {
    let spec = actor.role.spec();
    let authorized = match kind {
        ActionKind::CupidChoose => spec.can_pair,
        ActionKind::WerewolfVote => actor.team == Team::Werewolves,
        ActionKind::SeerDivine => spec.can_divine,
        ActionKind::WitchHeal => spec.can_heal,
        ActionKind::WitchPoison => spec.can_poison,
        ActionKind::BodyguardProtect => spec.can_protect,
        ActionKind::VoteLynch => true,
        ActionKind::HunterShoot => session.pending_hunter == Some(actor.id),
        ActionKind::MayorReveal => spec.can_reveal_mayor && session.config.allow_mayor_reveal,
    };
    if authorized {
        Ok(())
    } else {
        Err(ActionError::NotActor)
    }
}

fn check_targets(
    session: &SessionRow,
    players: &[PlayerRow],
    actor: &PlayerRow,
    request: &ActionRequest,
) -> Result<(), ActionError> {
    match request.kind {
        ActionKind::CupidChoose => {
            let first = required_living(players, request.primary_target)?;
            let second = required_living(players, request.secondary_target)?;
            if first == second {
                return Err(ActionError::BadTarget(
                    "the two lovers must be distinct".to_string(),
                ));
            }
            Ok(())
        }
        ActionKind::WerewolfVote | ActionKind::SeerDivine | ActionKind::VoteLynch => {
            required_living(players, request.primary_target)?;
            Ok(())
        }
        ActionKind::BodyguardProtect => {
            let target = required_living(players, request.primary_target)?;
            if target == actor.id && !session.config.bodyguard_self_protect {
                return Err(ActionError::BadTarget(
                    "self-protection is disabled".to_string(),
                ));
            }
            if actor.role_state.last_protected_target == Some(target) {
                return Err(ActionError::BadTarget(
                    "cannot protect the same player on consecutive nights".to_string(),
                ));
            }
            Ok(())
        }
        ActionKind::WitchHeal => {
            if actor.role_state.heal_used {
                return Err(ActionError::BadTarget(
                    "the healing potion is already used".to_string(),
                ));
            }
            Ok(())
        }
        ActionKind::WitchPoison => {
            if actor.role_state.poison_used {
                return Err(ActionError::BadTarget(
                    "the poison is already used".to_string(),
                ));
            }
            required_living(players, request.primary_target)?;
            Ok(())
        }
        ActionKind::HunterShoot => {
            let target = required_living(players, request.primary_target)?;
            if target == actor.id {
                return Err(ActionError::BadTarget(
                    "the hunter cannot shoot themself".to_string(),
                ));
            }
            Ok(())
        }
        ActionKind::MayorReveal => {
            if actor.role_state.is_revealed_mayor {
                return Err(ActionError::BadTarget(
                    "the mayor is already revealed".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn required_living(
    players: &[PlayerRow],
    target: Option<PlayerId>,
) -> Result<PlayerId, ActionError> {
    let id = target.ok_or_else(|| ActionError::BadTarget("target is required".to_string()))?;
    let player = players
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| ActionError::BadTarget("target is not in this session".to_string()))?;
    if !player.is_alive {
        return Err(ActionError::BadTarget("target is dead".to_string()));
    }
    Ok(id)
}
