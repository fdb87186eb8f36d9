//! Action intake orchestration.
//!
//! `submit_action` validates under the session transaction, records the
//! action row, appends the (private) `player_action` event, applies any
//! immediate effect (lover pairing, mayor reveal, the hunter's shot)
//! and, after commit, fans events out and rings the scheduler doorbell
//! so a complete sub-phase can end early.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::game::deaths::{process_death, DeathContext};
use crate::game::error::{ActionError, EngineError};
use crate::game::intake;
use crate::game::state::{ActionRow, Recipients};
use crate::protocol::messages::{ActionRequest, EventBody};
use crate::protocol::{ActionId, ActionKind, DeathReason, KnowledgeKind, SessionId, Team, UserId};

use super::scheduler::resume_after_hunter;
use super::GameServer;

/// Receipt for a recorded action.
#[derive(Debug, Clone, Copy)]
pub struct SubmitReceipt {
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub phase_number: u32,
}

impl GameServer {
    /// Record one action for the authenticated user's seat.
    pub async fn submit_action(
        self: &Arc<Self>,
        session_id: &SessionId,
        user_id: &UserId,
        request: ActionRequest,
    ) -> Result<SubmitReceipt, EngineError> {
        let user = *user_id;
        let result = self
            .store
            .with_transaction(session_id, self.lock_timeout(), move |txn| {
                let actor = txn
                    .player_by_user(&user)
                    .cloned()
                    .ok_or(EngineError::Forbidden)?;
                intake::validate(txn.session(), txn.players(), txn.actions(), &actor, &request)?;

                let receipt = SubmitReceipt {
                    action_id: Uuid::new_v4(),
                    kind: request.kind,
                    phase_number: txn.session().phase_number,
                };
                let row = ActionRow {
                    id: receipt.action_id,
                    session_id: txn.session().id,
                    actor: actor.id,
                    phase_number: receipt.phase_number,
                    kind: request.kind,
                    primary_target: request.primary_target,
                    secondary_target: request.secondary_target,
                    created_at: Utc::now(),
                };
                txn.record_action(row)?;

                // Werewolf votes are pack-visible; everything else is the
                // actor's own business until resolution.
                let recipients = if request.kind == ActionKind::WerewolfVote {
                    Recipients::Players(
                        txn.alive_players()
                            .filter(|p| p.team == Team::Werewolves)
                            .map(|p| p.id)
                            .collect(),
                    )
                } else {
                    Recipients::Players(vec![actor.id])
                };
                txn.append_event(
                    EventBody::PlayerAction {
                        actor: Some(actor.id),
                        kind: Some(request.kind),
                        phase_number: receipt.phase_number,
                    },
                    recipients,
                );

                apply_immediate_effect(txn, &actor.id, &request, receipt.phase_number)?;
                Ok(receipt)
            })
            .await;

        let (receipt, events) = match result {
            Ok(ok) => ok,
            Err(EngineError::Conflict(_)) => {
                // The store's unique index lost a race we pre-checked
                self.metrics.increment_actions_rejected();
                return Err(ActionError::Duplicate.into());
            }
            Err(err) => {
                self.metrics.increment_actions_rejected();
                return Err(err);
            }
        };

        self.metrics.increment_actions_accepted();
        debug!(
            %session_id,
            actor = %user,
            kind = %receipt.kind,
            phase_number = receipt.phase_number,
            "action recorded"
        );

        let snapshot = self.store.snapshot(session_id).await?;
        self.hub.publish(&snapshot, &events).await;
        if snapshot.session.is_terminal() {
            self.finish_session(session_id);
        } else {
            self.nudge(session_id);
        }
        Ok(receipt)
    }
}

/// Effects that land at intake time rather than at resolution: the lover
/// pairing, the mayor's reveal, and the hunter's shot (which resumes the
/// interrupted phase graph).
fn apply_immediate_effect(
    txn: &mut crate::store::SessionTxn,
    actor: &Uuid,
    request: &ActionRequest,
    phase_number: u32,
) -> Result<(), EngineError> {
    match request.kind {
        ActionKind::CupidChoose => {
            let (Some(first), Some(second)) = (request.primary_target, request.secondary_target)
            else {
                return Err(EngineError::Internal(
                    "validated cupid action lost its targets".to_string(),
                ));
            };
            txn.player_mut(&first)?.lover_id = Some(second);
            txn.player_mut(&second)?.lover_id = Some(first);
            for (lover, partner) in [(first, second), (second, first)] {
                txn.append_event(
                    EventBody::PrivateKnowledge {
                        kind: KnowledgeKind::LoverNotice,
                        data: serde_json::json!({ "partner": partner }),
                    },
                    Recipients::Players(vec![lover]),
                );
            }
            Ok(())
        }
        ActionKind::MayorReveal => {
            txn.player_mut(actor)?.role_state.is_revealed_mayor = true;
            Ok(())
        }
        ActionKind::HunterShoot => {
            let Some(target) = request.primary_target else {
                return Err(EngineError::Internal(
                    "validated hunter shot lost its target".to_string(),
                ));
            };
            let shot = process_death(
                txn,
                DeathContext::new(target, DeathReason::HunterShot, phase_number)
                    .with_killer(*actor),
            )?;
            resume_after_hunter(txn, shot)
        }
        _ => Ok(()),
    }
}
