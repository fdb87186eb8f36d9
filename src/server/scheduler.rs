//! The phase scheduler.
//!
//! One timer task per session drives the deterministic phase graph:
//!
//! ```text
//! starting → night_0 → [cupid_phase?] → werewolf_phase → seer_phase
//!          → witch_phase → bodyguard_phase → (resolve night)
//!          → day_discussion → day_voting → (resolve day)
//!          → (hunter_phase?) → next night → … → game_over
//! ```
//!
//! Role sub-phases are skipped when no living player holds the role, and
//! `night_0`/`cupid_phase` only exist on the first night. The resolve
//! steps are instantaneous: they run inside the same transaction as the
//! transition out of the last sub-phase. Phases are explicit states with
//! stored deadlines, so a restarted process recomputes its timers from
//! `phase_deadline` alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::game::day::resolve_day;
use crate::game::deaths::DeathResult;
use crate::game::error::EngineError;
use crate::game::night::{resolve_night, tentative_werewolf_target};
use crate::game::state::Recipients;
use crate::game::win;
use crate::protocol::messages::{DeathRecord, EventBody, PhaseChangePayload};
use crate::protocol::{KnowledgeKind, Phase, SessionId, Team, Winner};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::store::SessionTxn;

use super::{GameServer, SchedulerHandle};

/// What triggered an advance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fire {
    /// The stored deadline elapsed
    Deadline,
    /// All required actors acted; the deadline stays the upper bound
    Early,
}

/// Where the graph continues after a resolve (or a hunter interrupt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStage {
    Day,
    Night,
}

fn stage_marker(stage: NextStage) -> Phase {
    match stage {
        NextStage::Day => Phase::DayDiscussion,
        NextStage::Night => Phase::WerewolfPhase,
    }
}

fn marker_stage(marker: Phase) -> NextStage {
    if marker.is_night() {
        NextStage::Night
    } else {
        NextStage::Day
    }
}

impl GameServer {
    /// Spawn the per-session timer task. The task sleeps until the stored
    /// deadline, wakes early when the doorbell rings, and stops on
    /// cancellation or a terminal phase. Safe to call again after a
    /// restart: the next timer is recomputed from the stored deadline.
    pub(crate) fn spawn_session_timer(self: &Arc<Self>, session_id: SessionId) {
        let notify = Arc::new(Notify::new());
        let cancel = self.shutdown.child_token();
        self.timers.insert(
            session_id,
            SchedulerHandle {
                notify: notify.clone(),
                cancel: cancel.clone(),
            },
        );

        let server = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let snapshot = match server.store.snapshot(&session_id).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        error!(%session_id, %err, "timer lost its session");
                        break;
                    }
                };
                if snapshot.session.is_terminal() {
                    break;
                }

                let wait = snapshot
                    .session
                    .phase_deadline
                    .and_then(|deadline| (deadline - Utc::now()).to_std().ok())
                    .unwrap_or(Duration::ZERO);

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = notify.notified() => {
                        server.advance_guarded(&session_id, Fire::Early).await;
                    }
                    () = tokio::time::sleep(wait) => {
                        server.advance_guarded(&session_id, Fire::Deadline).await;
                    }
                }
            }
            debug!(%session_id, "session timer stopped");
        });
    }

    /// Ring the early-fire doorbell after an accepted action.
    pub(crate) fn nudge(&self, session_id: &SessionId) {
        if let Some(handle) = self.timers.get(session_id) {
            handle.notify.notify_one();
        }
    }

    /// Advance with the resolver retry budget; a final transient or
    /// internal failure quarantines the session.
    pub(crate) async fn advance_guarded(self: &Arc<Self>, session_id: &SessionId, fire: Fire) {
        let executor =
            RetryExecutor::with_metrics(RetryConfig::resolver(), self.metrics.clone());
        let server = Arc::clone(self);
        let id = *session_id;
        let outcome = executor
            .execute("phase_advance", move || {
                let server = Arc::clone(&server);
                async move { server.advance_session_inner(&id, fire).await }
            })
            .await;
        match outcome {
            Ok(_) => {}
            Err(EngineError::NotFound) => {}
            Err(err @ (EngineError::Store(_) | EngineError::Internal(_))) => {
                error!(%session_id, %err, "phase advance failed, quarantining session");
                self.quarantine_session(session_id).await;
            }
            Err(EngineError::Busy) => {
                // Lock contention is not a resolver failure; the timer
                // re-fires and the retry executor already backed off
                warn!(%session_id, "phase advance contended, will retry");
            }
            Err(err) => {
                warn!(%session_id, %err, "phase advance rejected");
            }
        }
    }

    /// Advance past the current phase as if its deadline had fired. The
    /// per-session timer drives this; it is public for operational tooling
    /// and deterministic tests. Returns the phase now active.
    pub async fn advance_session(self: &Arc<Self>, session_id: &SessionId) -> Result<Phase, EngineError> {
        let (changed, events) = self
            .store
            .with_transaction(session_id, self.lock_timeout(), |txn| {
                // Forced advance ignores the stored deadline
                advance_txn(txn, Fire::Deadline, true)
            })
            .await?;
        self.publish_after_advance(session_id, changed, events).await
    }

    async fn advance_session_inner(
        self: &Arc<Self>,
        session_id: &SessionId,
        fire: Fire,
    ) -> Result<Phase, EngineError> {
        let (changed, events) = self
            .store
            .with_transaction(session_id, self.lock_timeout(), move |txn| {
                advance_txn(txn, fire, false)
            })
            .await?;
        self.publish_after_advance(session_id, changed, events).await
    }

    async fn publish_after_advance(
        self: &Arc<Self>,
        session_id: &SessionId,
        changed: bool,
        events: Vec<crate::game::state::EventRow>,
    ) -> Result<Phase, EngineError> {
        let snapshot = self.store.snapshot(session_id).await?;
        if changed {
            self.metrics.increment_phase_transitions();
            self.hub.publish(&snapshot, &events).await;
            if snapshot.session.is_terminal() {
                self.finish_session(session_id);
            }
        }
        Ok(snapshot.session.phase)
    }

    /// Terminal bookkeeping: stop the timer, count the session. Idempotent
    /// across the timer, action and cancellation paths.
    pub(crate) fn finish_session(&self, session_id: &SessionId) {
        if let Some((_, handle)) = self.timers.remove(session_id) {
            handle.cancel.cancel();
            self.metrics.increment_sessions_finished();
            info!(%session_id, "session finished");
        }
    }

    /// Invariant violation or exhausted retries: freeze the session as
    /// abandoned so clients see a terminal state instead of a wedge.
    pub(crate) async fn quarantine_session(self: &Arc<Self>, session_id: &SessionId) {
        self.metrics.increment_sessions_abandoned();
        let result = self
            .store
            .with_transaction(session_id, self.lock_timeout(), |txn| {
                if txn.session().is_terminal() {
                    return Ok(());
                }
                finalize(txn, Winner::Abandoned, &[]);
                Ok(())
            })
            .await;
        match result {
            Ok((_, events)) => {
                if let Ok(snapshot) = self.store.snapshot(session_id).await {
                    self.hub.publish(&snapshot, &events).await;
                }
            }
            Err(err) => error!(%session_id, %err, "failed to quarantine session"),
        }
        self.finish_session(session_id);
    }
}

/// One transition of the phase graph, inside a transaction. Returns
/// whether anything changed. `forced` bypasses the deadline check used to
/// debounce stale timer wakeups.
pub(crate) fn advance_txn(
    txn: &mut SessionTxn,
    fire: Fire,
    forced: bool,
) -> Result<bool, EngineError> {
    if txn.session().is_terminal() {
        return Ok(false);
    }
    if fire == Fire::Deadline && !forced {
        // A stale wakeup: an early advance already moved the deadline on
        if let Some(deadline) = txn.session().phase_deadline {
            if deadline > Utc::now() {
                return Ok(false);
            }
        }
    }

    let phase = txn.session().phase;
    match phase {
        Phase::Starting => {
            if fire == Fire::Early {
                return Ok(false);
            }
            enter_night(txn, &[]);
            Ok(true)
        }
        Phase::Night0
        | Phase::CupidPhase
        | Phase::WerewolfPhase
        | Phase::SeerPhase
        | Phase::WitchPhase
        | Phase::BodyguardPhase => {
            if fire == Fire::Early && !subphase_complete(txn, phase) {
                return Ok(false);
            }
            match next_night_subphase(txn, Some(phase)) {
                Some(next) => enter_phase(txn, next, &[]),
                None => {
                    let result = resolve_night(txn)?;
                    after_deaths(txn, result, NextStage::Day)?;
                }
            }
            Ok(true)
        }
        Phase::DayDiscussion => {
            if fire == Fire::Early {
                return Ok(false);
            }
            enter_phase(txn, Phase::DayVoting, &[]);
            Ok(true)
        }
        Phase::DayVoting => {
            if fire == Fire::Early && !all_voted(txn) {
                return Ok(false);
            }
            let result = resolve_day(txn)?;
            after_deaths(txn, result, NextStage::Night)?;
            Ok(true)
        }
        Phase::HunterPhase => {
            if fire == Fire::Early {
                // The shot itself resumes the graph via the action path
                return Ok(false);
            }
            expire_hunter_window(txn)?;
            Ok(true)
        }
        Phase::MayorReveal | Phase::GameOver => Ok(false),
    }
}

/// Whether every required actor of the current sub-phase has acted. The
/// witch may legitimately do nothing, so her phase never completes early.
pub(crate) fn subphase_complete(txn: &SessionTxn, phase: Phase) -> bool {
    let phase_number = txn.session().phase_number;
    match phase {
        Phase::CupidPhase => txn
            .alive_players()
            .filter(|p| p.role.spec().can_pair)
            .all(|p| txn.has_action(&p.id, phase_number, crate::protocol::ActionKind::CupidChoose)),
        Phase::WerewolfPhase => txn
            .alive_players()
            .filter(|p| p.team == Team::Werewolves)
            .all(|p| txn.has_action(&p.id, phase_number, crate::protocol::ActionKind::WerewolfVote)),
        Phase::SeerPhase => txn
            .alive_players()
            .filter(|p| p.role.spec().can_divine)
            .all(|p| txn.has_action(&p.id, phase_number, crate::protocol::ActionKind::SeerDivine)),
        Phase::BodyguardPhase => txn
            .alive_players()
            .filter(|p| p.role.spec().can_protect)
            .all(|p| {
                txn.has_action(
                    &p.id,
                    phase_number,
                    crate::protocol::ActionKind::BodyguardProtect,
                )
            }),
        _ => false,
    }
}

fn all_voted(txn: &SessionTxn) -> bool {
    let phase_number = txn.session().phase_number;
    txn.alive_players()
        .all(|p| txn.has_action(&p.id, phase_number, crate::protocol::ActionKind::VoteLynch))
}

/// Next eligible night sub-phase after `current` (`None` scans from the
/// top on re-entry). Sub-phases without a living actor are skipped;
/// `night_0` and `cupid_phase` only exist on the first night.
fn next_night_subphase(txn: &SessionTxn, current: Option<Phase>) -> Option<Phase> {
    const ORDER: [Phase; 6] = [
        Phase::Night0,
        Phase::CupidPhase,
        Phase::WerewolfPhase,
        Phase::SeerPhase,
        Phase::WitchPhase,
        Phase::BodyguardPhase,
    ];
    let start = match current {
        Some(phase) => ORDER.iter().position(|p| *p == phase).map_or(0, |i| i + 1),
        None => 0,
    };
    ORDER
        .iter()
        .skip(start)
        .copied()
        .find(|phase| subphase_eligible(txn, *phase))
}

fn subphase_eligible(txn: &SessionTxn, phase: Phase) -> bool {
    let first_night = txn.session().day_number == 0;
    match phase {
        // night_0 is the first-night opening beat, entered directly by
        // enter_night and never revisited
        Phase::Night0 => false,
        Phase::CupidPhase => {
            first_night && txn.alive_players().any(|p| p.role.spec().can_pair)
        }
        Phase::WerewolfPhase => txn.alive_players().any(|p| p.team == Team::Werewolves),
        Phase::SeerPhase => txn.alive_players().any(|p| p.role.spec().can_divine),
        Phase::WitchPhase => txn.alive_players().any(|p| {
            p.role.spec().can_heal && (!p.role_state.heal_used || !p.role_state.poison_used)
        }),
        Phase::BodyguardPhase => txn.alive_players().any(|p| p.role.spec().can_protect),
        _ => false,
    }
}

/// Open a night cycle: mark its first phase number and enter the opening
/// phase (night_0 on the first night, the first eligible sub-phase after).
fn enter_night(txn: &mut SessionTxn, deaths: &[DeathRecord]) {
    let first_subphase_number = txn.session().phase_number + 1;
    txn.session_mut().night_started_phase = first_subphase_number;
    let first = if txn.session().day_number == 0 {
        Some(Phase::Night0)
    } else {
        next_night_subphase(txn, None)
    };
    match first {
        Some(phase) => enter_phase(txn, phase, deaths),
        // No eligible night actor at all; fall through to day
        None => enter_phase(txn, Phase::DayDiscussion, deaths),
    }
}

/// Move the session into `to`: bump the phase number, compute the
/// deadline, emit the phase-change event and any entry side-information.
fn enter_phase(txn: &mut SessionTxn, to: Phase, deaths: &[DeathRecord]) {
    let from = txn.session().phase;
    let durations = txn.session().config.durations;
    let deadline = durations
        .for_phase(to)
        .map(|ms| Utc::now() + chrono::Duration::milliseconds(ms as i64));

    {
        let session = txn.session_mut();
        session.phase = to;
        session.phase_number += 1;
        session.phase_deadline = deadline;
        if to == Phase::DayDiscussion {
            session.day_number += 1;
        }
    }

    let payload = PhaseChangePayload {
        from,
        to,
        phase_number: txn.session().phase_number,
        day_number: txn.session().day_number,
        deadline,
        deaths: deaths.to_vec(),
    };
    txn.append_event(EventBody::PhaseChange(Box::new(payload)), Recipients::All);
    debug!(%from, %to, phase_number = txn.session().phase_number, "phase entered");

    match to {
        Phase::WitchPhase => notify_witch(txn),
        Phase::HunterPhase => notify_hunter(txn, deadline),
        _ => {}
    }
}

/// The witch learns who the pack is about to kill, so she can decide on
/// the heal.
fn notify_witch(txn: &mut SessionTxn) {
    let Some(witch) = txn
        .alive_players()
        .find(|p| p.role.spec().can_heal)
        .map(|p| p.id)
    else {
        return;
    };
    let victim = tentative_werewolf_target(txn);
    txn.append_event(
        EventBody::PrivateKnowledge {
            kind: KnowledgeKind::WitchNotice,
            data: serde_json::json!({ "victim": victim }),
        },
        Recipients::Players(vec![witch]),
    );
}

fn notify_hunter(txn: &mut SessionTxn, deadline: Option<chrono::DateTime<Utc>>) {
    let Some(hunter) = txn.session().pending_hunter else {
        return;
    };
    txn.append_event(
        EventBody::PrivateKnowledge {
            kind: KnowledgeKind::HunterWindow,
            data: serde_json::json!({ "deadline": deadline }),
        },
        Recipients::Players(vec![hunter]),
    );
}

/// Continue the graph after a death batch: win check first, then the
/// hunter interrupt, then the next stage. A victory on the batch outranks
/// an open hunter window; a decided game is over.
pub(crate) fn after_deaths(
    txn: &mut SessionTxn,
    result: DeathResult,
    next: NextStage,
) -> Result<(), EngineError> {
    if let Some(winner) = win::evaluate(txn.session(), txn.players(), &result) {
        finalize(txn, winner, &result.deaths);
        return Ok(());
    }
    if let Some(hunter) = result.pending_hunter {
        {
            let session = txn.session_mut();
            session.pending_hunter = Some(hunter);
            session.resume_phase = Some(stage_marker(next));
        }
        enter_phase(txn, Phase::HunterPhase, &result.deaths);
        return Ok(());
    }
    match next {
        NextStage::Day => enter_phase(txn, Phase::DayDiscussion, &result.deaths),
        NextStage::Night => enter_night(txn, &result.deaths),
    }
    Ok(())
}

/// Resume the interrupted path once the hunter has shot (the action path
/// merges the shot deaths in) or the window lapsed.
pub(crate) fn resume_after_hunter(
    txn: &mut SessionTxn,
    shot_result: DeathResult,
) -> Result<(), EngineError> {
    let marker = txn
        .session()
        .resume_phase
        .unwrap_or(Phase::DayDiscussion);
    {
        let session = txn.session_mut();
        session.pending_hunter = None;
        session.resume_phase = None;
    }
    after_deaths(txn, shot_result, marker_stage(marker))
}

fn expire_hunter_window(txn: &mut SessionTxn) -> Result<(), EngineError> {
    debug!(
        hunter = ?txn.session().pending_hunter,
        "hunter window lapsed without a shot"
    );
    resume_after_hunter(txn, DeathResult::default())
}

/// Freeze the session: winner set, terminal phase, final event.
pub(crate) fn finalize(txn: &mut SessionTxn, winner: Winner, deaths: &[DeathRecord]) {
    txn.session_mut().winner = Some(winner);
    enter_phase(txn, Phase::GameOver, deaths);
    txn.append_event(EventBody::GameOver { winner }, Recipients::All);
    info!(session = %txn.session().id, %winner, "game over");
}
