//! Night resolution.
//!
//! At the end of the last night sub-phase, gathers the cycle's recorded
//! actions, computes the tentative victims under the precedence rules
//! (bodyguard beats werewolves, heal beats werewolves, poison beats
//! everything) and hands the ordered death batch to the death resolver.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing::debug;

use crate::protocol::messages::EventBody;
use crate::protocol::{ActionKind, KnowledgeKind, PlayerId, Team};
use crate::store::SessionTxn;

use super::deaths::{process_death, DeathContext, DeathResult};
use super::error::EngineError;
use super::state::{ActionRow, Recipients};

/// Plurality winner of the pack vote. Ties are broken in favor of the
/// tied target that received its earliest vote first; votes are examined
/// in commit order, which the store makes deterministic.
pub fn tally_werewolf_votes(votes: &[&ActionRow]) -> Option<PlayerId> {
    let mut counts: HashMap<PlayerId, (usize, usize)> = HashMap::new();
    for (index, vote) in votes.iter().enumerate() {
        let Some(target) = vote.primary_target else {
            continue;
        };
        let entry = counts.entry(target).or_insert((0, index));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(target, _)| target)
}

/// The victim the pack is currently converging on, for the witch's notice.
pub fn tentative_werewolf_target(txn: &SessionTxn) -> Option<PlayerId> {
    let night_start = txn.session().night_started_phase;
    let votes: Vec<&ActionRow> = txn
        .actions_since(night_start)
        .filter(|a| a.kind == ActionKind::WerewolfVote)
        .collect();
    tally_werewolf_votes(&votes)
}

/// Resolve one night cycle inside the caller's transaction. Returns the
/// merged death batch; the caller evaluates win conditions and advances.
pub fn resolve_night(txn: &mut SessionTxn) -> Result<DeathResult, EngineError> {
    let night_start = txn.session().night_started_phase;
    let phase_number = txn.session().phase_number;
    let cycle: Vec<ActionRow> = txn.actions_since(night_start).cloned().collect();

    // 1-2. Pack vote
    let votes: Vec<&ActionRow> = cycle
        .iter()
        .filter(|a| a.kind == ActionKind::WerewolfVote)
        .collect();
    let mut werewolf_target = tally_werewolf_votes(&votes);

    // 3. Bodyguard neutralizes a matching target and remembers it for the
    // consecutive-night rule; a night off clears the memory.
    let protect = cycle
        .iter()
        .find(|a| a.kind == ActionKind::BodyguardProtect)
        .map(|a| (a.actor, a.primary_target));
    match protect {
        Some((guard, target)) => {
            if target.is_some() && werewolf_target == target {
                debug!(target = ?target, "werewolf victim protected by bodyguard");
                werewolf_target = None;
            }
            txn.player_mut(&guard)?.role_state.last_protected_target = target;
        }
        None => {
            let idle_guards: Vec<PlayerId> = txn
                .players()
                .iter()
                .filter(|p| p.is_alive && p.role.spec().can_protect)
                .map(|p| p.id)
                .collect();
            for guard in idle_guards {
                txn.player_mut(&guard)?.role_state.last_protected_target = None;
            }
        }
    }

    // 4. Heal neutralizes the victim; the potion is spent either way.
    if let Some(heal) = cycle.iter().find(|a| a.kind == ActionKind::WitchHeal) {
        txn.player_mut(&heal.actor)?.role_state.heal_used = true;
        if werewolf_target.is_some() {
            debug!("werewolf victim healed by witch");
            werewolf_target = None;
        }
    }

    // 5. Poison adds a victim nothing can block.
    let mut poison_victim = None;
    if let Some(poison) = cycle.iter().find(|a| a.kind == ActionKind::WitchPoison) {
        txn.player_mut(&poison.actor)?.role_state.poison_used = true;
        poison_victim = poison.primary_target;
    }

    // 7. Side-information events
    if let Some(divine) = cycle.iter().find(|a| a.kind == ActionKind::SeerDivine) {
        if let Some(target) = divine.primary_target {
            let role = txn.player(&target)?.role;
            txn.append_event(
                EventBody::PrivateKnowledge {
                    kind: KnowledgeKind::SeerResult,
                    data: serde_json::json!({
                        "target": target,
                        "role": role,
                        "team": role.team(),
                    }),
                },
                Recipients::Players(vec![divine.actor]),
            );
        }
    }
    roll_little_girl_peek(txn, phase_number)?;

    // 6/8. Ordered death batch: werewolf victim first, then poison victim.
    // Triggers from the first death complete before the second starts.
    let mut result = DeathResult::default();
    if let Some(victim) = werewolf_target {
        result.merge(process_death(
            txn,
            DeathContext::new(victim, crate::protocol::DeathReason::WerewolfKill, phase_number),
        )?);
    }
    if let Some(victim) = poison_victim {
        result.merge(process_death(
            txn,
            DeathContext::new(victim, crate::protocol::DeathReason::Poison, phase_number),
        )?);
    }
    Ok(result)
}

/// Seeded self-exposure roll for the little girl. Disabled when the risk
/// is zero; deterministic given (session seed, phase number).
fn roll_little_girl_peek(txn: &mut SessionTxn, phase_number: u32) -> Result<(), EngineError> {
    let risk = txn.session().config.little_girl_peek_risk;
    if risk <= 0.0 {
        return Ok(());
    }
    let Some(girl) = txn
        .players()
        .iter()
        .find(|p| p.is_alive && p.role.spec().can_peek)
        .map(|p| p.id)
    else {
        return Ok(());
    };
    let mut rng = StdRng::seed_from_u64(txn.session().seed ^ u64::from(phase_number));
    if rng.random::<f64>() < risk {
        let pack: Vec<PlayerId> = txn
            .players()
            .iter()
            .filter(|p| p.is_alive && p.team == Team::Werewolves)
            .map(|p| p.id)
            .collect();
        if !pack.is_empty() {
            txn.append_event(
                EventBody::PrivateKnowledge {
                    kind: KnowledgeKind::LittleGirlSeen,
                    data: serde_json::json!({ "player": girl }),
                },
                Recipients::Players(pack),
            );
        }
    }
    Ok(())
}
