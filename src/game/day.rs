//! Day resolution: the lynch tally.
//!
//! Each vote counts once, except a revealed mayor's which counts twice.
//! Plurality wins; any tie means nobody is lynched. Mayor reveal weighting
//! applies to the current vote retroactively but never to closed phases,
//! which falls out naturally from tallying at resolve time.

use std::collections::HashMap;

use tracing::debug;

use crate::protocol::{ActionKind, DeathReason, PlayerId};
use crate::store::SessionTxn;

use super::deaths::{process_death, DeathContext, DeathResult};
use super::error::EngineError;

/// Weighted plurality over `(voter, target)` pairs; `None` on a tie or an
/// empty ballot.
pub fn tally_lynch_votes(votes: &[(PlayerId, PlayerId, u32)]) -> Option<PlayerId> {
    let mut weights: HashMap<PlayerId, u32> = HashMap::new();
    for (_, target, weight) in votes {
        *weights.entry(*target).or_insert(0) += weight;
    }
    let top = weights.values().copied().max()?;
    let mut leaders = weights.iter().filter(|(_, w)| **w == top);
    let leader = leaders.next().map(|(target, _)| *target)?;
    if leaders.next().is_some() {
        return None;
    }
    Some(leader)
}

/// Resolve the current `day_voting` phase inside the caller's transaction.
pub fn resolve_day(txn: &mut SessionTxn) -> Result<DeathResult, EngineError> {
    let phase_number = txn.session().phase_number;

    let ballots: Vec<(PlayerId, PlayerId)> = txn
        .actions_in_phase(phase_number)
        .filter(|a| a.kind == ActionKind::VoteLynch)
        .filter_map(|a| a.primary_target.map(|t| (a.actor, t)))
        .collect();

    let mut weighted = Vec::with_capacity(ballots.len());
    for (voter, target) in ballots {
        let weight = if txn.player(&voter)?.role_state.is_revealed_mayor {
            2
        } else {
            1
        };
        weighted.push((voter, target, weight));
    }

    match tally_lynch_votes(&weighted) {
        Some(target) => {
            debug!(%target, phase_number, "lynch target selected");
            process_death(
                txn,
                DeathContext::new(target, DeathReason::Lynched, phase_number),
            )
        }
        None => {
            debug!(phase_number, "lynch vote tied or empty, nobody dies");
            Ok(DeathResult::default())
        }
    }
}
