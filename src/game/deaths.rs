//! Death resolution.
//!
//! `process_death` is the only writer of `is_alive`, `died_at_phase`,
//! `death_reason` and the alive-counts. It always runs inside the caller's
//! transaction: either every consequence of a death batch commits, or none
//! does. Cascades are driven by an explicit work queue, never by call-stack
//! depth.

use std::collections::VecDeque;

use tracing::debug;

use crate::protocol::messages::{DeathRecord, EventBody};
use crate::protocol::{DeathReason, PlayerId};
use crate::store::SessionTxn;

use super::error::EngineError;
use super::roles::Role;
use super::state::Recipients;

/// One requested death and how it came about.
#[derive(Debug, Clone, Copy)]
pub struct DeathContext {
    pub victim: PlayerId,
    pub reason: DeathReason,
    pub phase_number: u32,
    pub killer: Option<PlayerId>,
    /// Loop-breaker for the lover cascade: a death reached through a lover
    /// link must not fire the link again.
    pub bypass_lover: bool,
}

impl DeathContext {
    pub fn new(victim: PlayerId, reason: DeathReason, phase_number: u32) -> Self {
        Self {
            victim,
            reason,
            phase_number,
            killer: None,
            bypass_lover: false,
        }
    }

    pub fn with_killer(mut self, killer: PlayerId) -> Self {
        self.killer = Some(killer);
        self
    }
}

/// Accumulated outcome of one death batch.
#[derive(Debug, Clone, Default)]
pub struct DeathResult {
    /// Players killed in this batch, in resolution order, roles revealed
    pub deaths: Vec<DeathRecord>,
    /// A hunter died and is owed a bounded shot window
    pub pending_hunter: Option<PlayerId>,
    /// A tanner was lynched in this batch
    pub tanner_lynched: bool,
}

impl DeathResult {
    pub fn merge(&mut self, other: DeathResult) {
        self.deaths.extend(other.deaths);
        if other.pending_hunter.is_some() {
            self.pending_hunter = other.pending_hunter;
        }
        self.tanner_lynched |= other.tanner_lynched;
    }

    pub fn is_empty(&self) -> bool {
        self.deaths.is_empty()
    }
}

/// Kill one player and everything that follows from it.
///
/// Idempotent: a victim who is already dead produces an empty result, which
/// also makes simultaneous mutual lover deaths single-fire, since the
/// second queue entry observes `is_alive == false` and is a no-op.
pub fn process_death(txn: &mut SessionTxn, ctx: DeathContext) -> Result<DeathResult, EngineError> {
    let mut result = DeathResult::default();
    let mut queue = VecDeque::new();
    queue.push_back(ctx);

    while let Some(ctx) = queue.pop_front() {
        let player = txn.player(&ctx.victim)?;
        if !player.is_alive {
            continue;
        }
        let role = player.role;
        let lover = player.lover_id;
        let counts_as_wolf = player.counts_as_werewolf();
        let grants_shot = role.spec().has_death_trigger && !player.role_state.has_shot;

        {
            let row = txn.player_mut(&ctx.victim)?;
            row.is_alive = false;
            row.died_at_phase = Some(ctx.phase_number);
            row.death_reason = Some(ctx.reason);
            if grants_shot {
                row.role_state.has_shot = true;
            }
        }

        let session = txn.session_mut();
        let bucket = if counts_as_wolf {
            &mut session.werewolves_alive
        } else {
            &mut session.villagers_alive
        };
        *bucket = bucket.checked_sub(1).ok_or_else(|| {
            EngineError::Internal(format!("alive-count underflow killing {}", ctx.victim))
        })?;

        txn.append_event(
            EventBody::PlayerDeath {
                player: ctx.victim,
                role,
                reason: ctx.reason,
                phase_number: ctx.phase_number,
            },
            Recipients::All,
        );
        result.deaths.push(DeathRecord {
            player: ctx.victim,
            role,
            reason: ctx.reason,
        });

        if ctx.reason == DeathReason::Lynched && role == Role::Tanner {
            result.tanner_lynched = true;
        }
        if grants_shot {
            result.pending_hunter = Some(ctx.victim);
        }

        if !ctx.bypass_lover {
            if let Some(lover_id) = lover {
                if txn.player(&lover_id)?.is_alive {
                    queue.push_back(DeathContext {
                        victim: lover_id,
                        reason: DeathReason::LoverDeath,
                        phase_number: ctx.phase_number,
                        killer: None,
                        bypass_lover: true,
                    });
                }
            }
        }

        debug!(
            victim = %ctx.victim,
            role = %role,
            reason = %ctx.reason,
            killer = ?ctx.killer,
            "death resolved"
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::roles::Role;
    use crate::game::testutil::{pair_lovers, player_id, record_with_roles};
    use crate::protocol::Phase;
    use crate::store::MemoryStore;
    use std::time::Duration;

    const ROLES: [Role; 6] = [
        Role::Werewolf,
        Role::Werewolf,
        Role::Hunter,
        Role::Seer,
        Role::Villager,
        Role::Villager,
    ];

    fn timeout() -> Duration {
        Duration::from_millis(500)
    }

    #[tokio::test]
    async fn test_simple_death_updates_row_and_counts() {
        let store = MemoryStore::new();
        let record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        let id = record.session.id;
        let victim = player_id(&record, Role::Seer);
        store.create_session(record).unwrap();

        let (result, events) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(
                    txn,
                    DeathContext::new(victim, DeathReason::WerewolfKill, 4),
                )
            })
            .await
            .unwrap();

        assert_eq!(result.deaths.len(), 1);
        assert_eq!(result.deaths[0].role, Role::Seer);
        assert!(result.pending_hunter.is_none());
        assert_eq!(events.len(), 1, "one public death event");

        let snapshot = store.snapshot(&id).await.unwrap();
        let row = snapshot.player(&victim).unwrap();
        assert!(!row.is_alive);
        assert_eq!(row.died_at_phase, Some(4));
        assert_eq!(row.death_reason, Some(DeathReason::WerewolfKill));
        assert_eq!(snapshot.session.villagers_alive, 3);
        assert_eq!(snapshot.session.werewolves_alive, 2);
    }

    #[tokio::test]
    async fn test_process_death_is_idempotent() {
        let store = MemoryStore::new();
        let record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        let id = record.session.id;
        let victim = player_id(&record, Role::Villager);
        store.create_session(record).unwrap();

        let (first, _) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(txn, DeathContext::new(victim, DeathReason::Poison, 4))
            })
            .await
            .unwrap();
        assert_eq!(first.deaths.len(), 1);

        let (second, events) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(txn, DeathContext::new(victim, DeathReason::Poison, 4))
            })
            .await
            .unwrap();
        assert!(second.is_empty(), "second kill is a no-op");
        assert!(events.is_empty(), "no duplicate death event");

        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.session.villagers_alive, 3);
    }

    #[tokio::test]
    async fn test_hunter_death_opens_shot_window_once() {
        let store = MemoryStore::new();
        let record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        let id = record.session.id;
        let hunter = player_id(&record, Role::Hunter);
        store.create_session(record).unwrap();

        let (result, _) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(
                    txn,
                    DeathContext::new(hunter, DeathReason::WerewolfKill, 4),
                )
            })
            .await
            .unwrap();
        assert_eq!(result.pending_hunter, Some(hunter));

        let snapshot = store.snapshot(&id).await.unwrap();
        assert!(snapshot.player(&hunter).unwrap().role_state.has_shot);
    }

    #[tokio::test]
    async fn test_lover_cascade_kills_partner_with_lover_reason() {
        let store = MemoryStore::new();
        let mut record = record_with_roles(&ROLES, Phase::DayVoting);
        let id = record.session.id;
        let wolf = player_id(&record, Role::Werewolf);
        let villager = player_id(&record, Role::Villager);
        pair_lovers(&mut record, wolf, villager);
        store.create_session(record).unwrap();

        let (result, _) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(txn, DeathContext::new(wolf, DeathReason::Lynched, 6))
            })
            .await
            .unwrap();

        assert_eq!(result.deaths.len(), 2);
        assert_eq!(result.deaths[0].reason, DeathReason::Lynched);
        assert_eq!(result.deaths[1].reason, DeathReason::LoverDeath);
        assert_eq!(result.deaths[1].player, villager);

        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.session.werewolves_alive, 1);
        assert_eq!(snapshot.session.villagers_alive, 3);
    }

    #[tokio::test]
    async fn test_mutual_lover_batch_does_not_double_fire() {
        let store = MemoryStore::new();
        let mut record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        let id = record.session.id;
        let a = player_id(&record, Role::Villager);
        let b = player_id(&record, Role::Seer);
        pair_lovers(&mut record, a, b);
        store.create_session(record).unwrap();

        // Both lovers die in the same batch: the cascade from the first
        // already kills the second; the second direct call is a no-op.
        let (result, _) = store
            .with_transaction(&id, timeout(), |txn| {
                let mut merged =
                    process_death(txn, DeathContext::new(a, DeathReason::WerewolfKill, 4))?;
                merged.merge(process_death(
                    txn,
                    DeathContext::new(b, DeathReason::Poison, 4),
                )?);
                Ok(merged)
            })
            .await
            .unwrap();

        assert_eq!(result.deaths.len(), 2, "each lover dies exactly once");
        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.session.villagers_alive, 2);
        // The cascaded partner keeps the lover_death reason
        assert_eq!(
            snapshot.player(&b).unwrap().death_reason,
            Some(DeathReason::LoverDeath)
        );
    }

    #[tokio::test]
    async fn test_lover_of_hunter_cascade_and_window() {
        let store = MemoryStore::new();
        let mut record = record_with_roles(&ROLES, Phase::DayVoting);
        let id = record.session.id;
        let hunter = player_id(&record, Role::Hunter);
        let villager = player_id(&record, Role::Villager);
        pair_lovers(&mut record, villager, hunter);
        store.create_session(record).unwrap();

        // Lynch the villager; the hunter dies as lover and still gets the
        // shot window.
        let (result, _) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(txn, DeathContext::new(villager, DeathReason::Lynched, 6))
            })
            .await
            .unwrap();
        assert_eq!(result.deaths.len(), 2);
        assert_eq!(result.pending_hunter, Some(hunter));
    }

    #[tokio::test]
    async fn test_tanner_flag_only_on_lynch() {
        let roles = [
            Role::Werewolf,
            Role::Werewolf,
            Role::Tanner,
            Role::Villager,
            Role::Villager,
        ];
        let store = MemoryStore::new();
        let record = record_with_roles(&roles, Phase::DayVoting);
        let id = record.session.id;
        let tanner = player_id(&record, Role::Tanner);
        store.create_session(record).unwrap();

        let (poisoned, _) = store
            .with_transaction(&id, timeout(), |txn| {
                process_death(txn, DeathContext::new(tanner, DeathReason::Poison, 4))
            })
            .await
            .unwrap();
        assert!(!poisoned.tanner_lynched, "poison must not fire tanner win");
    }
}
