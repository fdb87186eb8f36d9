//! Victory predicates, evaluated in order after every committed death
//! batch. First match wins; once a winner is set it never changes.

use crate::protocol::Winner;

use super::deaths::DeathResult;
use super::state::{PlayerRow, SessionRow};

/// Test the victory predicates against post-batch state. Returns `None`
/// while the game continues.
pub fn evaluate(
    session: &SessionRow,
    players: &[PlayerRow],
    batch: &DeathResult,
) -> Option<Winner> {
    if session.winner.is_some() {
        return session.winner;
    }

    // 1. Lovers: the pair outlasted everyone else
    let alive: Vec<&PlayerRow> = players.iter().filter(|p| p.is_alive).collect();
    if let [a, b] = alive.as_slice() {
        if a.lover_id == Some(b.id) && b.lover_id == Some(a.id) {
            return Some(Winner::Lovers);
        }
    }

    // 2. Tanner: lynched this cycle (and only lynched)
    if batch.tanner_lynched {
        return Some(Winner::Tanner);
    }

    // 3. Werewolves reach parity
    if session.werewolves_alive > 0 && session.werewolves_alive >= session.villagers_alive {
        return Some(Winner::Werewolves);
    }

    // 4. Village is clean
    if session.werewolves_alive == 0 {
        return Some(Winner::Villagers);
    }

    None
}
