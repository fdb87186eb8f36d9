use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::protocol::{MAX_PLAYERS, MIN_PLAYERS};

use super::error::EngineError;
use super::roles::Role;
use super::state::SessionConfig;

/// Produce a uniformly random seat→role assignment satisfying the
/// requested distribution. The shuffle is driven by the session seed so
/// assignments are reproducible.
pub fn assign_roles(
    seats: usize,
    config: &SessionConfig,
    seed: u64,
) -> Result<Vec<Role>, EngineError> {
    if seats < MIN_PLAYERS {
        return Err(EngineError::Config(format!(
            "roster has {seats} seats, minimum is {MIN_PLAYERS}"
        )));
    }
    if seats > MAX_PLAYERS {
        return Err(EngineError::Config(format!(
            "roster has {seats} seats, maximum is {MAX_PLAYERS}"
        )));
    }

    let mut roles = match &config.explicit_roles {
        Some(explicit) => explicit.clone(),
        None => build_distribution(seats, config)?,
    };
    validate_multiset(seats, &roles)?;

    let mut rng = StdRng::seed_from_u64(seed);
    roles.shuffle(&mut rng);
    Ok(roles)
}

/// Expand `{werewolf_count, enabled_roles}` into a full role multiset,
/// plain villagers filling the remaining seats.
fn build_distribution(seats: usize, config: &SessionConfig) -> Result<Vec<Role>, EngineError> {
    if config.werewolf_count == 0 {
        return Err(EngineError::Config(
            "at least one werewolf is required".to_string(),
        ));
    }

    let mut roles = vec![Role::Werewolf; config.werewolf_count];
    for role in &config.enabled_roles {
        match role {
            Role::Werewolf | Role::Villager => {
                return Err(EngineError::Config(format!(
                    "`{role}` cannot be enabled as a special role; use werewolf_count"
                )));
            }
            _ => roles.push(*role),
        }
    }

    if roles.len() > seats {
        return Err(EngineError::Config(format!(
            "distribution needs {} seats but roster has {seats}",
            roles.len()
        )));
    }
    roles.resize(seats, Role::Villager);
    Ok(roles)
}

fn validate_multiset(seats: usize, roles: &[Role]) -> Result<(), EngineError> {
    if roles.len() != seats {
        return Err(EngineError::Config(format!(
            "explicit role list covers {} seats but roster has {seats}",
            roles.len()
        )));
    }

    let werewolves = roles.iter().filter(|r| **r == Role::Werewolf).count();
    if werewolves == 0 {
        return Err(EngineError::Config(
            "at least one werewolf is required".to_string(),
        ));
    }
    if werewolves >= seats {
        return Err(EngineError::Config(
            "werewolves cannot fill every seat".to_string(),
        ));
    }

    for role in Role::ALL {
        if role.spec().unique {
            let count = roles.iter().filter(|r| **r == role).count();
            if count > 1 {
                return Err(EngineError::Config(format!(
                    "role `{role}` may appear at most once, got {count}"
                )));
            }
        }
    }
    Ok(())
}
