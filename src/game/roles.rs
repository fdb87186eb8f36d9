use serde::{Deserialize, Serialize};

use crate::protocol::{Phase, Team};

/// Every role the engine knows. The registry is immutable at runtime;
/// resolvers branch on capability flags rather than role names so that
/// adding a role stays cheap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Werewolf,
    Villager,
    Seer,
    Witch,
    Hunter,
    Cupid,
    Bodyguard,
    Mayor,
    Medium,
    Tanner,
    LittleGirl,
}

/// Static capabilities of one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub team: Team,
    /// Night sub-phase in which this role acts, if any
    pub night_slot: Option<Phase>,
    /// At most one seat may hold this role
    pub unique: bool,
    pub can_divine: bool,
    pub can_heal: bool,
    pub can_poison: bool,
    pub can_protect: bool,
    /// Pairs the lovers on the first night
    pub can_pair: bool,
    pub can_reveal_mayor: bool,
    /// May peek during the werewolf phase, risking exposure
    pub can_peek: bool,
    /// Death grants a bounded shot window
    pub has_death_trigger: bool,
}

const PLAIN_VILLAGER: RoleSpec = RoleSpec {
    team: Team::Villagers,
    night_slot: None,
    unique: false,
    can_divine: false,
    can_heal: false,
    can_poison: false,
    can_protect: false,
    can_pair: false,
    can_reveal_mayor: false,
    can_peek: false,
    has_death_trigger: false,
};

const WEREWOLF: RoleSpec = RoleSpec {
    team: Team::Werewolves,
    night_slot: Some(Phase::WerewolfPhase),
    unique: false,
    ..PLAIN_VILLAGER
};

const SEER: RoleSpec = RoleSpec {
    night_slot: Some(Phase::SeerPhase),
    unique: true,
    can_divine: true,
    ..PLAIN_VILLAGER
};

const WITCH: RoleSpec = RoleSpec {
    night_slot: Some(Phase::WitchPhase),
    unique: true,
    can_heal: true,
    can_poison: true,
    ..PLAIN_VILLAGER
};

const HUNTER: RoleSpec = RoleSpec {
    unique: true,
    has_death_trigger: true,
    ..PLAIN_VILLAGER
};

const CUPID: RoleSpec = RoleSpec {
    night_slot: Some(Phase::CupidPhase),
    unique: true,
    can_pair: true,
    ..PLAIN_VILLAGER
};

const BODYGUARD: RoleSpec = RoleSpec {
    night_slot: Some(Phase::BodyguardPhase),
    unique: true,
    can_protect: true,
    ..PLAIN_VILLAGER
};

const MAYOR: RoleSpec = RoleSpec {
    unique: true,
    can_reveal_mayor: true,
    ..PLAIN_VILLAGER
};

const MEDIUM: RoleSpec = RoleSpec {
    unique: true,
    ..PLAIN_VILLAGER
};

const TANNER: RoleSpec = RoleSpec {
    team: Team::Neutral,
    unique: true,
    ..PLAIN_VILLAGER
};

const LITTLE_GIRL: RoleSpec = RoleSpec {
    unique: true,
    can_peek: true,
    ..PLAIN_VILLAGER
};

impl Role {
    /// Every role, in a stable order.
    pub const ALL: [Role; 11] = [
        Role::Werewolf,
        Role::Villager,
        Role::Seer,
        Role::Witch,
        Role::Hunter,
        Role::Cupid,
        Role::Bodyguard,
        Role::Mayor,
        Role::Medium,
        Role::Tanner,
        Role::LittleGirl,
    ];

    /// Static capability record for this role.
    pub const fn spec(self) -> &'static RoleSpec {
        match self {
            Self::Werewolf => &WEREWOLF,
            Self::Villager => &PLAIN_VILLAGER,
            Self::Seer => &SEER,
            Self::Witch => &WITCH,
            Self::Hunter => &HUNTER,
            Self::Cupid => &CUPID,
            Self::Bodyguard => &BODYGUARD,
            Self::Mayor => &MAYOR,
            Self::Medium => &MEDIUM,
            Self::Tanner => &TANNER,
            Self::LittleGirl => &LITTLE_GIRL,
        }
    }

    pub const fn team(self) -> Team {
        self.spec().team
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Werewolf => "werewolf",
            Self::Villager => "villager",
            Self::Seer => "seer",
            Self::Witch => "witch",
            Self::Hunter => "hunter",
            Self::Cupid => "cupid",
            Self::Bodyguard => "bodyguard",
            Self::Mayor => "mayor",
            Self::Medium => "medium",
            Self::Tanner => "tanner",
            Self::LittleGirl => "little_girl",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
