//! Per-viewer projection.
//!
//! The store holds the un-redacted truth; this transform is the single
//! place where the information-hiding rules live. A role is visible when
//! the viewer owns the seat, shares the wolf pack, the seat is dead, or
//! the game is over.

use crate::protocol::messages::{PlayerProjection, SessionProjection, WerewolfVoteView};
use crate::protocol::{ActionKind, PlayerId, Team, VoiceDirective};
use crate::store::SessionRecord;

use super::voice;

/// Build the projection of `record` as seen by `viewer` (a seated player,
/// or `None` for the public view handed back at session start).
pub fn project(record: &SessionRecord, viewer: Option<PlayerId>) -> SessionProjection {
    let session = &record.session;
    let viewer_row = viewer.and_then(|id| record.player(&id));
    let viewer_is_wolf = viewer_row.is_some_and(|p| p.team == Team::Werewolves);
    let reveal_all = session.winner.is_some();

    let players = record
        .players
        .iter()
        .map(|p| {
            let own_seat = viewer == Some(p.id);
            let visible =
                reveal_all || own_seat || !p.is_alive || (viewer_is_wolf && p.team == Team::Werewolves);
            PlayerProjection {
                player_id: p.id,
                user_id: p.user_id,
                display_name: p.display_name.clone(),
                seat: p.seat,
                is_alive: p.is_alive,
                role: visible.then_some(p.role),
                team: visible.then_some(p.team),
                died_at_phase: p.died_at_phase,
                death_reason: p.death_reason,
                is_revealed_mayor: p.role_state.is_revealed_mayor,
                lover_id: if own_seat { p.lover_id } else { None },
            }
        })
        .collect();

    let voice = viewer_row.map_or_else(VoiceDirective::muted, |p| {
        voice::authorize(session.phase, p.role, p.is_alive)
    });

    let werewolf_votes = (viewer_is_wolf && session.phase.is_night()).then(|| {
        record
            .actions
            .iter()
            .filter(|a| {
                a.kind == ActionKind::WerewolfVote && a.phase_number >= session.night_started_phase
            })
            .filter_map(|a| {
                a.primary_target.map(|target| WerewolfVoteView {
                    voter: a.actor,
                    target,
                })
            })
            .collect()
    });

    SessionProjection {
        session_id: session.id,
        phase: session.phase,
        phase_number: session.phase_number,
        day_number: session.day_number,
        phase_deadline: session.phase_deadline,
        winner: session.winner,
        werewolves_alive: session.werewolves_alive,
        villagers_alive: session.villagers_alive,
        you: viewer_row.map(|p| p.id),
        players,
        voice,
        werewolf_votes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::roles::Role;
    use crate::game::state::ActionRow;
    use crate::game::testutil::{nth_player_id, pair_lovers, player_id, record_with_roles};
    use crate::protocol::{DeathReason, Phase, VoiceChannel, Winner};
    use chrono::Utc;
    use uuid::Uuid;

    const ROLES: [Role; 6] = [
        Role::Werewolf,
        Role::Werewolf,
        Role::Seer,
        Role::Witch,
        Role::Villager,
        Role::Villager,
    ];

    fn role_of(projection: &SessionProjection, id: Uuid) -> Option<Role> {
        projection
            .players
            .iter()
            .find(|p| p.player_id == id)
            .and_then(|p| p.role)
    }

    #[test]
    fn test_viewer_sees_own_role_only() {
        let record = record_with_roles(&ROLES, Phase::DayDiscussion);
        let seer = player_id(&record, Role::Seer);
        let witch = player_id(&record, Role::Witch);

        let projection = project(&record, Some(seer));
        assert_eq!(projection.you, Some(seer));
        assert_eq!(role_of(&projection, seer), Some(Role::Seer));
        assert_eq!(role_of(&projection, witch), None);
    }

    #[test]
    fn test_werewolves_see_their_pack() {
        let record = record_with_roles(&ROLES, Phase::DayDiscussion);
        let w1 = nth_player_id(&record, Role::Werewolf, 0);
        let w2 = nth_player_id(&record, Role::Werewolf, 1);
        let seer = player_id(&record, Role::Seer);

        let projection = project(&record, Some(w1));
        assert_eq!(role_of(&projection, w2), Some(Role::Werewolf));
        assert_eq!(role_of(&projection, seer), None);
    }

    #[test]
    fn test_dead_roles_are_public() {
        let mut record = record_with_roles(&ROLES, Phase::DayDiscussion);
        let witch = player_id(&record, Role::Witch);
        for p in &mut record.players {
            if p.id == witch {
                p.is_alive = false;
                p.died_at_phase = Some(3);
                p.death_reason = Some(DeathReason::WerewolfKill);
            }
        }
        record.session.villagers_alive -= 1;

        let villager = nth_player_id(&record, Role::Villager, 0);
        let projection = project(&record, Some(villager));
        assert_eq!(role_of(&projection, witch), Some(Role::Witch));
        let row = projection
            .players
            .iter()
            .find(|p| p.player_id == witch)
            .unwrap();
        assert_eq!(row.death_reason, Some(DeathReason::WerewolfKill));
    }

    #[test]
    fn test_werewolf_votes_hidden_from_village() {
        let mut record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        record.session.night_started_phase = record.session.phase_number;
        let w1 = nth_player_id(&record, Role::Werewolf, 0);
        let target = nth_player_id(&record, Role::Villager, 0);
        record.actions.push(ActionRow {
            id: Uuid::new_v4(),
            session_id: record.session.id,
            actor: w1,
            phase_number: record.session.phase_number,
            kind: ActionKind::WerewolfVote,
            primary_target: Some(target),
            secondary_target: None,
            created_at: Utc::now(),
        });

        let wolf_view = project(&record, Some(w1));
        let votes = wolf_view.werewolf_votes.expect("wolves see the ballot");
        assert_eq!(votes, vec![WerewolfVoteView { voter: w1, target }]);

        let seer_view = project(&record, Some(player_id(&record, Role::Seer)));
        assert!(seer_view.werewolf_votes.is_none());
    }

    #[test]
    fn test_lover_link_is_self_only() {
        let mut record = record_with_roles(&ROLES, Phase::DayDiscussion);
        let a = nth_player_id(&record, Role::Villager, 0);
        let b = player_id(&record, Role::Seer);
        pair_lovers(&mut record, a, b);

        let own = project(&record, Some(a));
        let me = own.players.iter().find(|p| p.player_id == a).unwrap();
        assert_eq!(me.lover_id, Some(b));

        let other = project(&record, Some(nth_player_id(&record, Role::Villager, 1)));
        let seat = other.players.iter().find(|p| p.player_id == a).unwrap();
        assert!(seat.lover_id.is_none());
    }

    #[test]
    fn test_game_over_reveals_everything() {
        let mut record = record_with_roles(&ROLES, Phase::GameOver);
        record.session.winner = Some(Winner::Villagers);
        let villager = nth_player_id(&record, Role::Villager, 0);
        let projection = project(&record, Some(villager));
        for p in &projection.players {
            assert!(p.role.is_some(), "all roles revealed at game over");
        }
    }

    #[test]
    fn test_voice_directive_embedded() {
        let record = record_with_roles(&ROLES, Phase::WerewolfPhase);
        let w1 = nth_player_id(&record, Role::Werewolf, 0);
        let projection = project(&record, Some(w1));
        assert_eq!(projection.voice.channel, Some(VoiceChannel::Werewolf));

        let unseated = project(&record, None);
        assert!(unseated.voice.channel.is_none());
    }
}
