//! Concurrency and delivery properties: duplicate races, reconnect
//! backlog equivalence, per-session serialization.


use std::sync::Arc;

use futures::future::join_all;
use test_helpers::*;
use tokio::sync::Barrier;

use wolfden_server::game::error::{ActionError, EngineError};
use wolfden_server::game::roles::Role;
use wolfden_server::protocol::messages::ServerEvent;
use wolfden_server::protocol::{ActionKind, Phase, UserId};

const BASIC: [Role; 6] = [
    Role::Werewolf,
    Role::Werewolf,
    Role::Seer,
    Role::Villager,
    Role::Villager,
    Role::Villager,
];

/// Two simultaneous submissions of the same (phase, actor, type): exactly
/// one succeeds, the other surfaces as `duplicate`.
#[tokio::test]
async fn test_simultaneous_duplicate_submissions_race() {
    let server = test_server();
    let seats = roster(6);
    let users: Vec<UserId> = seats.iter().map(|r| r.user_id).collect();
    let (session_id, _) = server
        .start_session(seats, Some(slow_config(BASIC.to_vec(), 31)))
        .await
        .unwrap();

    server.advance_session(&session_id).await.unwrap(); // night_0
    server.advance_session(&session_id).await.unwrap(); // werewolf_phase

    let wolf = user_with_role(&server, &session_id, &users, Role::Werewolf).await;
    let villager = user_with_role(&server, &session_id, &users, Role::Villager).await;
    let target = player_of(&server, &session_id, &villager).await;

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let server = server.clone();
        let barrier = barrier.clone();
        let session = session_id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            server
                .submit_action(&session, &wolf, act(ActionKind::WerewolfVote, Some(target)))
                .await
        }));
    }

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|h| h.expect("task must not panic"))
        .collect();

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let duplicates = outcomes
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(EngineError::Action(ActionError::Duplicate)) | Err(EngineError::Conflict(_))
            )
        })
        .count();
    assert_eq!(successes, 1, "exactly one submission wins the race");
    assert_eq!(duplicates, 1, "the loser sees duplicate");
}

/// A reconnecting client replays the backlog after its last applied
/// sequence: the union of what it saw live and what replay delivered is
/// gapless, and the fresh projection matches a direct `get_state`.
#[tokio::test]
async fn test_reconnect_backlog_is_gapless() {
    let server = test_server();
    let seats = roster(6);
    let users: Vec<UserId> = seats.iter().map(|r| r.user_id).collect();
    let (session_id, _) = server
        .start_session(seats, Some(slow_config(BASIC.to_vec(), 32)))
        .await
        .unwrap();

    let watcher = users[0];
    let mut live = server.subscribe(&session_id, &watcher, None).await.unwrap();

    // Progress into the first day while connected
    server.advance_session(&session_id).await.unwrap(); // night_0
    server.advance_session(&session_id).await.unwrap(); // werewolf_phase
    server.advance_session(&session_id).await.unwrap(); // seer_phase
    server.advance_session(&session_id).await.unwrap(); // day_discussion
    tokio::task::yield_now().await;

    let mut seen = Vec::new();
    for event in drain_events(&mut live) {
        if let ServerEvent::Event(envelope) = event {
            seen.push(envelope.sequence);
        }
    }
    assert!(!seen.is_empty(), "live subscriber saw the night unfold");
    let last_seen = *seen.last().unwrap();
    drop(live);

    // More happens while disconnected
    server.advance_session(&session_id).await.unwrap(); // day_voting
    server.advance_session(&session_id).await.unwrap(); // next night

    // Reconnect with the last applied sequence
    let mut reconnected = server
        .subscribe(&session_id, &watcher, Some(last_seen))
        .await
        .unwrap();
    let replay = drain_events(&mut reconnected);

    let state = match replay.first() {
        Some(ServerEvent::State(projection)) => (**projection).clone(),
        other => panic!("replay must start with state, got {other:?}"),
    };
    let direct = server.get_state(&session_id, &watcher).await.unwrap();
    assert_eq!(state.phase, direct.phase);
    assert_eq!(state.phase_number, direct.phase_number);

    let mut replayed = Vec::new();
    for event in &replay {
        if let ServerEvent::Event(envelope) = event {
            replayed.push(envelope.sequence);
        }
    }
    assert!(
        replayed.iter().all(|seq| *seq > last_seen),
        "replay never repeats acknowledged events"
    );

    let mut all: Vec<u64> = seen.into_iter().chain(replayed).collect();
    all.sort_unstable();
    all.dedup();
    let (first, last) = (all[0], *all.last().unwrap());
    assert_eq!(
        all.len() as u64,
        last - first + 1,
        "no gaps across disconnect"
    );
}

/// Many clients hammering different actions in one phase: the per-session
/// lock serializes them; every outcome is a clean accept or a typed
/// rejection, never a broken invariant.
#[tokio::test]
async fn test_parallel_lynch_votes_all_serialize() {
    let server = test_server();
    let seats = roster(6);
    let users: Vec<UserId> = seats.iter().map(|r| r.user_id).collect();
    let (session_id, _) = server
        .start_session(seats, Some(slow_config(BASIC.to_vec(), 33)))
        .await
        .unwrap();

    server.advance_session(&session_id).await.unwrap(); // night_0
    server.advance_session(&session_id).await.unwrap(); // werewolf_phase
    server.advance_session(&session_id).await.unwrap(); // seer_phase
    server.advance_session(&session_id).await.unwrap(); // day_discussion
    server.advance_session(&session_id).await.unwrap(); // day_voting

    let target = player_of(&server, &session_id, &users[0]).await;
    let barrier = Arc::new(Barrier::new(users.len()));
    let mut handles = Vec::new();
    for user in users.clone() {
        let server = server.clone();
        let barrier = barrier.clone();
        let session = session_id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            server
                .submit_action(&session, &user, act(ActionKind::VoteLynch, Some(target)))
                .await
        }));
    }
    let outcomes = join_all(handles).await;
    for outcome in outcomes {
        outcome.expect("task must not panic").expect("vote accepted");
    }

    // Unanimous vote: resolution lynches the target
    server.advance_session(&session_id).await.unwrap();
    let projection = server.get_state(&session_id, &users[1]).await.unwrap();
    let seat = projection
        .players
        .iter()
        .find(|p| p.player_id == target)
        .unwrap();
    assert!(!seat.is_alive);
    assert_eq!(
        projection.werewolves_alive + projection.villagers_alive,
        projection.players.iter().filter(|p| p.is_alive).count() as u32,
        "alive counts stay conserved under concurrent writes"
    );
}

/// A session advancing under its own timer can be observed concurrently
/// by readers without tearing: every projection is internally consistent.
#[tokio::test]
async fn test_projection_reads_never_tear() {
    let server = timer_server();
    let seats = roster(6);
    let users: Vec<UserId> = seats.iter().map(|r| r.user_id).collect();
    let mut config = slow_config(BASIC.to_vec(), 34);
    config.durations.starting_ms = 20;
    config.durations.night_0_ms = 20;
    config.durations.werewolf_ms = 20;
    config.durations.seer_ms = 20;
    config.durations.discussion_ms = 20;
    config.durations.voting_ms = 20;
    let (session_id, _) = server.start_session(seats, Some(config)).await.unwrap();

    // Read projections continuously while the timer drives phases
    for _ in 0..50 {
        let projection = server.get_state(&session_id, &users[0]).await.unwrap();
        let alive = projection.players.iter().filter(|p| p.is_alive).count() as u32;
        assert_eq!(
            projection.werewolves_alive + projection.villagers_alive,
            alive,
            "snapshot reads are consistent during {}",
            projection.phase
        );
        if projection.phase == Phase::GameOver {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
