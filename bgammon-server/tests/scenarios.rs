//! End-to-end scenario tests driving the dispatcher and an in-process
//! registry directly -- no real sockets, no listeners. Each test plays out
//! one of the literal scenario seeds from the design document.

use bgammon_server::client::ClientSession;
use bgammon_server::dispatcher::dispatch_command;
use bgammon_server::game::Match;
use bgammon_server::registry::Registry;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::mpsc;

async fn login(registry: &Arc<Registry>, name: Option<&str>) -> (Arc<ClientSession>, mpsc::Receiver<String>) {
    let id = registry.next_client_id().await;
    let session = Arc::new(ClientSession::new(id));
    registry.add_client(session.clone()).await;
    let events = session.take_events_receiver();

    let command = match name {
        Some(name) => format!("login {name}"),
        None => "login".to_string(),
    };
    dispatch_command(registry, &session, &command).await;
    (session, events)
}

async fn next_line(events: &mut mpsc::Receiver<String>) -> String {
    events.recv().await.expect("expected a queued event")
}

#[tokio::test]
async fn s1_guest_login_gets_a_welcome() {
    let registry = Arc::new(Registry::new());
    let (_session, mut events) = login(&registry, None).await;

    let welcome = next_line(&mut events).await;
    assert!(welcome.starts_with("welcome Guest"), "unexpected welcome line: {welcome}");
    assert!(welcome.ends_with("clients=1 games=0"), "unexpected welcome line: {welcome}");

    let n: u32 = welcome
        .trim_start_matches("welcome Guest")
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap();
    assert!((100..=999).contains(&n), "guest number {n} outside 100-999");
}

#[tokio::test]
async fn s2_create_and_join_public() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;

    dispatch_command(&registry, &alice, "create public Friendly").await;
    assert_eq!(next_line(&mut alice_events).await, "joined alice 1 -");
    let _board = next_line(&mut alice_events).await;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;

    dispatch_command(&registry, &bob, "list").await;
    let list = next_line(&mut bob_events).await;
    assert!(list.contains("/0/1/Friendly"), "list line missing expected game: {list}");

    let match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    dispatch_command(&registry, &bob, &format!("join {match_id}")).await;

    assert_eq!(next_line(&mut bob_events).await, "joined bob 2 alice");
    let _bob_board = next_line(&mut bob_events).await;
    assert_eq!(next_line(&mut alice_events).await, "joined bob 2 alice");
    let _alice_board = next_line(&mut alice_events).await;

    assert_eq!(registry.game_count().await, 1);
}

#[tokio::test]
async fn s2_private_match_rejects_wrong_password() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;
    dispatch_command(&registry, &alice, "create private hunter2").await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;
    let match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;

    dispatch_command(&registry, &bob, &format!("join {match_id} wrongpass")).await;
    assert_eq!(next_line(&mut bob_events).await, "failedjoin Invalid password.");

    dispatch_command(&registry, &bob, &format!("join {match_id} hunter2")).await;
    assert_eq!(next_line(&mut bob_events).await, "joined bob 2 alice");
}

/// Rolls both seats until the opening roll resolves (retrying through ties),
/// asserting `turn` ends up pointing at whichever seat rolled higher.
#[tokio::test]
async fn s3_opening_roll_resolves_to_higher_roller() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;
    dispatch_command(&registry, &alice, "create public").await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;
    let match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    dispatch_command(&registry, &bob, &format!("join {match_id}")).await;
    let _joined = next_line(&mut bob_events).await;
    let _board = next_line(&mut bob_events).await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let game = registry.game_by_client(alice.id).await.unwrap();

    // Every successful `roll` broadcasts a Rolled + Board pair to both seats,
    // win or lose the opening tie -- drain both queues each call so the
    // bounded events channel never backs up across the retry loop.
    for _ in 0..50 {
        dispatch_command(&registry, &alice, "roll").await;
        let _ = next_line(&mut alice_events).await;
        let _ = next_line(&mut alice_events).await;
        let _ = next_line(&mut bob_events).await;
        let _ = next_line(&mut bob_events).await;

        dispatch_command(&registry, &bob, "roll").await;
        let _ = next_line(&mut alice_events).await;
        let _ = next_line(&mut alice_events).await;
        let _ = next_line(&mut bob_events).await;
        let _ = next_line(&mut bob_events).await;

        let turn = game.lock().await.state.turn;
        if turn != 0 {
            let (roll1, roll2) = {
                let g = game.lock().await;
                (g.state.roll1, g.state.roll2)
            };
            if roll1 > roll2 {
                assert_eq!(turn, 1);
            } else {
                assert_eq!(turn, 2);
            }
            return;
        }
    }
    panic!("opening roll never resolved after 50 tie retries");
}

#[tokio::test]
async fn s4_illegal_move_is_rejected_and_board_unchanged() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;
    dispatch_command(&registry, &alice, "create public").await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;
    let match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    dispatch_command(&registry, &bob, &format!("join {match_id}")).await;
    let _joined = next_line(&mut bob_events).await;
    let _board = next_line(&mut bob_events).await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let game = registry.game_by_client(alice.id).await.unwrap();
    {
        let mut g = game.lock().await;
        let board = g.state.board.clone();
        g.state.force_state(board, 1, 3, 5);
    }

    let before = game.lock().await.state.board.clone();
    dispatch_command(&registry, &alice, "move 24/20").await;
    let failure = next_line(&mut alice_events).await;
    assert_eq!(failure, "failedmove Illegal move.");

    let after = game.lock().await.state.board.clone();
    assert_eq!(before, after);
}

#[tokio::test]
async fn s5_reset_round_trips_to_pre_move_board() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;
    dispatch_command(&registry, &alice, "create public").await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;
    let match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    dispatch_command(&registry, &bob, &format!("join {match_id}")).await;
    let _joined = next_line(&mut bob_events).await;
    let _board = next_line(&mut bob_events).await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let game = registry.game_by_client(alice.id).await.unwrap();
    {
        let mut g = game.lock().await;
        let board = g.state.board.clone();
        g.state.force_state(board, 1, 3, 1);
    }
    let before = game.lock().await.state.board.clone();

    dispatch_command(&registry, &alice, "move 8/5 6/5").await;
    let _moved_to_alice = next_line(&mut alice_events).await;
    let _board_to_alice = next_line(&mut alice_events).await;
    let _moved_to_bob = next_line(&mut bob_events).await;
    let _board_to_bob = next_line(&mut bob_events).await;
    assert_ne!(game.lock().await.state.board, before);

    dispatch_command(&registry, &alice, "reset").await;
    let _moved_to_alice = next_line(&mut alice_events).await;
    let _board_to_alice = next_line(&mut alice_events).await;
    let _moved_to_bob = next_line(&mut bob_events).await;
    let _board_to_bob = next_line(&mut bob_events).await;

    assert_eq!(game.lock().await.state.board, before);
}

#[tokio::test]
async fn s6_rematch_handshake_allocates_a_fresh_match() {
    let registry = Arc::new(Registry::new());

    let (alice, mut alice_events) = login(&registry, Some("alice")).await;
    let _welcome = next_line(&mut alice_events).await;
    dispatch_command(&registry, &alice, "create public").await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    let (bob, mut bob_events) = login(&registry, Some("bob")).await;
    let _welcome = next_line(&mut bob_events).await;
    let old_match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    dispatch_command(&registry, &bob, &format!("join {old_match_id}")).await;
    let _joined = next_line(&mut bob_events).await;
    let _board = next_line(&mut bob_events).await;
    let _joined = next_line(&mut alice_events).await;
    let _board = next_line(&mut alice_events).await;

    // Force alice one bear-off away from winning, then let her finish it.
    dispatch_command(&registry, &alice, "endgame").await;
    let _board_to_alice = next_line(&mut alice_events).await;
    let _board_to_bob = next_line(&mut bob_events).await;

    dispatch_command(&registry, &alice, "move 6/off").await;
    let _moved_to_alice = next_line(&mut alice_events).await;
    let _board_to_alice = next_line(&mut alice_events).await;
    let _moved_to_bob = next_line(&mut bob_events).await;
    let _board_to_bob = next_line(&mut bob_events).await;
    assert_eq!(next_line(&mut alice_events).await, "win alice");
    assert_eq!(next_line(&mut bob_events).await, "win alice");

    dispatch_command(&registry, &alice, "rematch").await;
    let notice = next_line(&mut alice_events).await;
    assert!(notice.starts_with("notice"));
    let notice = next_line(&mut bob_events).await;
    assert!(notice.starts_with("notice"));

    dispatch_command(&registry, &bob, "rematch").await;

    let new_match_id = registry.game_by_client(alice.id).await.unwrap().lock().await.id.0;
    assert_ne!(new_match_id, old_match_id);

    let old_game = registry.game_by_id(bgammon_server::ids::MatchId(old_match_id)).await.unwrap();
    let old_game = old_game.lock().await;
    assert!(old_game.client1.is_none());
    assert!(old_game.client2.is_none());
    assert!(old_game.terminated);
}

/// Invariant 2 (spec.md / SPEC_FULL.md §8): no command other than the login
/// variants is acted upon while `account == -1`, and any such attempt
/// terminates the session.
#[tokio::test]
async fn pre_login_command_other_than_login_terminates_the_session() {
    let registry = Arc::new(Registry::new());
    let id = registry.next_client_id().await;
    let session = Arc::new(ClientSession::new(id));
    registry.add_client(session.clone()).await;

    assert_eq!(session.account(), -1);
    assert!(!session.terminated());

    dispatch_command(&registry, &session, "list").await;

    assert!(session.terminated());
    assert_eq!(
        session.terminate_reason().as_deref(),
        Some("You must login before using other commands.")
    );
}

/// Invariant 6 (spec.md / SPEC_FULL.md §8): a terminated match is eventually
/// removed from `games` within one reaper interval, and its id is never
/// reused. Drives `Registry::reap` directly rather than waiting out the
/// real one-minute interval `run_reaper` ticks on.
#[tokio::test]
async fn terminated_match_is_reaped_and_its_id_never_reused() {
    let registry = Arc::new(Registry::new());

    let id = registry.next_match_id().await;
    let mut game = Match::new(id, "doomed".to_string(), String::new());
    let (alice, _alice_events) = login(&registry, Some("alice")).await;
    game.add_client(alice.clone()).unwrap();
    let shared = registry.add_game(game).await;

    assert_eq!(registry.game_count().await, 1);

    shared.lock().await.remove_client(alice.id);
    assert!(shared.lock().await.terminated);

    registry.reap().await;

    assert!(registry.game_by_id(id).await.is_none());
    assert_eq!(registry.game_count().await, 0);

    let next_id = registry.next_match_id().await;
    assert_ne!(next_id, id, "a reaped match's id must never be reused");
    assert!(next_id.0 > id.0);
}

/// Invariant 8 (spec.md / SPEC_FULL.md §8): concurrent logins racing for the
/// same name result in exactly one success. `try_claim_name` holds the
/// clients-list lock across the check-then-set, so driving two claims for
/// the same candidate through `tokio::join!` must settle on a single winner
/// regardless of scheduling order.
#[tokio::test]
async fn concurrent_logins_for_the_same_name_yield_exactly_one_winner() {
    let registry = Arc::new(Registry::new());

    let a = registry.next_client_id().await;
    let session_a = Arc::new(ClientSession::new(a));
    registry.add_client(session_a.clone()).await;

    let b = registry.next_client_id().await;
    let session_b = Arc::new(ClientSession::new(b));
    registry.add_client(session_b.clone()).await;

    let (claimed_a, claimed_b) = tokio::join!(
        registry.try_claim_name(a, "samename"),
        registry.try_claim_name(b, "samename")
    );

    assert_ne!(claimed_a, claimed_b, "exactly one of the two racing claims should succeed");
    assert_eq!(claimed_a as u8 + claimed_b as u8, 1);
}
