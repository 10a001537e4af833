//! Integration tests driving `GameState` through whole turns, the way a
//! match would be played end to end, rather than exercising individual
//! board/move primitives in isolation.

use bgammon_rules::{board::Board, match_state::GameState, Move, POINTS};
use pretty_assertions::assert_eq;
use rand::rngs::mock::StepRng;

fn rng(word: u64) -> StepRng {
    StepRng::new(word, 1)
}

#[test]
fn opening_roll_assigns_turn_to_higher_roller() {
    let mut state = GameState::new();
    // A non-zero increment advances `StepRng` on every call, so the two
    // players' single-die opening rolls land on different faces.
    let mut rng = rng(1);
    assert!(state.roll(1, &mut rng));
    assert!(state.roll(2, &mut rng));

    assert_ne!(state.turn, 0, "opening roll should resolve to a starting player");
    if state.roll1 > state.roll2 {
        assert_eq!(state.turn, 1);
    } else {
        assert_eq!(state.turn, 2);
    }
    // Whoever won the opening roll plays it directly; there is no
    // separate roll step before their first move.
    assert!(!state.can_roll(state.turn));
}

#[test]
fn a_full_turn_cycle_advances_play() {
    let mut state = GameState::new();
    state.force_state(Board::new(), 1, 6, 2);

    let expanded = state
        .add_moves(1, &[Move::new(24, 18), Move::new(13, 11)])
        .expect("standard opening move should be legal");
    assert_eq!(expanded.len(), 2);
    assert!(state.legal_moves().is_empty(), "both dice should be spent");

    state.next_turn();
    assert_eq!(state.turn, 2);
    assert_eq!(state.roll1, 0);
    assert_eq!(state.roll2, 0);
    assert!(state.can_roll(2));
    assert!(!state.can_roll(1));
}

#[test]
fn partial_turn_reports_only_the_remaining_die_as_legal() {
    let mut state = GameState::new();
    state.force_state(Board::new(), 1, 6, 2);

    state.add_moves(1, &[Move::new(24, 18)]).unwrap();
    let remaining = state.legal_moves();
    assert!(!remaining.is_empty(), "the unplayed 2 should still be usable");

    // Submitting the full two-move list replaces the partial one from
    // scratch, so both original-board moves are still available.
    state.add_moves(1, &[Move::new(24, 18), Move::new(13, 11)]).unwrap();
    assert!(state.legal_moves().is_empty());
}

#[test]
fn winner_is_detected_once_all_checkers_are_borne_off() {
    let mut state = GameState::new();

    // Hand-build a near-finished board: fourteen of player 1's checkers
    // already off, one left on the 6 point.
    let mut board = Board::new();
    board.points = [0; POINTS];
    board.points[5] = 1;
    board.off1 = 14;
    board.points[0] = -2;
    board.off2 = 13;
    state.force_state(board, 1, 6, 6);

    state.add_moves(1, &[Move::new(6, 0)]).expect("bear off should succeed");
    assert_eq!(state.winner, 1);

    // No further moves are accepted once the match has a winner.
    assert!(state.add_moves(1, &[Move::new(6, 0)]).is_err());
}
