//! The roll/turn state machine a `Match` embeds: the board plus whose
//! turn it is, the current roll, the moves applied so far this turn, and
//! winner detection.
//!
//! `turn == 0` is the pre-game opening phase: both players roll a single
//! die and the higher one takes the first turn, rerolling on a tie. Once
//! `turn` is 1 or 2, a normal turn is roll -> zero or more `move`
//! submissions -> `next_turn`.

use crate::board::Board;
use crate::error::RuleError;
use crate::moves::{self, Move};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub turn: u8,
    pub roll1: u8,
    pub roll2: u8,
    /// Moves applied so far this turn, in the absolute frame, expanded.
    /// Cleared by `next_turn` and by `reset`.
    pub moves: Vec<Move>,
    /// Winning player number, or 0 if the match is still in progress.
    pub winner: u8,

    /// Snapshot of the board as it stood when the current turn began.
    /// `reset` restores this rather than replaying inverse hops through
    /// the (forward-only) move validator, which has no legal notion of
    /// moving a checker backwards.
    turn_start_board: Board,

    /// Dice from this turn's roll not yet consumed by `moves`.
    remaining_dice: Vec<u8>,
}

impl GameState {
    pub fn new() -> Self {
        let board = Board::new();
        Self {
            board: board.clone(),
            turn: 0,
            roll1: 0,
            roll2: 0,
            moves: Vec::new(),
            winner: 0,
            turn_start_board: board,
            remaining_dice: Vec::new(),
        }
    }

    /// Whether `player_number` may roll right now.
    pub fn can_roll(&self, player_number: u8) -> bool {
        if self.winner != 0 {
            return false;
        }
        if self.turn == 0 {
            match player_number {
                1 => self.roll1 == 0,
                2 => self.roll2 == 0,
                _ => false,
            }
        } else {
            self.turn == player_number && self.roll1 == 0 && self.roll2 == 0
        }
    }

    /// Rolls dice for `player_number`. Returns `false` and leaves state
    /// unchanged if it is not this player's turn to roll.
    pub fn roll(&mut self, player_number: u8, rng: &mut impl Rng) -> bool {
        if !self.can_roll(player_number) {
            return false;
        }

        if self.turn == 0 {
            let die = rng.gen_range(1..=6);
            if player_number == 1 {
                self.roll1 = die;
            } else {
                self.roll2 = die;
            }

            if self.roll1 != 0 && self.roll2 != 0 {
                if self.roll1 > self.roll2 {
                    self.turn = 1;
                    self.remaining_dice = moves::dice_pool(self.roll1, self.roll2);
                } else if self.roll2 > self.roll1 {
                    self.turn = 2;
                    self.remaining_dice = moves::dice_pool(self.roll1, self.roll2);
                } else {
                    trace!(die = self.roll1, "opening roll tied, clearing for reroll");
                    self.roll1 = 0;
                    self.roll2 = 0;
                }
            }
            return true;
        }

        self.roll1 = rng.gen_range(1..=6);
        self.roll2 = rng.gen_range(1..=6);
        self.remaining_dice = moves::dice_pool(self.roll1, self.roll2);
        trace!(player = player_number, d1 = self.roll1, d2 = self.roll2, "rolled");
        true
    }

    /// Every legal single-hop move still available to the player on turn,
    /// given the current board and whichever dice this turn's proposed
    /// move list (if any) has not already consumed.
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.turn == 0 || self.winner != 0 {
            return Vec::new();
        }
        moves::legal_moves_with_dice(&self.board, self.turn, &self.remaining_dice)
    }

    /// Validates and applies `submitted` -- the complete move list for
    /// this turn so far -- starting from the board as it stood at the
    /// beginning of the turn. On success, `board` and `moves` reflect the
    /// new state, `remaining_dice` reflects what is left to play, and the
    /// expanded move list (with implicit hops filled in) is returned. On
    /// failure, nothing changes.
    pub fn add_moves(
        &mut self,
        player_number: u8,
        submitted: &[Move],
    ) -> Result<Vec<Move>, RuleError> {
        if self.winner != 0 {
            return Err(RuleError::GameOver);
        }
        if self.turn != player_number {
            return Err(RuleError::NotYourTurn);
        }

        let mut candidate = self.turn_start_board.clone();
        let (expanded, remaining) =
            moves::add_moves(&mut candidate, player_number, self.roll1, self.roll2, submitted)?;

        self.board = candidate;
        self.moves = expanded.clone();
        self.remaining_dice = remaining;
        self.winner = self.board.winner();
        Ok(expanded)
    }

    /// Restores the board to the state at the start of the current turn,
    /// discarding any moves submitted so far, and returns the moves that
    /// were undone (in application order) for the caller to report.
    pub fn reset(&mut self) -> Vec<Move> {
        let undone = std::mem::take(&mut self.moves);
        self.board = self.turn_start_board.clone();
        self.remaining_dice = moves::dice_pool(self.roll1, self.roll2);
        self.winner = self.board.winner();
        undone
    }

    /// Forces an arbitrary board/turn/roll position, recomputing the
    /// winner and remaining dice to match. Used by the server's debug
    /// `endgame` command and by tests that need a specific mid-match
    /// position without replaying a whole game.
    pub fn force_state(&mut self, board: Board, turn: u8, roll1: u8, roll2: u8) {
        self.turn_start_board = board.clone();
        self.board = board;
        self.turn = turn;
        self.roll1 = roll1;
        self.roll2 = roll2;
        self.moves.clear();
        self.remaining_dice = moves::dice_pool(roll1, roll2);
        self.winner = self.board.winner();
    }

    /// Commits the current turn's moves and advances to the next player,
    /// clearing the roll and move list for the new turn.
    pub fn next_turn(&mut self) {
        if self.turn == 0 {
            return;
        }
        self.turn = if self.turn == 1 { 2 } else { 1 };
        self.roll1 = 0;
        self.roll2 = 0;
        self.moves.clear();
        self.remaining_dice.clear();
        self.turn_start_board = self.board.clone();
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    // `StepRng` always returns the same word, so `gen_range(1..=6)` is
    // deterministic: useful for pinning down the opening-roll transitions
    // without depending on a real RNG.
    fn rng_fixed(word: u64) -> StepRng {
        StepRng::new(word, 0)
    }

    #[test]
    fn opening_roll_tie_clears_and_stays_pending() {
        let mut state = GameState::new();
        // Force both players to roll the same die by feeding identical words.
        let mut rng = rng_fixed(u64::MAX);
        assert!(state.roll(1, &mut rng));
        assert!(state.roll(2, &mut rng));
        assert_eq!(state.roll1, 0);
        assert_eq!(state.roll2, 0);
        assert_eq!(state.turn, 0);
        assert!(state.can_roll(1));
        assert!(state.can_roll(2));
    }

    #[test]
    fn add_moves_then_reset_round_trips() {
        let mut state = GameState::new();
        state.turn = 1;
        state.roll1 = 3;
        state.roll2 = 1;

        let before = state.board.clone();
        state
            .add_moves(1, &[Move::new(8, 5), Move::new(6, 5)])
            .unwrap();
        assert_ne!(state.board, before);

        let undone = state.reset();
        assert_eq!(undone.len(), 2);
        assert_eq!(state.board, before);
        assert!(state.moves.is_empty());
    }

    #[test]
    fn next_turn_clears_roll_and_moves() {
        let mut state = GameState::new();
        state.turn = 1;
        state.roll1 = 3;
        state.roll2 = 1;
        state.add_moves(1, &[Move::new(8, 5), Move::new(6, 5)]).unwrap();

        state.next_turn();
        assert_eq!(state.turn, 2);
        assert_eq!(state.roll1, 0);
        assert_eq!(state.roll2, 0);
        assert!(state.moves.is_empty());
        assert!(state.can_roll(2));
    }

    #[test]
    fn cannot_move_out_of_turn() {
        let mut state = GameState::new();
        state.turn = 1;
        state.roll1 = 3;
        state.roll2 = 1;
        let err = state.add_moves(2, &[Move::new(24, 21)]).unwrap_err();
        assert_eq!(err, RuleError::NotYourTurn);
    }
}
