//! Move legality, application, and the textual move grammar.
//!
//! All of the public entry points in this module (`legal_moves`,
//! `add_moves`, `format_moves`, `sort_moves`, `flip_moves`) work in the
//! absolute board frame; internally, legality is checked and applied in the
//! *acting player's own* view (see [`crate::board::View`]), which is where
//! "forward" always means "towards home" regardless of which player is
//! moving.

use crate::board::{self, Board, BAR, OFF, POINTS};
use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single checker hop, always expressed in the absolute board frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: i32,
    pub to: i32,
}

impl Move {
    pub fn new(from: i32, to: i32) -> Self {
        Self { from, to }
    }

    /// The move that would undo this one.
    pub fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", space_name(self.from), space_name(self.to))
    }
}

fn space_name(space: i32) -> String {
    if space == BAR {
        "bar".to_string()
    } else if space == OFF {
        "off".to_string()
    } else {
        space.to_string()
    }
}

/// Flips every move in `moves` between the absolute frame and
/// `player_number`'s own perspective, in place.
pub fn flip_moves(moves: &mut [Move], player_number: u8) {
    for m in moves.iter_mut() {
        m.from = board::flip_space(m.from, player_number);
        m.to = board::flip_space(m.to, player_number);
    }
}

/// Sorts moves by descending origin point, the conventional display order
/// (e.g. `24/18 13/11` rather than `13/11 24/18`).
pub fn sort_moves(moves: &mut [Move]) {
    moves.sort_by(|a, b| b.from.cmp(&a.from));
}

/// Formats a move list the way it is echoed back to clients, e.g.
/// `"24/18 13/11"`.
pub fn format_moves(moves: &[Move]) -> String {
    moves
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The dice available to a turn, expanded so doubles count as four uses of
/// the same value.
pub fn dice_pool(roll1: u8, roll2: u8) -> Vec<u8> {
    if roll1 == 0 || roll2 == 0 {
        return Vec::new();
    }
    if roll1 == roll2 {
        vec![roll1; 4]
    } else {
        vec![roll1, roll2]
    }
}

/// Determines the single-die destination of a hop from `from`, in the
/// acting player's own view, or `None` if there is no die in `dice` that
/// makes it legal.
fn resolve_hop(view: &board::View, from: i32, dice: &[u8]) -> Option<(i32, u8)> {
    for &die in dice {
        let die = die as i32;

        if from == BAR {
            if view.my_bar == 0 {
                continue;
            }
            let to = BAR - die;
            if view.opp_at(to) < 2 {
                return Some((to, die as u8));
            }
            continue;
        }

        if view.my_bar > 0 {
            // Checkers on the bar must re-enter before anything else moves.
            continue;
        }

        let raw_to = from - die;
        if raw_to > 0 {
            if view.opp_at(raw_to) < 2 {
                return Some((raw_to, die as u8));
            }
            continue;
        }

        // Bearing off: only legal once every checker is in the home board.
        if !view.all_home() {
            continue;
        }
        if raw_to == 0 {
            return Some((OFF, die as u8));
        }
        // Overshooting die: only legal from the farthest occupied point.
        if from == view.farthest() {
            return Some((OFF, die as u8));
        }
    }
    None
}

/// Enumerates every legal single-hop move available to `player_number` given
/// the current board and remaining dice.
pub fn legal_moves(board: &Board, player_number: u8, roll1: u8, roll2: u8) -> Vec<Move> {
    legal_moves_with_dice(board, player_number, &dice_pool(roll1, roll2))
}

/// As [`legal_moves`], but takes the dice pool directly rather than a
/// `roll1`/`roll2` pair -- used to report what is still playable partway
/// through a turn, after some dice have already been consumed.
pub fn legal_moves_with_dice(board: &Board, player_number: u8, dice: &[u8]) -> Vec<Move> {
    if dice.is_empty() {
        return Vec::new();
    }
    let view = board.view(player_number);
    let mut unique_dice: Vec<u8> = dice.to_vec();
    unique_dice.sort_unstable();
    unique_dice.dedup();

    let mut out = Vec::new();
    if view.my_bar > 0 {
        if let Some((to, _die)) = resolve_hop(&view, BAR, &unique_dice) {
            out.push(to_absolute(BAR, to, player_number));
        }
        // Multiple dice may each open a distinct entry point.
        for &die in &unique_dice {
            let to = BAR - die as i32;
            if view.opp_at(to) < 2 {
                let mv = to_absolute(BAR, to, player_number);
                if !out.contains(&mv) {
                    out.push(mv);
                }
            }
        }
        return out;
    }

    for from in view.occupied_points() {
        for &die in &unique_dice {
            if let Some((to, _die)) = resolve_hop(&view, from, &[die]) {
                let mv = to_absolute(from, to, player_number);
                if !out.contains(&mv) {
                    out.push(mv);
                }
            }
        }
    }
    out
}

fn to_absolute(from: i32, to: i32, player_number: u8) -> Move {
    Move::new(
        board::flip_space(from, player_number),
        board::flip_space(to, player_number),
    )
}

/// Validates and applies a whole sequence of moves submitted in one `move`
/// command, consuming dice as it goes and expanding implicit hops (e.g. a
/// submitted `24/18` on a double-3 turn expands into the two underlying
/// single-die hops `24/21` and `21/18`).
///
/// On success, returns the expanded move list (still in the absolute
/// frame) together with whichever dice from the roll were not consumed,
/// and leaves `board` updated. On failure, `board` is left unchanged.
pub fn add_moves(
    board: &mut Board,
    player_number: u8,
    roll1: u8,
    roll2: u8,
    submitted: &[Move],
) -> Result<(Vec<Move>, Vec<u8>), RuleError> {
    if board.winner() != 0 {
        return Err(RuleError::GameOver);
    }

    let mut dice = dice_pool(roll1, roll2);
    if dice.is_empty() {
        return Err(RuleError::NoDiceAvailable);
    }

    let mut view = board.view(player_number);
    let mut expanded = Vec::new();

    for mv in submitted {
        let from = board::flip_space(mv.from, player_number);
        let to = board::flip_space(mv.to, player_number);

        let hops = expand_hop(&view, from, to, &dice)?;
        for (hop_from, hop_to, die) in hops {
            apply_hop(&mut view, hop_from, hop_to);
            expanded.push(to_absolute(hop_from, hop_to, player_number));
            let pos = dice
                .iter()
                .position(|&d| d == die)
                .ok_or(RuleError::IllegalMove)?;
            dice.remove(pos);
        }
    }

    *board = Board::from_view(&view, player_number);
    Ok((expanded, dice))
}

/// Expands a single submitted `from/to` pair into the underlying sequence
/// of single-die hops, without mutating `view`. Fails if no combination of
/// the remaining dice connects `from` to `to` legally.
fn expand_hop(
    view: &board::View,
    from: i32,
    to: i32,
    dice: &[u8],
) -> Result<Vec<(i32, i32, u8)>, RuleError> {
    // Direct single-die hop.
    if let Some((resolved_to, die)) = resolve_hop(view, from, dice) {
        if resolved_to == to {
            return Ok(vec![(from, to, die)]);
        }
    }

    // Otherwise, try every available die as the first hop and recurse
    // through a scratch view to see if the remainder reaches `to`.
    let mut tried = Vec::new();
    for &die in dice {
        if tried.contains(&die) {
            continue;
        }
        tried.push(die);

        if let Some((mid, used)) = resolve_hop(view, from, &[die]) {
            if mid == OFF {
                continue;
            }
            let mut scratch = view.clone();
            apply_hop(&mut scratch, from, mid);
            let mut remaining = dice.to_vec();
            let pos = remaining.iter().position(|&d| d == used).unwrap();
            remaining.remove(pos);

            if let Ok(mut rest) = expand_hop(&scratch, mid, to, &remaining) {
                let mut hops = vec![(from, mid, used)];
                hops.append(&mut rest);
                return Ok(hops);
            }
        }
    }

    Err(RuleError::IllegalMove)
}

fn apply_hop(view: &mut board::View, from: i32, to: i32) {
    if from == BAR {
        view.my_bar -= 1;
    } else {
        view.take_mine(from);
    }

    if to == OFF {
        view.my_off += 1;
    } else {
        if view.opp_at(to) > 0 {
            // A single enemy checker on an open point is hit and sent to
            // the bar.
            view.hit(to);
        }
        view.place_mine(to);
    }
}
