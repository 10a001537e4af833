//! Board representation and the player-perspective flip.
//!
//! Points are numbered 1-24 in an absolute frame fixed to the board itself.
//! `Board::points[i]` holds the checker count on absolute point `i + 1`;
//! positive counts belong to player 1, negative counts to player 2. Two
//! sentinel space values round out the coordinate space: `BAR` (25) names
//! the virtual point a checker re-enters from, `OFF` (0) names the virtual
//! point a checker bears off to. Both are already frame-agnostic, so
//! [`flip_space`] leaves them unchanged.

use crate::error::RuleError;
use serde::{Deserialize, Serialize};

/// Number of playable points on the board.
pub const POINTS: usize = 24;

/// Sentinel space representing the bar (a checker waiting to re-enter).
pub const BAR: i32 = 25;

/// Sentinel space representing a checker that has been borne off.
pub const OFF: i32 = 0;

/// Checkers each player starts with.
pub const CHECKERS_PER_PLAYER: u8 = 15;

/// Parses a space token as typed by a client, in that client's own
/// perspective. Returns `-1` if the token is not a recognized space.
pub fn parse_space(token: &str) -> i32 {
    let token = token.trim();
    if token.eq_ignore_ascii_case("bar") {
        return BAR;
    }
    if token.eq_ignore_ascii_case("off") {
        return OFF;
    }
    match token.parse::<i32>() {
        Ok(n) if (1..=24).contains(&n) => n,
        _ => -1,
    }
}

/// Reports whether `space` is a value `parse_space` could have produced.
pub fn valid_space(space: i32) -> bool {
    (OFF..=BAR).contains(&space)
}

/// Flips a space between the absolute board frame and a player's own
/// perspective. Player 1's own perspective is the absolute frame itself;
/// player 2's perspective mirrors it (`n -> 25 - n`). The bar and off
/// sentinels map to themselves either way. This function is its own
/// inverse, so the same call converts in both directions.
pub fn flip_space(space: i32, player_number: u8) -> i32 {
    if player_number == 1 || space == BAR || space == OFF {
        return space;
    }
    25 - space
}

/// The side a player's checkers are rendered as. Cosmetic only -- it has no
/// effect on move legality, which is entirely determined by player number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checker {
    Light,
    Dark,
}

/// A player's identity within a match, mirroring the rules engine's own
/// bookkeeping so the server can persist it across a disconnect/rejoin or a
/// rematch without re-deriving it from the client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub side: Checker,
}

impl Player {
    pub fn new(name: impl Into<String>, player_number: u8) -> Self {
        Self {
            name: name.into(),
            side: if player_number == 1 {
                Checker::Light
            } else {
                Checker::Dark
            },
        }
    }
}

/// Absolute board state: checker counts per point, the bar, and borne-off
/// checkers for both players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// `points[i]` is absolute point `i + 1`. Positive = player 1 checkers,
    /// negative = player 2 checkers.
    pub points: [i8; POINTS],
    pub bar1: u8,
    pub bar2: u8,
    pub off1: u8,
    pub off2: u8,
}

impl Board {
    /// The standard starting position.
    pub fn new() -> Self {
        let mut points = [0i8; POINTS];
        points[23] = 2; // player 1: point 24
        points[12] = 5; // player 1: point 13
        points[7] = 3; // player 1: point 8
        points[5] = 5; // player 1: point 6
        points[0] = -2; // player 2: point 1
        points[11] = -5; // player 2: point 12
        points[16] = -3; // player 2: point 17
        points[18] = -5; // player 2: point 19

        Self {
            points,
            bar1: 0,
            bar2: 0,
            off1: 0,
            off2: 0,
        }
    }

    /// Returns the winning player number, if either player has borne off
    /// all fifteen checkers.
    pub fn winner(&self) -> u8 {
        if self.off1 == CHECKERS_PER_PLAYER {
            1
        } else if self.off2 == CHECKERS_PER_PLAYER {
            2
        } else {
            0
        }
    }

    /// Builds this player's view of the board: their own checkers indexed
    /// by their own point numbering (24 furthest from home, 1 nearest),
    /// the opponent's checkers in that same numbering, and both bars/offs.
    pub(crate) fn view(&self, player_number: u8) -> View {
        let mut view = View::default();
        for n in 1..=POINTS as i32 {
            let abs = if player_number == 1 { n } else { 25 - n };
            let count = self.points[(abs - 1) as usize];
            if player_number == 1 {
                view.set(n, count.max(0) as u8, (-count).max(0) as u8);
            } else {
                view.set(n, (-count).max(0) as u8, count.max(0) as u8);
            }
        }
        if player_number == 1 {
            view.my_bar = self.bar1;
            view.opp_bar = self.bar2;
            view.my_off = self.off1;
            view.opp_off = self.off2;
        } else {
            view.my_bar = self.bar2;
            view.opp_bar = self.bar1;
            view.my_off = self.off2;
            view.opp_off = self.off1;
        }
        view
    }

    /// A player's own checker counts, indexed 1-24 in that player's own
    /// numbering (24 furthest from home). Positive entries are a count of
    /// the player's own checkers on that point; the opponent's checkers are
    /// not represented here. Used by callers (the server's board snapshot
    /// event) that need a perspective-flipped view without reaching into
    /// the crate-private [`View`] type.
    pub fn player_points(&self, player_number: u8) -> [u8; POINTS] {
        let view = self.view(player_number);
        let mut out = [0u8; POINTS];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = view.mine_at(i as i32 + 1);
        }
        out
    }

    /// The opponent's checker counts from `player_number`'s perspective,
    /// indexed the same way as [`Board::player_points`].
    pub fn opponent_points(&self, player_number: u8) -> [u8; POINTS] {
        let view = self.view(player_number);
        let mut out = [0u8; POINTS];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = view.opp_at(i as i32 + 1);
        }
        out
    }

    /// `(own, opponent's)` checkers on the bar, from `player_number`'s
    /// perspective.
    pub fn player_bar(&self, player_number: u8) -> (u8, u8) {
        let view = self.view(player_number);
        (view.my_bar, view.opp_bar)
    }

    /// `(own, opponent's)` checkers borne off, from `player_number`'s
    /// perspective.
    pub fn player_off(&self, player_number: u8) -> (u8, u8) {
        let view = self.view(player_number);
        (view.my_off, view.opp_off)
    }

    /// Rebuilds the absolute board from a player's view. Inverse of `view`.
    pub(crate) fn from_view(view: &View, player_number: u8) -> Self {
        let mut points = [0i8; POINTS];
        for n in 1..=POINTS as i32 {
            let abs = if player_number == 1 { n } else { 25 - n };
            let (mine, opp) = view.get(n);
            let value = if player_number == 1 {
                mine as i8 - opp as i8
            } else {
                opp as i8 - mine as i8
            };
            points[(abs - 1) as usize] = value;
        }
        let (bar1, bar2, off1, off2) = if player_number == 1 {
            (view.my_bar, view.opp_bar, view.my_off, view.opp_off)
        } else {
            (view.opp_bar, view.my_bar, view.opp_off, view.my_off)
        };
        Self {
            points,
            bar1,
            bar2,
            off1,
            off2,
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// A single player's perspective on the board: their own checkers and the
/// opponent's, both indexed by the player's own point numbering (1-24,
/// home is 1-6, bar is the virtual 25th point).
#[derive(Debug, Clone, Default)]
pub(crate) struct View {
    my_points: [u8; POINTS],
    opp_points: [u8; POINTS],
    pub my_bar: u8,
    pub opp_bar: u8,
    pub my_off: u8,
    pub opp_off: u8,
}

impl View {
    fn set(&mut self, point: i32, mine: u8, opp: u8) {
        self.my_points[(point - 1) as usize] = mine;
        self.opp_points[(point - 1) as usize] = opp;
    }

    fn get(&self, point: i32) -> (u8, u8) {
        (
            self.my_points[(point - 1) as usize],
            self.opp_points[(point - 1) as usize],
        )
    }

    pub fn mine_at(&self, point: i32) -> u8 {
        if point < 1 || point > POINTS as i32 {
            return 0;
        }
        self.my_points[(point - 1) as usize]
    }

    pub fn opp_at(&self, point: i32) -> u8 {
        if point < 1 || point > POINTS as i32 {
            return 0;
        }
        self.opp_points[(point - 1) as usize]
    }

    /// All points (1-24) this player has at least one checker on.
    pub fn occupied_points(&self) -> impl Iterator<Item = i32> + '_ {
        (1..=POINTS as i32).filter(move |&p| self.mine_at(p) > 0)
    }

    /// Whether every one of this player's checkers is within their own
    /// home board (points 1-6), which is a precondition for bearing off.
    pub fn all_home(&self) -> bool {
        self.my_bar == 0 && (7..=POINTS as i32).all(|p| self.mine_at(p) == 0)
    }

    /// The furthest-from-home point this player still occupies, used to
    /// decide whether an overshooting die is allowed to bear a checker off.
    pub fn farthest(&self) -> i32 {
        self.occupied_points().max().unwrap_or(0)
    }

    /// Removes one of this player's checkers from `point`.
    pub(crate) fn take_mine(&mut self, point: i32) {
        self.my_points[(point - 1) as usize] -= 1;
    }

    /// Places one of this player's checkers on `point`.
    pub(crate) fn place_mine(&mut self, point: i32) {
        self.my_points[(point - 1) as usize] += 1;
    }

    /// Sends the single opposing checker on `point` to the opponent's bar.
    pub(crate) fn hit(&mut self, point: i32) {
        self.opp_points[(point - 1) as usize] -= 1;
        self.opp_bar += 1;
    }
}

pub(crate) fn validate_token(token: &str) -> Result<i32, RuleError> {
    let space = parse_space(token);
    if !valid_space(space) {
        return Err(RuleError::InvalidSpace(token.to_string()));
    }
    Ok(space)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_and_named_spaces() {
        assert_eq!(parse_space("24"), 24);
        assert_eq!(parse_space("1"), 1);
        assert_eq!(parse_space("bar"), BAR);
        assert_eq!(parse_space("BAR"), BAR);
        assert_eq!(parse_space("off"), OFF);
        assert_eq!(parse_space("0"), -1);
        assert_eq!(parse_space("25"), -1);
        assert_eq!(parse_space("nope"), -1);
    }

    #[test]
    fn flip_is_its_own_inverse() {
        for space in [BAR, OFF, 1, 6, 12, 24] {
            let once = flip_space(space, 2);
            assert_eq!(flip_space(once, 2), space);
            assert_eq!(flip_space(space, 1), space);
        }
    }

    #[test]
    fn starting_position_has_fifteen_checkers_each() {
        let board = Board::new();
        let p1: i32 = board.points.iter().map(|&c| c.max(0) as i32).sum();
        let p2: i32 = board.points.iter().map(|&c| (-c).max(0) as i32).sum();
        assert_eq!(p1, 15);
        assert_eq!(p2, 15);
    }

    #[test]
    fn view_round_trips_through_from_view() {
        let board = Board::new();
        for player in [1u8, 2u8] {
            let view = board.view(player);
            let rebuilt = Board::from_view(&view, player);
            assert_eq!(rebuilt, board);
        }
    }
}
