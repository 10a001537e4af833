//! Backgammon rules engine: board representation, move legality and
//! application, and the roll/turn state machine a match embeds.
//!
//! Everything here is pure and synchronous -- no I/O, no async, no
//! knowledge of clients or transports. The server crate is the only
//! consumer.

pub mod board;
pub mod error;
pub mod match_state;
pub mod moves;

pub use board::{Board, Checker, Player, BAR, CHECKERS_PER_PLAYER, OFF, POINTS};
pub use error::RuleError;
pub use match_state::GameState;
pub use moves::Move;
