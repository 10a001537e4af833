//! Match-lifecycle error taxonomy. Distinct from `bgammon_rules::RuleError`,
//! which only ever sees space/move validity; this enum covers the
//! surrounding seat/membership/credential rules the dispatcher enforces.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Match not found.")]
    NotFound,
    #[error("Invalid password.")]
    InvalidPassword,
    #[error("Match is full.")]
    SeatsFull,
    #[error("Match already in progress.")]
    AlreadyInProgress,
    #[error("You are not in a match.")]
    NotInMatch,
    #[error("You are already in a match.")]
    AlreadyInMatch,
    #[error("The match has no winner yet.")]
    NoWinner,
    #[error("Your opponent is no longer connected.")]
    OpponentAbsent,
    #[error("You have already requested a rematch.")]
    AlreadyRequestedRematch,
    #[error("Invalid username: must contain at least one non-numeric character.")]
    UsernameAllDigits,
    #[error("Username unavailable.")]
    UsernameUnavailable,
}
