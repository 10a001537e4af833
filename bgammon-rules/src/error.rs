use thiserror::Error;

/// Errors the rules engine can return while validating or applying moves.
///
/// Every variant is a user-facing condition (illegal move, wrong turn, no
/// dice available, game already over) rather than an internal panic -- the
/// server converts these into `failed_*` event reasons at the dispatch
/// boundary instead of propagating them as opaque strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("invalid space: {0}")]
    InvalidSpace(String),

    #[error("Illegal move.")]
    IllegalMove,

    #[error("no dice available")]
    NoDiceAvailable,

    #[error("the game has already ended")]
    GameOver,

    #[error("it is not your turn")]
    NotYourTurn,
}
