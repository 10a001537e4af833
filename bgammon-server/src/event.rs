//! Outbound event kinds and their two wire renderings: a compact text line
//! for the default transport mode, or a JSON object when the client has
//! opted into `json on` (or logged in with the JSON login variant).

use bgammon_rules::Move;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Welcome {
        player: String,
        clients: usize,
        games: usize,
    },
    Ping {
        time: u64,
    },
    Help,
    Notice {
        message: String,
    },
    Say {
        player: String,
        message: String,
    },
    List {
        games: Vec<GameListEntry>,
    },
    Joined {
        player: String,
        player_number: u8,
        opponent: Option<String>,
    },
    FailedJoin {
        reason: String,
    },
    FailedLeave {
        reason: String,
    },
    Rolled {
        player: String,
        roll1: u8,
        roll2: u8,
    },
    FailedRoll {
        reason: String,
    },
    Moved {
        player: String,
        moves: String,
    },
    FailedMove {
        reason: String,
    },
    FailedOk {
        moves: String,
    },
    Win {
        player: String,
    },
    Board {
        player_number: u8,
        points: Vec<i8>,
        bar: (i8, i8),
        off: (i8, i8),
        turn: u8,
        roll1: u8,
        roll2: u8,
        moves: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct GameListEntry {
    pub id: u64,
    pub has_password: bool,
    pub players: u8,
    pub name: String,
}

impl Event {
    pub fn moved(player: &str, moves: &[Move]) -> Self {
        Event::Moved {
            player: player.to_string(),
            moves: bgammon_rules::moves::format_moves(moves),
        }
    }

    pub fn failed_ok(moves: &[Move]) -> Self {
        Event::FailedOk {
            moves: bgammon_rules::moves::format_moves(moves),
        }
    }

    /// Renders the event the way it is written to the wire: JSON when
    /// `json` is set, otherwise a single text line.
    pub fn render(&self, json: bool) -> String {
        if json {
            serde_json::to_string(self).expect("event always serializes")
        } else {
            self.to_line()
        }
    }

    fn to_line(&self) -> String {
        match self {
            Event::Welcome { player, clients, games } => {
                format!("welcome {} clients={} games={}", player, clients, games)
            }
            Event::Ping { time } => format!("ping {}", time),
            Event::Help => "help see https://bgammon.org/commands for the full command list".to_string(),
            Event::Notice { message } => format!("notice {}", message),
            Event::Say { player, message } => format!("say {} {}", player, message),
            Event::List { games } => {
                if games.is_empty() {
                    "list".to_string()
                } else {
                    let mut line = String::from("list");
                    for g in games {
                        line.push_str(&format!(
                            " {}/{}/{}/{}",
                            g.id,
                            if g.has_password { "1" } else { "0" },
                            g.players,
                            g.name
                        ));
                    }
                    line
                }
            }
            Event::Joined {
                player,
                player_number,
                opponent,
            } => format!(
                "joined {} {} {}",
                player,
                player_number,
                opponent.as_deref().unwrap_or("-")
            ),
            Event::FailedJoin { reason } => format!("failedjoin {}", reason),
            Event::FailedLeave { reason } => format!("failedleave {}", reason),
            Event::Rolled { player, roll1, roll2 } => {
                format!("rolled {} {} {}", player, roll1, roll2)
            }
            Event::FailedRoll { reason } => format!("failedroll {}", reason),
            Event::Moved { player, moves } => format!("moved {} {}", player, moves),
            Event::FailedMove { reason } => format!("failedmove {}", reason),
            Event::FailedOk { moves } => format!("failedok {}", moves),
            Event::Win { player } => format!("win {}", player),
            Event::Board {
                player_number,
                points,
                bar,
                off,
                turn,
                roll1,
                roll2,
                moves,
            } => {
                let points = points
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!(
                    "board {} {} {},{} {},{} {} {} {} {}",
                    player_number,
                    points,
                    bar.0,
                    bar.1,
                    off.0,
                    off.1,
                    turn,
                    roll1,
                    roll2,
                    moves.join(" ")
                )
            }
        }
    }
}
