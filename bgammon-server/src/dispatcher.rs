//! The command dispatcher: the single task that drains the registry's
//! command queue and is therefore the only place match state is mutated
//! (barring the two exceptions documented on `Match::remove_client` and the
//! reaper).
//!
//! Parsing is a small, two-step affair (trim + split on the first run of
//! whitespace, lowercase the keyword), and dispatch is a keyword/alias table
//! rather than one large `match` duplicating precondition checks -- guard
//! logic (in/out of a match, whose turn it is) lives in the small number of
//! `require_*`-shaped helpers each handler calls before touching state.

use crate::client::ClientSession;
use crate::error::MatchError;
use crate::event::Event;
use crate::game::Match;
use crate::ids::ClientId;
use crate::registry::{resolve_join_target, Registry, SharedMatch};
use bgammon_rules::{board, moves, Move, RuleError};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

/// Splits a raw inbound frame into a lowercased keyword and its
/// whitespace-separated parameters. Returns `None` for a blank line (an
/// empty keyword after trimming).
fn parse_line(line: &str) -> Option<(String, Vec<String>)> {
    let trimmed = line.trim();
    let mut split = trimmed.splitn(2, char::is_whitespace);
    let keyword = split.next()?.to_lowercase();
    if keyword.is_empty() {
        return None;
    }
    let params = split
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(String::from)
        .collect();
    Some((keyword, params))
}

/// Drains `rx` forever, processing exactly one command at a time. This is
/// the serialization point for the whole server: every match's state is
/// only ever touched from inside `process_command`.
pub async fn run_dispatcher(registry: Arc<Registry>, mut rx: mpsc::Receiver<(ClientId, String)>) {
    while let Some((id, raw)) = rx.recv().await {
        let Some(session) = registry.find_client(id).await else {
            trace!(client = %id, "command from unregistered client dropped");
            continue;
        };
        session.touch_active();
        process_command(&registry, &session, &raw).await;
    }
}

/// Processes one raw inbound frame as if it had arrived through the command
/// queue. Exposed so integration tests can drive the dispatcher directly
/// against an in-process registry, without a real socket or the queue
/// plumbing in the loop.
pub async fn dispatch_command(registry: &Arc<Registry>, session: &Arc<ClientSession>, raw: &str) {
    process_command(registry, session, raw).await;
}

async fn process_command(registry: &Arc<Registry>, session: &Arc<ClientSession>, raw: &str) {
    let Some((keyword, params)) = parse_line(raw) else {
        return;
    };

    if session.account() == -1 {
        match keyword.as_str() {
            "login" | "l" => handle_login(registry, session, &params, false).await,
            "loginj" | "lj" => handle_login(registry, session, &params, true).await,
            _ => session.terminate("You must login before using other commands."),
        }
        return;
    }

    match keyword.as_str() {
        "help" | "h" => cmd_help(session).await,
        "json" => cmd_json(session, &params).await,
        "say" | "s" => cmd_say(registry, session, &params).await,
        "list" | "ls" => cmd_list(registry, session).await,
        "create" | "c" => cmd_create(registry, session, &params).await,
        "join" | "j" => cmd_join(registry, session, &params).await,
        "leave" | "l" => cmd_leave(registry, session).await,
        "roll" | "r" => cmd_roll(registry, session).await,
        "move" | "m" | "mv" => cmd_move(registry, session, &params).await,
        "reset" => cmd_reset(registry, session).await,
        "ok" | "k" => cmd_ok(registry, session).await,
        "rematch" | "rm" => cmd_rematch(registry, session).await,
        "board" | "b" => cmd_board(registry, session).await,
        "disconnect" => cmd_disconnect(registry, session).await,
        "pong" => {}
        "endgame" => cmd_endgame(registry, session).await,
        other => debug!(keyword = other, client = %session.id, "unrecognized command"),
    }
}

// ---- login -----------------------------------------------------------

async fn handle_login(registry: &Arc<Registry>, session: &Arc<ClientSession>, params: &[String], json: bool) {
    if json {
        session.set_json(true);
    }

    if params.is_empty() {
        let name = registry.assign_random_username(session.id).await;
        finish_login(registry, session, name, None).await;
        return;
    }

    let candidate = &params[0];
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
        session.terminate(&MatchError::UsernameAllDigits.to_string());
        return;
    }
    if !registry.try_claim_name(session.id, candidate).await {
        session.terminate(&MatchError::UsernameUnavailable.to_string());
        return;
    }

    let password = if params.len() >= 2 {
        Some(params[1..].join(" "))
    } else {
        None
    };
    finish_login(registry, session, candidate.clone(), password).await;
}

async fn finish_login(registry: &Arc<Registry>, session: &Arc<ClientSession>, name: String, password: Option<String>) {
    session.set_account(if password.is_some() { 1 } else { 0 });
    let clients = registry.client_count().await;
    let games = registry.game_count().await;
    session
        .send_event(&Event::Welcome { player: name, clients, games })
        .await;
}

// ---- simple commands ---------------------------------------------------

async fn cmd_help(session: &Arc<ClientSession>) {
    session.send_event(&Event::Help).await;
}

async fn cmd_json(session: &Arc<ClientSession>, params: &[String]) {
    match params.first().map(String::as_str) {
        Some("on") => session.set_json(true),
        Some("off") => session.set_json(false),
        _ => {
            session
                .send_event(&Event::Notice { message: "Usage: json on|off".to_string() })
                .await;
            return;
        }
    }
    let state = if session.json() { "on" } else { "off" };
    session
        .send_event(&Event::Notice { message: format!("json {state}") })
        .await;
}

async fn cmd_say(registry: &Arc<Registry>, session: &Arc<ClientSession>, params: &[String]) {
    let Some(game) = registry.game_by_client(session.id).await else {
        notice(session, MatchError::NotInMatch).await;
        return;
    };
    let message = params.join(" ");
    let opponent = {
        let g = game.lock().await;
        g.opponent(session.id).cloned()
    };
    match opponent {
        Some(opponent) => {
            opponent
                .send_event(&Event::Say { player: session.name(), message })
                .await;
        }
        None => notice(session, MatchError::OpponentAbsent).await,
    }
}

async fn cmd_list(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let games = registry.list_games().await;
    session.send_event(&Event::List { games }).await;
}

// ---- create / join / leave ---------------------------------------------

async fn cmd_create(registry: &Arc<Registry>, session: &Arc<ClientSession>, params: &[String]) {
    if registry.game_by_client(session.id).await.is_some() {
        notice(session, MatchError::AlreadyInMatch).await;
        return;
    }

    let (password, name_tokens) = match params.first().map(String::as_str) {
        Some("public") => (String::new(), &params[1..]),
        Some("private") => match params.get(1) {
            Some(password) => (password.clone(), &params[2..]),
            None => {
                session
                    .send_event(&Event::Notice { message: "Usage: create private <password> [name]".to_string() })
                    .await;
                return;
            }
        },
        _ => {
            session
                .send_event(&Event::Notice { message: "Usage: create public|private [password] [name]".to_string() })
                .await;
            return;
        }
    };

    let player_name = session.name();
    let custom_name = name_tokens.join(" ");
    let name = if !custom_name.is_empty() {
        custom_name
    } else if player_name.to_lowercase().ends_with('s') {
        format!("{player_name}' match")
    } else {
        format!("{player_name}'s match")
    };

    let id = registry.next_match_id().await;
    let mut game = Match::new(id, name, password);
    game.add_client(session.clone())
        .expect("freshly created match refused its own creator");
    let shared = registry.add_game(game).await;

    let board = {
        let g = shared.lock().await;
        g.board_event(1)
    };
    session
        .send_event(&Event::Joined { player: session.name(), player_number: 1, opponent: None })
        .await;
    session.send_event(&board).await;
}

async fn cmd_join(registry: &Arc<Registry>, session: &Arc<ClientSession>, params: &[String]) {
    if registry.game_by_client(session.id).await.is_some() {
        session
            .send_event(&Event::FailedJoin { reason: MatchError::AlreadyInMatch.to_string() })
            .await;
        return;
    }
    let Some(target) = params.first() else {
        session
            .send_event(&Event::Notice { message: "Usage: join <id|name> [password]".to_string() })
            .await;
        return;
    };

    let game = match resolve_join_target(registry, target).await {
        Ok(game) => game,
        Err(err) => {
            session.send_event(&Event::FailedJoin { reason: err.to_string() }).await;
            return;
        }
    };

    let joined = {
        let mut g = game.lock().await;
        if g.has_password() {
            let supplied = params.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            if supplied != g.password {
                session
                    .send_event(&Event::FailedJoin { reason: MatchError::InvalidPassword.to_string() })
                    .await;
                return;
            }
        }
        match g.add_client(session.clone()) {
            Ok(seat) => {
                let opponent = g.opponent(session.id).cloned();
                let board_self = g.board_event(seat);
                let board_opponent = opponent.as_ref().map(|_| g.board_event(if seat == 1 { 2 } else { 1 }));
                Some((seat, opponent, board_self, board_opponent))
            }
            Err(err) => {
                session.send_event(&Event::FailedJoin { reason: err.to_string() }).await;
                None
            }
        }
    };

    let Some((seat, opponent, board_self, board_opponent)) = joined else {
        return;
    };

    let opponent_name = opponent.as_ref().map(|c| c.name());
    session
        .send_event(&Event::Joined {
            player: session.name(),
            player_number: seat,
            opponent: opponent_name.clone(),
        })
        .await;
    session.send_event(&board_self).await;

    if let Some(opponent) = opponent {
        opponent
            .send_event(&Event::Joined {
                player: session.name(),
                player_number: seat,
                opponent: opponent_name,
            })
            .await;
        if let Some(board_opponent) = board_opponent {
            opponent.send_event(&board_opponent).await;
        }
    }
}

async fn cmd_leave(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        session
            .send_event(&Event::FailedLeave { reason: MatchError::NotInMatch.to_string() })
            .await;
        return;
    };
    let opponent = {
        let mut g = game.lock().await;
        let opponent = g.opponent(session.id).cloned();
        g.remove_client(session.id);
        opponent
    };
    session.set_player_number(0);
    if let Some(opponent) = opponent {
        opponent
            .send_event(&Event::Notice { message: format!("{} left the match.", session.name()) })
            .await;
    }
}

// ---- roll / move / reset / ok ------------------------------------------

async fn cmd_roll(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        session.send_event(&Event::FailedRoll { reason: MatchError::NotInMatch.to_string() }).await;
        return;
    };

    let outcome = {
        let mut g = game.lock().await;
        let Some(player_number) = g.player_number_of(session.id) else {
            return notice(session, MatchError::NotInMatch).await;
        };
        let mut rng = rand::thread_rng();
        if !g.roll(player_number, &mut rng) {
            None
        } else {
            let turn = g.state.turn;
            let (roll1, roll2) = (g.state.roll1, g.state.roll2);
            let mut recipients = Vec::new();
            g.each_client(|c, n| recipients.push((c.clone(), n)));
            let boards: Vec<_> = recipients.iter().map(|(_, n)| g.board_event(*n)).collect();
            Some((turn, roll1, roll2, recipients, boards))
        }
    };

    let Some((turn, roll1, roll2, recipients, boards)) = outcome else {
        session
            .send_event(&Event::FailedRoll { reason: "It is not your turn to roll.".to_string() })
            .await;
        return;
    };

    let player_name = session.name();
    for (client, _) in &recipients {
        client
            .send_event(&Event::Rolled { player: player_name.clone(), roll1, roll2 })
            .await;
    }
    for ((client, _), board) in recipients.iter().zip(boards.iter()) {
        if !(turn == 0 && client.json()) {
            client.send_event(board).await;
        }
    }
}

async fn cmd_move(registry: &Arc<Registry>, session: &Arc<ClientSession>, params: &[String]) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice_move_failure(session, MatchError::NotInMatch.to_string()).await;
    };

    let mut g = game.lock().await;
    let Some(player_number) = g.player_number_of(session.id) else {
        drop(g);
        return notice_move_failure(session, MatchError::NotInMatch.to_string()).await;
    };
    if g.state.turn != player_number {
        drop(g);
        return notice_move_failure(session, RuleError::NotYourTurn.to_string()).await;
    }

    let mut parsed = Vec::with_capacity(params.len());
    for token in params {
        let Some((from_tok, to_tok)) = token.split_once('/') else {
            drop(g);
            return notice_move_failure(session, format!("Invalid move syntax: {token}")).await;
        };
        let from_abs = board::parse_space(from_tok);
        let to_abs = board::parse_space(to_tok);
        if !board::valid_space(from_abs) || !board::valid_space(to_abs) {
            drop(g);
            return notice_move_failure(session, format!("Invalid space in move: {token}")).await;
        }
        parsed.push(Move::new(
            board::flip_space(from_abs, player_number),
            board::flip_space(to_abs, player_number),
        ));
    }

    match g.add_moves(player_number, &parsed) {
        Ok(expanded) => {
            let winner = g.state.winner;
            let mut recipients = Vec::new();
            g.each_client(|c, n| recipients.push((c.clone(), n)));
            let boards: Vec<_> = recipients.iter().map(|(_, n)| g.board_event(*n)).collect();
            drop(g);

            let player_name = session.name();
            for ((client, n), board) in recipients.iter().zip(boards.iter()) {
                let mut flipped = expanded.clone();
                moves::flip_moves(&mut flipped, *n);
                client.send_event(&Event::moved(&player_name, &flipped)).await;
                client.send_event(board).await;
            }

            if winner != 0 {
                if let Some(winner_name) = recipients.iter().find(|(_, n)| *n == winner).map(|(c, _)| c.name()) {
                    for (client, _) in &recipients {
                        client.send_event(&Event::Win { player: winner_name.clone() }).await;
                    }
                }
            }
        }
        Err(err) => {
            drop(g);
            session.send_event(&Event::FailedMove { reason: err.to_string() }).await;
        }
    }
}

async fn notice_move_failure(session: &Arc<ClientSession>, reason: String) {
    session.send_event(&Event::FailedMove { reason }).await;
}

async fn cmd_reset(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice(session, MatchError::NotInMatch).await;
    };
    let mut g = game.lock().await;
    let Some(player_number) = g.player_number_of(session.id) else {
        drop(g);
        return notice(session, MatchError::NotInMatch).await;
    };
    if g.state.turn != player_number {
        drop(g);
        session
            .send_event(&Event::Notice { message: RuleError::NotYourTurn.to_string() })
            .await;
        return;
    }
    if g.state.moves.is_empty() {
        drop(g);
        session
            .send_event(&Event::Notice { message: "No moves to reset.".to_string() })
            .await;
        return;
    }

    let undone = g.reset();
    let reversed: Vec<Move> = undone.iter().rev().map(|m| m.reversed()).collect();
    let mut recipients = Vec::new();
    g.each_client(|c, n| recipients.push((c.clone(), n)));
    let boards: Vec<_> = recipients.iter().map(|(_, n)| g.board_event(*n)).collect();
    drop(g);

    let player_name = session.name();
    for ((client, n), board) in recipients.iter().zip(boards.iter()) {
        let mut flipped = reversed.clone();
        moves::flip_moves(&mut flipped, *n);
        client.send_event(&Event::moved(&player_name, &flipped)).await;
        client.send_event(board).await;
    }
}

async fn cmd_ok(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice(session, MatchError::NotInMatch).await;
    };
    let mut g = game.lock().await;
    let Some(viewer) = g.player_number_of(session.id) else {
        drop(g);
        return notice(session, MatchError::NotInMatch).await;
    };

    let legal = g.legal_moves();
    if !legal.is_empty() {
        let mut flipped = legal;
        moves::flip_moves(&mut flipped, viewer);
        moves::sort_moves(&mut flipped);
        drop(g);
        session.send_event(&Event::failed_ok(&flipped)).await;
        return;
    }

    g.next_turn();
    let mut recipients = Vec::new();
    g.each_client(|c, n| recipients.push((c.clone(), n)));
    let boards: Vec<_> = recipients.iter().map(|(_, n)| g.board_event(*n)).collect();
    drop(g);
    for ((client, _), board) in recipients.iter().zip(boards.iter()) {
        client.send_event(board).await;
    }
}

// ---- rematch -------------------------------------------------------------

async fn cmd_rematch(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice(session, MatchError::NotInMatch).await;
    };

    let mut g = game.lock().await;
    let Some(player_number) = g.player_number_of(session.id) else {
        drop(g);
        return notice(session, MatchError::NotInMatch).await;
    };
    if g.state.winner == 0 {
        drop(g);
        return notice(session, MatchError::NoWinner).await;
    }
    let Some(opponent) = g.opponent(session.id).cloned() else {
        drop(g);
        return notice(session, MatchError::OpponentAbsent).await;
    };
    if g.rematch == player_number {
        drop(g);
        return notice(session, MatchError::AlreadyRequestedRematch).await;
    }

    if g.rematch == 0 {
        g.rematch = player_number;
        drop(g);
        session
            .send_event(&Event::Notice { message: "Rematch requested. Waiting for your opponent.".to_string() })
            .await;
        opponent
            .send_event(&Event::Notice {
                message: format!("{} has requested a rematch. Send 'rematch' to accept.", session.name()),
            })
            .await;
        return;
    }

    // Both participants have now opted in. Allocating the replacement match
    // and detaching the old one happens as a single critical section (the
    // old match's lock is held the whole time) rather than the source's
    // split locking, per Open Question (c). Detach first, then clone --
    // `rematch_clone` reassigns `playerNumber` on the shared client sessions,
    // which `detach_clients` would otherwise clobber back to 0 if run after.
    let new_id = registry.next_match_id().await;
    let name = g.name.clone();
    let password = g.password.clone();
    let player1 = g.player1.clone();
    let player2 = g.player2.clone();
    let (client1, client2) = g.detach_clients();
    let new_game = Match::rematch_clone(new_id, name, password, player1, player2, client1, client2);
    drop(g);

    let shared_new: SharedMatch = Arc::new(Mutex::new(new_game));
    registry.insert_game(shared_new.clone()).await;

    let new_game_ref = shared_new.lock().await;
    let mut seated = Vec::new();
    new_game_ref.each_client(|c, n| seated.push((c.clone(), n)));
    let boards: Vec<_> = seated.iter().map(|(_, n)| new_game_ref.board_event(*n)).collect();
    drop(new_game_ref);

    for ((client, n), board) in seated.iter().zip(boards.iter()) {
        let opponent_name = seated.iter().find(|(_, m)| m != n).map(|(c, _)| c.name());
        client
            .send_event(&Event::Joined { player: client.name(), player_number: *n, opponent: opponent_name })
            .await;
        client.send_event(board).await;
    }
}

// ---- misc -----------------------------------------------------------------

async fn cmd_board(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice(session, MatchError::NotInMatch).await;
    };
    let board = {
        let g = game.lock().await;
        g.player_number_of(session.id).map(|n| g.board_event(n))
    };
    if let Some(board) = board {
        session.send_event(&board).await;
    }
}

async fn cmd_disconnect(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    if let Some(game) = registry.game_by_client(session.id).await {
        game.lock().await.remove_client(session.id);
    }
    session.set_player_number(0);
    session.terminate("Client disconnected");
}

async fn cmd_endgame(registry: &Arc<Registry>, session: &Arc<ClientSession>) {
    let Some(game) = registry.game_by_client(session.id).await else {
        return notice(session, MatchError::NotInMatch).await;
    };
    let mut g = game.lock().await;
    let Some(player_number) = g.player_number_of(session.id) else {
        drop(g);
        return;
    };

    // A near-terminal position: the caller's side has fourteen checkers
    // already off and one on their 6 point, so a single bear-off ends the
    // match. Useful for exercising `win`/`rematch` without playing a whole
    // game out.
    let mut board = bgammon_rules::Board::new();
    board.points = [0; bgammon_rules::POINTS];
    if player_number == 1 {
        board.points[5] = 1;
        board.off1 = 14;
        board.points[0] = -2;
        board.off2 = 13;
    } else {
        board.points[18] = -1;
        board.off2 = 14;
        board.points[23] = 2;
        board.off1 = 13;
    }
    g.state.force_state(board, player_number, 6, 6);

    let mut recipients = Vec::new();
    g.each_client(|c, n| recipients.push((c.clone(), n)));
    let boards: Vec<_> = recipients.iter().map(|(_, n)| g.board_event(*n)).collect();
    drop(g);
    for ((client, _), board) in recipients.iter().zip(boards.iter()) {
        client.send_event(board).await;
    }
}

async fn notice(session: &Arc<ClientSession>, err: MatchError) {
    session.send_event(&Event::Notice { message: err.to_string() }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyword_and_params() {
        let (keyword, params) = parse_line("  Move 24/18   13/11  ").unwrap();
        assert_eq!(keyword, "move");
        assert_eq!(params, vec!["24/18", "13/11"]);
    }

    #[test]
    fn blank_line_parses_to_nothing() {
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn bare_keyword_has_no_params() {
        let (keyword, params) = parse_line("list").unwrap();
        assert_eq!(keyword, "list");
        assert!(params.is_empty());
    }
}
