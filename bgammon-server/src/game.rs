//! The server-side `Match`: board/turn state plus the seat and client
//! bookkeeping the rules engine doesn't know about.

use crate::client::ClientSession;
use crate::error::MatchError;
use crate::event::Event;
use crate::ids::{ClientId, MatchId};
use bgammon_rules::{GameState, Move, Player, RuleError};
use rand::Rng;
use std::sync::Arc;

pub struct Match {
    pub id: MatchId,
    pub name: String,
    pub password: String,

    pub client1: Option<Arc<ClientSession>>,
    pub client2: Option<Arc<ClientSession>>,
    pub player1: Option<Player>,
    pub player2: Option<Player>,

    pub state: GameState,

    /// 0 = no rematch requested; 1 or 2 = that player has requested one.
    pub rematch: u8,
    pub terminated: bool,
}

impl Match {
    pub fn new(id: MatchId, name: String, password: String) -> Self {
        Self {
            id,
            name,
            password,
            client1: None,
            client2: None,
            player1: None,
            player2: None,
            state: GameState::new(),
            rematch: 0,
            terminated: false,
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn player_count(&self) -> u8 {
        self.client1.is_some() as u8 + self.client2.is_some() as u8
    }

    /// Assigns `client` to the first empty seat, creating its player record
    /// if the seat has never been occupied before (a rejoin after a
    /// disconnect reuses the existing one).
    pub fn add_client(&mut self, client: Arc<ClientSession>) -> Result<u8, MatchError> {
        if self.terminated {
            return Err(MatchError::AlreadyInProgress);
        }

        let seat = if self.client1.is_none() {
            1
        } else if self.client2.is_none() {
            2
        } else {
            return Err(MatchError::SeatsFull);
        };

        let name = client.name();
        match seat {
            1 => {
                self.player1.get_or_insert_with(|| Player::new(name, seat));
                self.client1 = Some(client.clone());
            }
            2 => {
                self.player2.get_or_insert_with(|| Player::new(name, seat));
                self.client2 = Some(client.clone());
            }
            _ => unreachable!(),
        }
        client.set_player_number(seat);

        Ok(seat)
    }

    /// Clears `id`'s seat. If both seats are now empty, marks the match
    /// terminated so the reaper will compact it.
    pub fn remove_client(&mut self, id: ClientId) -> Option<u8> {
        let seat = if self.client1.as_ref().map(|c| c.id) == Some(id) {
            self.client1 = None;
            Some(1)
        } else if self.client2.as_ref().map(|c| c.id) == Some(id) {
            self.client2 = None;
            Some(2)
        } else {
            None
        };

        if seat.is_some() && self.client1.is_none() && self.client2.is_none() {
            self.terminated = true;
        }

        seat
    }

    pub fn client_for(&self, player_number: u8) -> Option<&Arc<ClientSession>> {
        match player_number {
            1 => self.client1.as_ref(),
            2 => self.client2.as_ref(),
            _ => None,
        }
    }

    pub fn player_number_of(&self, id: ClientId) -> Option<u8> {
        if self.client1.as_ref().map(|c| c.id) == Some(id) {
            Some(1)
        } else if self.client2.as_ref().map(|c| c.id) == Some(id) {
            Some(2)
        } else {
            None
        }
    }

    pub fn opponent(&self, id: ClientId) -> Option<&Arc<ClientSession>> {
        match self.player_number_of(id)? {
            1 => self.client2.as_ref(),
            2 => self.client1.as_ref(),
            _ => None,
        }
    }

    pub fn roll(&mut self, player_number: u8, rng: &mut impl Rng) -> bool {
        self.state.roll(player_number, rng)
    }

    pub fn add_moves(&mut self, player_number: u8, moves: &[Move]) -> Result<Vec<Move>, RuleError> {
        self.state.add_moves(player_number, moves)
    }

    pub fn reset(&mut self) -> Vec<Move> {
        self.state.reset()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.state.legal_moves()
    }

    pub fn next_turn(&mut self) {
        self.state.next_turn()
    }

    /// Visits each occupied seat in player-number order.
    pub fn each_client<F: FnMut(&Arc<ClientSession>, u8)>(&self, mut f: F) {
        if let Some(c) = &self.client1 {
            f(c, 1);
        }
        if let Some(c) = &self.client2 {
            f(c, 2);
        }
    }

    /// Builds `player_number`'s perspective-flipped board snapshot, the
    /// event sent in response to `board`, after every `roll`/`move`/`ok`,
    /// and on join/rematch.
    pub fn board_event(&self, player_number: u8) -> Event {
        let board = &self.state.board;
        let mine = board.player_points(player_number);
        let opp = board.opponent_points(player_number);
        let points: Vec<i8> = (0..bgammon_rules::POINTS)
            .map(|i| mine[i] as i8 - opp[i] as i8)
            .collect();
        let bar = board.player_bar(player_number);
        let off = board.player_off(player_number);

        let mut moves = self.state.moves.clone();
        bgammon_rules::moves::flip_moves(&mut moves, player_number);

        Event::Board {
            player_number,
            points,
            bar: (bar.0 as i8, bar.1 as i8),
            off: (off.0 as i8, off.1 as i8),
            turn: self.state.turn,
            roll1: self.state.roll1,
            roll2: self.state.roll2,
            moves: moves.iter().map(ToString::to_string).collect(),
        }
    }

    /// Clears both seats, marking the match terminated, and returns the
    /// clients that were occupying them. Used by the `rematch` handshake to
    /// detach the finished match's participants before handing them to the
    /// freshly allocated one.
    pub fn detach_clients(&mut self) -> (Option<Arc<ClientSession>>, Option<Arc<ClientSession>>) {
        let c1 = self.client1.take();
        let c2 = self.client2.take();
        if let Some(c) = &c1 {
            c.set_player_number(0);
        }
        if let Some(c) = &c2 {
            c.set_player_number(0);
        }
        self.terminated = true;
        (c1, c2)
    }

    /// Builds a fresh match carrying over this one's identity: name,
    /// password, player records, and seated clients. Used by the `rematch`
    /// handshake once both participants have opted in. Must be called
    /// *after* `detach_clients` has cleared the old match's seats, since
    /// both matches share the same `Arc<ClientSession>` and this is what
    /// sets `playerNumber` back to the new seat.
    pub fn rematch_clone(
        new_id: MatchId,
        name: String,
        password: String,
        player1: Option<Player>,
        player2: Option<Player>,
        client1: Option<Arc<ClientSession>>,
        client2: Option<Arc<ClientSession>>,
    ) -> Match {
        if let Some(c) = &client1 {
            c.set_player_number(1);
        }
        if let Some(c) = &client2 {
            c.set_player_number(2);
        }
        Match {
            id: new_id,
            name,
            password,
            client1,
            client2,
            player1,
            player2,
            state: GameState::new(),
            rematch: 0,
            terminated: false,
        }
    }
}
