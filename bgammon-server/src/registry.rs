//! Process-wide registry: the connected-client set, the live match list, the
//! id streams both draw from, and the single command queue the dispatcher
//! drains.
//!
//! Two locks guard the two lists (see design note in the client.rs/game.rs
//! docs): `clients` behind a plain mutex, `games` behind a read/write lock.
//! Match interior state is itself guarded by a per-match mutex so the
//! dispatcher and a client's teardown path can both reach `remove_client`
//! without racing.

use crate::client::ClientSession;
use crate::error::MatchError;
use crate::event::GameListEntry;
use crate::game::Match;
use crate::ids::{ClientId, IdStream, MatchId};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Bound on the server-wide command queue (see §5 of the design).
pub const COMMAND_QUEUE_CAPACITY: usize = 10;

/// How often the reaper compacts terminated matches out of `games`.
pub const REAP_INTERVAL_SECS: u64 = 60;

pub type SharedMatch = Arc<Mutex<Match>>;

pub struct Registry {
    clients: Mutex<Vec<Arc<ClientSession>>>,
    games: RwLock<Vec<SharedMatch>>,
    client_ids: IdStream,
    match_ids: IdStream,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            games: RwLock::new(Vec::new()),
            client_ids: IdStream::start(),
            match_ids: IdStream::start(),
        }
    }

    pub async fn next_client_id(&self) -> ClientId {
        ClientId(self.client_ids.next().await)
    }

    pub async fn next_match_id(&self) -> MatchId {
        MatchId(self.match_ids.next().await)
    }

    pub async fn add_client(&self, client: Arc<ClientSession>) {
        let mut clients = self.clients.lock().await;
        debug!(client = %client.id, "client registered");
        clients.push(client);
    }

    pub async fn remove_client(&self, id: ClientId) {
        let mut clients = self.clients.lock().await;
        clients.retain(|c| c.id != id);
        debug!(client = %id, "client removed from registry");
    }

    pub async fn find_client(&self, id: ClientId) -> Option<Arc<ClientSession>> {
        self.clients.lock().await.iter().find(|c| c.id == id).cloned()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Looks up a connected client by display name, case-insensitively.
    pub async fn client_by_name(&self, name: &str) -> Option<Arc<ClientSession>> {
        self.clients
            .lock()
            .await
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Atomically checks that `name` is free among currently-connected
    /// clients (other than `claimant` itself) and, if so, assigns it.
    /// Holding the clients lock across the check and the assignment closes
    /// the race window a separate check-then-set would leave open.
    pub async fn try_claim_name(&self, claimant: ClientId, name: &str) -> bool {
        let clients = self.clients.lock().await;
        let taken = clients
            .iter()
            .any(|c| c.id != claimant && c.name().eq_ignore_ascii_case(name));
        if taken {
            return false;
        }
        if let Some(c) = clients.iter().find(|c| c.id == claimant) {
            c.set_name(name.to_string());
        }
        true
    }

    /// Assigns a `Guest<100-999>` name to `claimant`, retrying until one is
    /// free. The name space is small enough that this is bounded in
    /// practice; if it is ever exhausted the range is widened rather than
    /// looping forever.
    pub async fn assign_random_username(&self, claimant: ClientId) -> String {
        let mut attempts = 0u32;
        loop {
            let high = if attempts < 2000 { 999 } else { 9999 };
            let candidate = {
                let mut rng = rand::thread_rng();
                format!("Guest{}", rng.gen_range(100..=high))
            };
            if self.try_claim_name(claimant, &candidate).await {
                return candidate;
            }
            attempts += 1;
        }
    }

    pub async fn add_game(&self, game: Match) -> SharedMatch {
        let shared = Arc::new(Mutex::new(game));
        self.games.write().await.push(shared.clone());
        shared
    }

    /// Inserts an already-shared match (used by `rematch`, which builds the
    /// replacement match while still holding the old one's lock).
    pub async fn insert_game(&self, game: SharedMatch) {
        self.games.write().await.push(game);
    }

    pub async fn game_by_id(&self, id: MatchId) -> Option<SharedMatch> {
        for game in self.games.read().await.iter() {
            if game.lock().await.id == id {
                return Some(game.clone());
            }
        }
        None
    }

    /// Linearly scans `games` for the one `id` is currently seated in.
    pub async fn game_by_client(&self, id: ClientId) -> Option<SharedMatch> {
        for game in self.games.read().await.iter() {
            let g = game.lock().await;
            if g.player_number_of(id).is_some() {
                drop(g);
                return Some(game.clone());
            }
        }
        None
    }

    pub async fn list_games(&self) -> Vec<GameListEntry> {
        let mut out = Vec::new();
        for game in self.games.read().await.iter() {
            let g = game.lock().await;
            if g.terminated {
                continue;
            }
            out.push(GameListEntry {
                id: g.id.0,
                has_password: g.has_password(),
                players: g.player_count(),
                name: g.name.clone(),
            });
        }
        out
    }

    pub async fn game_count(&self) -> usize {
        let mut count = 0;
        for game in self.games.read().await.iter() {
            if !game.lock().await.terminated {
                count += 1;
            }
        }
        count
    }

    /// Compacts terminated matches out of `games`. Run periodically by
    /// `run_reaper`, and callable directly by tests that want to assert on
    /// reaping without waiting out the real interval.
    pub async fn reap(&self) {
        let mut games = self.games.write().await;
        let before = games.len();
        let mut keep = Vec::with_capacity(games.len());
        for game in games.drain(..) {
            if !game.lock().await.terminated {
                keep.push(game);
            }
        }
        let reaped = before - keep.len();
        *games = keep;
        if reaped > 0 {
            info!(reaped, remaining = games.len(), "compacted terminated matches");
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a `join` target: a bare digit string is a match id, anything
/// else is resolved through the name of a currently-connected client.
pub async fn resolve_join_target(
    registry: &Registry,
    token: &str,
) -> Result<SharedMatch, MatchError> {
    if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
        let id = MatchId(token.parse().map_err(|_| MatchError::NotFound)?);
        return registry.game_by_id(id).await.ok_or(MatchError::NotFound);
    }

    let target_client = registry.client_by_name(token).await.ok_or(MatchError::NotFound)?;
    registry
        .game_by_client(target_client.id)
        .await
        .ok_or(MatchError::NotFound)
}

/// Every minute, drop terminated matches from `games` so the list does not
/// grow without bound across a long-lived process.
pub async fn run_reaper(registry: Arc<Registry>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(REAP_INTERVAL_SECS));
    interval.tick().await;
    loop {
        interval.tick().await;
        registry.reap().await;
    }
}
