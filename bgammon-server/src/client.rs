//! Client sessions: identity, liveness, and the channels that connect a
//! transport to the dispatcher's single command stream.

use crate::event::Event;
use crate::ids::ClientId;
use crate::registry::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};
use tracing::trace;

/// Bound on the per-client inbound/outbound channels (see §5 of the design).
pub const CLIENT_CHANNEL_CAPACITY: usize = 8;

/// Reserved for a future idle sweep; `last_active` is already tracked so it
/// can be wired up without further plumbing.
#[allow(dead_code)]
pub const CLIENT_IDLE_TIMEOUT_SECS: u64 = 600;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

#[derive(Debug)]
struct Identity {
    /// -1 = not logged in, 0 = logged in without a password, 1 = with one.
    account: i8,
    name: String,
    json: bool,
    player_number: u8,
    connected: u64,
    last_active: u64,
    last_ping: u64,
}

/// One per connected user, regardless of transport.
#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    identity: SyncMutex<Identity>,

    commands_tx: mpsc::Sender<String>,
    commands_rx: SyncMutex<Option<mpsc::Receiver<String>>>,

    events_tx: mpsc::Sender<String>,
    events_rx: SyncMutex<Option<mpsc::Receiver<String>>>,

    terminated: AtomicBool,
    terminate_reason: SyncMutex<Option<String>>,
    terminate_notify: Notify,
}

impl ClientSession {
    pub fn new(id: ClientId) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let connected = now();
        Self {
            id,
            identity: SyncMutex::new(Identity {
                account: -1,
                name: String::new(),
                json: false,
                player_number: 0,
                connected,
                last_active: connected,
                last_ping: connected,
            }),
            commands_tx,
            commands_rx: SyncMutex::new(Some(commands_rx)),
            events_tx,
            events_rx: SyncMutex::new(Some(events_rx)),
            terminated: AtomicBool::new(false),
            terminate_reason: SyncMutex::new(None),
            terminate_notify: Notify::new(),
        }
    }

    /// Clone of the sender the transport task uses to push inbound frames.
    pub fn commands_sender(&self) -> mpsc::Sender<String> {
        self.commands_tx.clone()
    }

    /// Taken once by the forwarder task at session creation.
    pub fn take_commands_receiver(&self) -> mpsc::Receiver<String> {
        self.commands_rx
            .lock()
            .unwrap()
            .take()
            .expect("commands receiver already taken")
    }

    /// Taken once by the transport task at session creation.
    pub fn take_events_receiver(&self) -> mpsc::Receiver<String> {
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .expect("events receiver already taken")
    }

    pub fn account(&self) -> i8 {
        self.identity.lock().unwrap().account
    }

    pub fn set_account(&self, account: i8) {
        self.identity.lock().unwrap().account = account;
    }

    pub fn name(&self) -> String {
        self.identity.lock().unwrap().name.clone()
    }

    pub fn set_name(&self, name: String) {
        self.identity.lock().unwrap().name = name;
    }

    pub fn json(&self) -> bool {
        self.identity.lock().unwrap().json
    }

    pub fn set_json(&self, json: bool) {
        self.identity.lock().unwrap().json = json;
    }

    pub fn player_number(&self) -> u8 {
        self.identity.lock().unwrap().player_number
    }

    pub fn set_player_number(&self, player_number: u8) {
        self.identity.lock().unwrap().player_number = player_number;
    }

    pub fn last_ping(&self) -> u64 {
        self.identity.lock().unwrap().last_ping
    }

    pub fn touch_active(&self) {
        self.identity.lock().unwrap().last_active = now();
    }

    /// Queues a pre-serialized outbound frame. Silently dropped if the
    /// transport has gone away -- the transport teardown path is what
    /// removes the session from the registry, not this call.
    pub async fn send_frame(&self, frame: String) {
        let _ = self.events_tx.send(frame).await;
    }

    /// Renders `event` according to this client's current `json` flag and
    /// enqueues it. This is a suspension point: the bounded events channel
    /// applies backpressure to whoever calls it (normally the dispatcher)
    /// if the client is slow to drain its outbound queue.
    pub async fn send_event(&self, event: &Event) {
        let frame = event.render(self.json());
        self.send_frame(frame).await;
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Marks the session for termination. Idempotent: only the first call
    /// records a reason and wakes the transport task.
    pub fn terminate(&self, reason: &str) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if !reason.is_empty() {
            *self.terminate_reason.lock().unwrap() = Some(reason.to_string());
        }
        trace!(client = %self.id, reason, "terminating client session");
        self.terminate_notify.notify_one();
    }

    pub fn terminate_reason(&self) -> Option<String> {
        self.terminate_reason.lock().unwrap().clone()
    }

    pub async fn wait_for_terminate(&self) {
        if self.terminated() {
            return;
        }
        self.terminate_notify.notified().await;
    }

    pub fn mark_pinged(&self) {
        self.identity.lock().unwrap().last_ping = now();
    }
}

/// Allocates a client id, registers a fresh session with the registry, and
/// spawns its forwarder and ping tasks. The caller is left to spawn the
/// transport task appropriate to how the connection arrived (TCP vs.
/// WebSocket) -- the one piece that genuinely differs per listener.
pub async fn spawn_session(registry: &Arc<Registry>, dispatch_tx: mpsc::Sender<(ClientId, String)>) -> Arc<ClientSession> {
    let id = registry.next_client_id().await;
    let session = Arc::new(ClientSession::new(id));
    registry.add_client(session.clone()).await;

    let commands_rx = session.take_commands_receiver();
    tokio::spawn(run_forwarder(id, commands_rx, dispatch_tx));
    tokio::spawn(run_ping(session.clone()));

    session
}

/// Forwards every frame off the session's local inbound channel onto the
/// registry's single command queue. This is the serialization point: the
/// dispatcher sees exactly one ordered stream across all clients.
pub async fn run_forwarder(
    id: ClientId,
    mut commands_rx: mpsc::Receiver<String>,
    dispatch_tx: mpsc::Sender<(ClientId, String)>,
) {
    while let Some(frame) = commands_rx.recv().await {
        if dispatch_tx.send((id, frame)).await.is_err() {
            break;
        }
    }
    trace!(client = %id, "forwarder task exiting");
}

/// Every four minutes: terminate pre-login clients past the (nominally
/// two-minute) grace period, otherwise emit a ping. The longer interval is
/// preserved from the source even though the terminate message still
/// advertises two minutes.
pub async fn run_ping(session: std::sync::Arc<ClientSession>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(4 * 60));
    interval.tick().await;
    loop {
        interval.tick().await;
        if session.terminated() {
            break;
        }
        if session.account() == -1 {
            session.terminate("User did not send login command within 2 minutes.");
            break;
        }
        let time = now();
        session.send_event(&Event::Ping { time }).await;
        session.mark_pinged();
        trace!(client = %session.id, time, "pinged client");
    }
}
