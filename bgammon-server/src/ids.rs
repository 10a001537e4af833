//! Monotonic id generators for clients and matches.
//!
//! Each id stream is backed by a small background task pushing the next
//! value into a channel; producers (the dispatcher, the accept loops) pull
//! the next id without needing to coordinate with one another directly.

use derive_more::Display;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}", _0)]
pub struct ClientId(pub u64);

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}", _0)]
pub struct MatchId(pub u64);

/// A monotonically increasing `u64` stream starting at 1, never repeating
/// for the lifetime of the process.
pub struct IdStream {
    rx: Mutex<mpsc::Receiver<u64>>,
}

impl IdStream {
    pub fn start() -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut next: u64 = 1;
            loop {
                if tx.send(next).await.is_err() {
                    break;
                }
                next += 1;
            }
        });
        Self { rx: Mutex::new(rx) }
    }

    pub async fn next(&self) -> u64 {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("id stream producer task ended")
    }
}
