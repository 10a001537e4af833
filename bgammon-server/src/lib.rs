//! Match server library: the registry, dispatcher, transports, and match
//! lifecycle the `bgammon-server` binary wires up. Split out from `main.rs`
//! so the dispatcher can be driven directly in integration tests, without a
//! real socket in the loop.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod game;
pub mod ids;
pub mod registry;
pub mod stats;
pub mod transport;
