use anyhow::{bail, Context, Result};
use bgammon_server::client;
use bgammon_server::dispatcher::run_dispatcher;
use bgammon_server::registry::{run_reaper, Registry};
use bgammon_server::stats;
use bgammon_server::transport;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, info_span};
use tracing_futures::Instrument;
use tracing_subscriber::EnvFilter;
use warp::Filter;

/// A multiplayer backgammon match server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen for TCP connections on. Empty disables the TCP listener.
    #[arg(long, default_value = "localhost:1337")]
    tcp_address: String,

    /// Address to listen for WebSocket connections on. Empty disables the WebSocket listener.
    #[arg(long, default_value = "localhost:1338")]
    websocket_address: String,

    /// Optional port to serve debug/profiling diagnostics on.
    #[arg(long)]
    debug_port: Option<u16>,

    /// Run the dice-roll statistics harness and exit without binding any listener.
    #[arg(long)]
    stats_only: bool,

    /// Log level fed into the env-filter (e.g. "info", "bgammon_server=debug").
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    if args.stats_only {
        stats::run();
        return Ok(());
    }

    if args.tcp_address.is_empty() && args.websocket_address.is_empty() {
        bail!("at least one of --tcp-address or --websocket-address must be set");
    }

    if let Some(port) = args.debug_port {
        info!(port, "debug diagnostics port configured (not yet bound)");
    }

    let registry = Arc::new(Registry::new());
    let (dispatch_tx, dispatch_rx) = mpsc::channel(bgammon_server::registry::COMMAND_QUEUE_CAPACITY);

    tokio::spawn(run_dispatcher(registry.clone(), dispatch_rx).instrument(info_span!("dispatcher")));
    tokio::spawn(run_reaper(registry.clone()).instrument(info_span!("reaper")));

    let mut listeners = Vec::new();

    if !args.tcp_address.is_empty() {
        listeners.push(tokio::spawn(run_tcp_listener(
            args.tcp_address.clone(),
            registry.clone(),
            dispatch_tx.clone(),
        )));
    }

    if !args.websocket_address.is_empty() {
        listeners.push(tokio::spawn(run_websocket_listener(
            args.websocket_address.clone(),
            registry.clone(),
            dispatch_tx.clone(),
        )));
    }

    if listeners.is_empty() {
        bail!("no listeners configured");
    }

    for listener in listeners {
        listener.await.context("listener task panicked")??;
    }
    Ok(())
}

async fn run_tcp_listener(address: String, registry: Arc<Registry>, dispatch_tx: mpsc::Sender<(bgammon_server::ids::ClientId, String)>) -> Result<()> {
    let addr: SocketAddr = tokio::net::lookup_host(&address)
        .await
        .with_context(|| format!("failed to resolve TCP listen address {address}"))?
        .next()
        .with_context(|| format!("TCP listen address {address} resolved to no candidates"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
    info!(%addr, "listening for TCP connections");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(%err, "failed to accept TCP connection");
                continue;
            }
        };

        let registry = registry.clone();
        let dispatch_tx = dispatch_tx.clone();
        tokio::spawn(async move {
            let session = client::spawn_session(&registry, dispatch_tx).await;
            let span = info_span!("tcp client", client = %session.id, %peer);
            transport::run_tcp(stream, session.clone()).instrument(span).await;
            teardown(&registry, &session).await;
        });
    }
}

async fn run_websocket_listener(address: String, registry: Arc<Registry>, dispatch_tx: mpsc::Sender<(bgammon_server::ids::ClientId, String)>) -> Result<()> {
    let addr: SocketAddr = tokio::net::lookup_host(&address)
        .await
        .with_context(|| format!("failed to resolve WebSocket listen address {address}"))?
        .next()
        .with_context(|| format!("WebSocket listen address {address} resolved to no candidates"))?;

    let route = {
        let registry = registry.clone();
        warp::path::end().and(warp::ws()).map(move |ws: warp::ws::Ws| {
            let registry = registry.clone();
            let dispatch_tx = dispatch_tx.clone();
            ws.on_upgrade(move |socket| async move {
                let session = client::spawn_session(&registry, dispatch_tx).await;
                let span = info_span!("websocket client", client = %session.id);
                transport::run_websocket(socket, session.clone()).instrument(span).await;
                teardown(&registry, &session).await;
            })
        })
    };

    info!(%addr, "listening for WebSocket connections");
    warp::serve(route).run(addr).await;
    Ok(())
}

/// Removes a disconnected session from any match it was seated in and from
/// the registry. Mirrors §4.2: "when the transport task exits, the session
/// is removed from any match it was in and from the registry."
async fn teardown(registry: &Arc<Registry>, session: &Arc<client::ClientSession>) {
    if let Some(game) = registry.game_by_client(session.id).await {
        game.lock().await.remove_client(session.id);
    }
    registry.remove_client(session.id).await;
}
