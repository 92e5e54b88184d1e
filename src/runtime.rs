//! The per-node runtime harness: a listener task, one sender task per peer,
//! two ticker tasks, and the event loop that exclusively owns the Raft
//! state. Auxiliary tasks only ever talk to the loop through channels.

use std::net::SocketAddr;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use anyhow::{Context, Result};
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, info, warn};

use raftlet_raft::{Control, Event, Message, NodeId, RaftServer, RaftSummary, StateMachine};

use crate::config::{ClusterConfig, Tunables};
use crate::transport;

const INBOUND_CAPACITY: usize = 1024;
const OUTBOUND_CAPACITY: usize = 64;
/// The event loop refuses to block on its queue forever; nothing depends on
/// this firing.
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle for injecting events into a running node. Returned by
/// [`start_node`]; the command loop (or a test) is its only holder.
#[derive(Clone)]
pub struct NodeHandle {
    events_tx: mpsc::Sender<Event>,
    summary_tx: mpsc::Sender<oneshot::Sender<RaftSummary>>,
}

impl NodeHandle {
    pub async fn client_append(&self, item: String) -> Result<()> {
        self.events_tx
            .send(Event::ClientAppend { item })
            .await
            .context("node event loop is gone")
    }

    pub async fn dump_state(&self) -> Result<()> {
        self.events_tx
            .send(Event::DumpState)
            .await
            .context("node event loop is gone")
    }

    pub async fn summary(&self) -> Result<RaftSummary> {
        let (tx, rx) = oneshot::channel();
        self.summary_tx
            .send(tx)
            .await
            .context("node event loop is gone")?;
        rx.await.context("summary request dropped")
    }
}

/// Start node `id`: bind its listener, spawn the sender and ticker tasks,
/// and hand the Raft state to the event loop.
pub async fn start_node(
    id: NodeId,
    cluster: ClusterConfig,
    tunables: Tunables,
    state_machine: Box<dyn StateMachine>,
) -> Result<NodeHandle> {
    let listen_addr = cluster
        .addr_of(id)
        .with_context(|| format!("node {id} missing from the cluster table"))?;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
    let (summary_tx, summary_rx) = mpsc::channel(8);

    tokio::spawn(accept_connections(listener, events_tx.clone()));

    let mut peer_txs = HashMap::new();
    for peer in cluster.peers_of(id) {
        let peer_addr = cluster
            .addr_of(peer)
            .with_context(|| format!("peer {peer} missing from the cluster table"))?;
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(run_sender(peer, peer_addr, rx));
        peer_txs.insert(peer, tx);
    }

    tokio::spawn(run_heartbeat_ticker(tunables.heartbeat, events_tx.clone()));
    tokio::spawn(run_election_ticker(
        tunables.election_base,
        tunables.election_jitter,
        events_tx.clone(),
    ));

    let control = Control::new(id, cluster.peers_of(id), state_machine);
    tokio::spawn(run_event_loop(
        RaftServer::new(),
        control,
        events_rx,
        summary_rx,
        peer_txs,
    ));

    info!(id, %listen_addr, "node started");
    Ok(NodeHandle {
        events_tx,
        summary_tx,
    })
}

/// The only task that touches `RaftServer` and `Control`. After each
/// handler invocation the outgoing buffer is drained and routed to the
/// per-peer sender channels; a full or closed channel drops the message.
async fn run_event_loop(
    mut server: RaftServer,
    mut control: Control,
    mut events_rx: mpsc::Receiver<Event>,
    mut summary_rx: mpsc::Receiver<oneshot::Sender<RaftSummary>>,
    peer_txs: HashMap<NodeId, mpsc::Sender<Message>>,
) {
    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                server.handle_event(&mut control, event);
                for msg in control.drain_outgoing() {
                    let dest = msg.dest();
                    let Some(tx) = peer_txs.get(&dest) else {
                        warn!(dest, "no sender for destination, dropping message");
                        continue;
                    };
                    if let Err(err) = tx.try_send(msg) {
                        debug!(dest, %err, "outbound queue unavailable, dropping message");
                    }
                }
            }
            Some(reply_tx) = summary_rx.recv() => {
                let _ = reply_tx.send(server.summary(control.address));
            }
            _ = time::sleep(RECV_TIMEOUT) => {}
        }
    }
    debug!(address = control.address, "event loop exited");
}

async fn accept_connections(listener: TcpListener, events_tx: mpsc::Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let events_tx = events_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = read_messages(stream, events_tx).await {
                        debug!(%peer_addr, %err, "connection closed");
                    }
                });
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

/// Decode frames off one inbound connection and forward them to the event
/// loop until the peer hangs up.
async fn read_messages(mut stream: TcpStream, events_tx: mpsc::Sender<Event>) -> std::io::Result<()> {
    loop {
        let msg = transport::recv_message(&mut stream).await?;
        if events_tx.send(Event::Network(msg)).await.is_err() {
            return Ok(());
        }
    }
}

/// Owns the lazily-opened outbound socket for one peer. Any connect or
/// write failure resets the socket and discards the message; the protocol
/// absorbs the loss on a later heartbeat.
async fn run_sender(peer: NodeId, addr: SocketAddr, mut outbound_rx: mpsc::Receiver<Message>) {
    let mut socket: Option<TcpStream> = None;
    while let Some(msg) = outbound_rx.recv().await {
        let stream = match &mut socket {
            Some(stream) => stream,
            None => match TcpStream::connect(addr).await {
                Ok(stream) => socket.insert(stream),
                Err(err) => {
                    debug!(peer, %err, "connect failed, dropping message");
                    continue;
                }
            },
        };
        if let Err(err) = transport::send_message(stream, &msg).await {
            warn!(peer, %err, "send failed, resetting connection");
            socket = None;
        }
    }
}

async fn run_heartbeat_ticker(period: Duration, events_tx: mpsc::Sender<Event>) {
    loop {
        time::sleep(period).await;
        if events_tx.send(Event::HeartbeatTick).await.is_err() {
            return;
        }
    }
}

async fn run_election_ticker(base: Duration, jitter: Duration, events_tx: mpsc::Sender<Event>) {
    loop {
        time::sleep(election_period(base, jitter)).await;
        if events_tx.send(Event::ElectionTick).await.is_err() {
            return;
        }
    }
}

fn election_period(base: Duration, jitter: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    base + jitter.mul_f64(rng.gen_range(0.0..1.0))
}
