//! Per-peer connection handling.
//!
//! Each connection runs one task: it drives the handshake, then processes
//! messages strictly in arrival order, pings on idleness, and drops the
//! peer after prolonged silence. A companion writer task drains the
//! outbound queue so slow peers never block message handling.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::constants::{
    CONNECT_TIMEOUT, CURRENT_VERSION, LIVENESS_TICK, PEER_SILENCE_LIMIT, PING_INTERVAL,
};
use crate::peer_set::PeerHandle;
use crate::protocol::external::{types::Nonce, Codec, Message, Version};
use crate::sync;
use crate::NetworkContext;

/// Both sides of the version/verack exchange, tracked per peer. Only after
/// both flags set may any other message be processed.
#[derive(Debug, Default, Clone, Copy)]
struct HandshakeState {
    version_received: bool,
    verack_received: bool,
}

impl HandshakeState {
    fn established(&self) -> bool {
        self.version_received && self.verack_received
    }
}

/// Accept loop for our listening socket.
pub async fn listen(ctx: NetworkContext, listener: tokio::net::TcpListener) {
    info!(local = %ctx.local_addr, "P2P listener started");
    let mut shutdown = ctx.shutdown.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "inbound connection");
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        serve_peer(ctx, stream, addr, false).await;
                    });
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            },
            _ = shutdown.changed() => {
                info!("P2P listener stopping");
                return;
            }
        }
    }
}

/// Dial `addr` and run the connection as initiator.
pub async fn connect(ctx: NetworkContext, addr: SocketAddr) {
    if ctx.peers.contains(&addr) || addr == ctx.local_addr {
        return;
    }
    match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            debug!(peer = %addr, "outbound connection established");
            serve_peer(ctx, stream, addr, true).await;
        }
        Ok(Err(error)) => debug!(peer = %addr, %error, "outbound connection failed"),
        Err(_) => debug!(peer = %addr, "outbound connection timed out"),
    }
}

/// Run one peer connection to completion.
pub async fn serve_peer(ctx: NetworkContext, stream: TcpStream, addr: SocketAddr, initiator: bool) {
    let framed = tokio_util::codec::Framed::new(stream, Codec::builder().finish());
    let (mut sink, mut messages) = framed.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(error) = sink.send(message).await {
                debug!(%error, "peer writer closing");
                break;
            }
        }
    });

    let handle = PeerHandle::new(addr, outbound);
    ctx.peers.register(handle.clone());

    let mut state = HandshakeState::default();
    let mut sent_version = false;
    let mut last_received = Instant::now();
    let mut last_ping = Instant::now();

    // The initiator opens with its version; the responder answers with its
    // own once one arrives.
    if initiator {
        handle.send(Message::Version(our_version(&ctx)));
        sent_version = true;
    }

    let mut shutdown = ctx.shutdown.clone();
    let mut liveness = interval(LIVENESS_TICK);
    loop {
        tokio::select! {
            message = messages.next() => match message {
                Some(Ok(message)) => {
                    last_received = Instant::now();
                    if !handle_message(&ctx, &handle, &mut state, &mut sent_version, initiator, message) {
                        break;
                    }
                }
                Some(Err(error)) => {
                    // Malformed framing desynchronizes the stream; drop the
                    // peer rather than guess where the next frame starts.
                    warn!(peer = %addr, %error, "dropping peer after malformed message");
                    break;
                }
                None => {
                    debug!(peer = %addr, "peer closed the connection");
                    break;
                }
            },
            _ = liveness.tick() => {
                let idle = last_received.elapsed();
                if idle > PEER_SILENCE_LIMIT {
                    info!(peer = %addr, ?idle, "dropping silent peer");
                    break;
                }
                if state.established()
                    && idle > PING_INTERVAL
                    && last_ping.elapsed() > PING_INTERVAL
                {
                    handle.send(Message::Ping(Nonce::random()));
                    last_ping = Instant::now();
                }
            },
            _ = shutdown.changed() => {
                debug!(peer = %addr, "closing peer for shutdown");
                break;
            }
        }
    }

    ctx.peers.unregister(&addr);
    writer.abort();
}

fn our_version(ctx: &NetworkContext) -> Version {
    let start_height = ctx
        .chain
        .tip()
        .map(|tip| tip.height.0 as i32)
        .unwrap_or(-1);
    Version::new(CURRENT_VERSION, start_height)
}

/// Process one message. Returns false when the peer should be dropped.
fn handle_message(
    ctx: &NetworkContext,
    peer: &PeerHandle,
    state: &mut HandshakeState,
    sent_version: &mut bool,
    initiator: bool,
    message: Message,
) -> bool {
    trace!(peer = %peer.addr, msg = %message, "received message");
    match message {
        Message::Version(version) => {
            debug!(
                peer = %peer.addr,
                version = version.version.0,
                height = version.start_height,
                "peer version"
            );
            if !*sent_version {
                peer.send(Message::Version(our_version(ctx)));
                *sent_version = true;
            }
            peer.send(Message::Verack);
            state.version_received = true;
            true
        }
        Message::Verack => {
            state.verack_received = true;
            if state.established() {
                info!(peer = %peer.addr, "handshake complete");
                if initiator {
                    sync::request_headers_from_tip(ctx, peer);
                }
            }
            true
        }
        // Everything else requires a completed handshake.
        other if !state.established() => {
            warn!(peer = %peer.addr, msg = %other, "message before handshake completion");
            false
        }
        Message::Ping(nonce) => {
            peer.send(Message::Pong(nonce));
            true
        }
        Message::Pong(_) => true,
        Message::GetAddr => {
            let addresses = ctx.peers.addresses();
            peer.send(Message::Addr(addresses));
            true
        }
        Message::Addr(addresses) => {
            sync::handle_addr(ctx, addresses);
            true
        }
        Message::GetHeaders(request) => {
            sync::handle_get_headers(ctx, peer, request);
            true
        }
        Message::Headers(headers) => {
            sync::handle_headers(ctx, peer, headers);
            true
        }
        Message::Inv(items) => {
            sync::handle_inv(ctx, peer, items);
            true
        }
        Message::GetData(items) => {
            sync::handle_get_data(ctx, peer, items);
            true
        }
        Message::Block(block) => {
            sync::handle_block(ctx, peer, block);
            true
        }
        Message::Tx(transaction) => {
            sync::handle_tx(ctx, peer, transaction);
            true
        }
    }
}
