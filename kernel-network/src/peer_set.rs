//! The peer registry: every live connection, addressable for relay.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{meta_addr::MetaAddr, protocol::external::Message};

/// A handle for sending messages to one connected peer.
///
/// Messages are queued onto the peer's writer task; a send only fails once
/// the peer is gone.
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(addr: SocketAddr, outbound: mpsc::UnboundedSender<Message>) -> PeerHandle {
        PeerHandle { addr, outbound }
    }

    /// Queue `message` for delivery. Returns false if the connection has
    /// closed.
    pub fn send(&self, message: Message) -> bool {
        trace!(peer = %self.addr, msg = %message, "queueing message");
        self.outbound.send(message).is_ok()
    }
}

/// All currently connected peers.
#[derive(Default)]
pub struct PeerSet {
    peers: Mutex<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerSet {
    pub fn new() -> PeerSet {
        PeerSet::default()
    }

    pub fn register(&self, handle: PeerHandle) {
        let mut peers = self.peers.lock().expect("peer set lock poisoned");
        debug!(peer = %handle.addr, total = peers.len() + 1, "peer registered");
        peers.insert(handle.addr, handle);
    }

    pub fn unregister(&self, addr: &SocketAddr) {
        let mut peers = self.peers.lock().expect("peer set lock poisoned");
        if peers.remove(addr).is_some() {
            debug!(peer = %addr, total = peers.len(), "peer unregistered");
        }
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers
            .lock()
            .expect("peer set lock poisoned")
            .contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("peer set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `message` to every peer except `origin` (the peer it came
    /// from, if any).
    pub fn broadcast(&self, message: Message, origin: Option<SocketAddr>) {
        let handles: Vec<PeerHandle> = {
            let peers = self.peers.lock().expect("peer set lock poisoned");
            peers
                .values()
                .filter(|handle| Some(handle.addr) != origin)
                .cloned()
                .collect()
        };
        for handle in handles {
            handle.send(message.clone());
        }
    }

    /// The known peer addresses, for `getaddr` replies.
    pub fn addresses(&self) -> Vec<MetaAddr> {
        let peers = self.peers.lock().expect("peer set lock poisoned");
        peers
            .keys()
            .map(|addr| MetaAddr::new(addr.ip().to_string(), addr.port() as u32))
            .collect()
    }
}
