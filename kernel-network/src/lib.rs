//! The Kernel peer-to-peer layer.
//!
//! Framing, the message catalog, per-peer connection handling with the
//! version/verack handshake and ping liveness, the peer registry used for
//! relay, and the header-first synchronization logic.

pub mod constants;
pub mod meta_addr;
pub mod peer;
pub mod peer_set;
pub mod protocol;
pub mod sync;

pub use meta_addr::MetaAddr;
pub use peer_set::PeerSet;
pub use protocol::external::{Codec, InventoryHash, Message};

use std::sync::Arc;

use kernel_state::ChainManager;
use tokio::sync::watch;

/// Handles shared by every peer task.
#[derive(Clone)]
pub struct NetworkContext {
    pub chain: Arc<ChainManager>,
    pub peers: Arc<PeerSet>,
    /// Flips to `true` exactly once, at shutdown.
    pub shutdown: watch::Receiver<bool>,
    /// Our own listening address, so `addr` gossip can skip it.
    pub local_addr: std::net::SocketAddr,
}

impl NetworkContext {
    pub fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
