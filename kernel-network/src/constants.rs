//! Protocol-wide constants.

use std::time::Duration;

use crate::protocol::external::types::{Magic, ProtocolVersion};

/// The four bytes prefixing every frame on this network.
pub const MAGIC: Magic = Magic([0xf9, 0xbe, 0xb4, 0xd9]);

/// The protocol version we speak (and the minimum we understand).
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(1);

/// The most headers a single `headers` message may carry.
pub const MAX_HEADERS: usize = 2_000;

/// Maximum size of a protocol message body.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 2 * 1024 * 1024;

/// A peer idle this long gets a ping.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A peer silent this long gets dropped.
pub const PEER_SILENCE_LIMIT: Duration = Duration::from_secs(120);

/// How long to wait for a dialed peer before giving up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the liveness timer fires inside each peer task.
pub const LIVENESS_TICK: Duration = Duration::from_secs(5);

/// How long an outstanding header/block request may go unanswered before
/// the requester treats the peer as unhelpful. Enforced today through the
/// silence limit (an unresponsive peer stops answering pings too); kept as
/// a named bound for the sync layer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
