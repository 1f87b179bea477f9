//! Definitions of network messages.

use std::{fmt, sync::Arc};

use kernel_chain::{
    block::{Block, Header},
    transaction::Transaction,
};

use super::command::Command;
use super::inv::InventoryHash;
use super::types::Nonce;
use crate::meta_addr::MetaAddr;

mod get_headers;
mod version;

pub use get_headers::GetHeaders;
pub use version::Version;

/// A network message.
///
/// The wire format identifies messages by a 12-byte ascii command string; we
/// consider this a serialization detail and use the enum discriminant
/// instead. (As a side benefit, this also means that we have a
/// clearly-defined validation boundary for network messages during
/// serialization.)
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Message {
    /// A `version` message: the first message of the handshake, carrying
    /// the sender's protocol version and chain height.
    Version(Version),

    /// A `verack` message, acknowledging a received `version`. Empty.
    Verack,

    /// A `ping` message, carrying a nonce unique to this ping.
    Ping(Nonce),

    /// A `pong` message, echoing the nonce of the ping it answers.
    Pong(Nonce),

    /// A `getaddr` message, requesting known peer addresses. Empty.
    GetAddr,

    /// An `addr` message, gossiping known peer addresses.
    Addr(Vec<MetaAddr>),

    /// A `getheaders` message.
    ///
    /// The responder replies with a `headers` message containing up to
    /// `MAX_HEADERS` consecutive main-chain headers after the locator.
    GetHeaders(GetHeaders),

    /// A `headers` message: consecutive block headers, oldest first.
    Headers(Vec<Header>),

    /// An `inv` message.
    ///
    /// Allows a node to advertise its knowledge of one or more objects. It
    /// can be received unsolicited, and accepted objects are re-advertised
    /// to other peers the same way.
    Inv(Vec<InventoryHash>),

    /// A `getdata` message, requesting full objects named by an earlier
    /// `inv` (or headers download).
    GetData(Vec<InventoryHash>),

    /// A `block` message carrying one serialized block.
    Block(Arc<Block>),

    /// A `tx` message carrying one serialized transaction.
    Tx(Arc<Transaction>),
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version { .. } => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping { .. } => Command::Ping,
            Message::Pong { .. } => Command::Pong,
            Message::GetAddr => Command::GetAddr,
            Message::Addr { .. } => Command::Addr,
            Message::GetHeaders { .. } => Command::GetHeaders,
            Message::Headers { .. } => Command::Headers,
            Message::Inv { .. } => Command::Inv,
            Message::GetData { .. } => Command::GetData,
            Message::Block { .. } => Command::Block,
            Message::Tx { .. } => Command::Tx,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.command().name())
    }
}
