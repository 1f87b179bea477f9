use kernel_serde_derive::{KernelDeserialize, KernelSerialize};

use kernel_chain::{KernelDeserialize, KernelSerialize, SerializationError};

use super::super::types::ProtocolVersion;

/// A `version` message.
///
/// Note that although this is called `version`, its role is really
/// analogous to a `ClientHello` message in TLS, used to begin a handshake,
/// and is distinct from a simple version number.
#[derive(Copy, Clone, PartialEq, Eq, Debug, KernelSerialize, KernelDeserialize)]
pub struct Version {
    /// The network protocol version supported by the sender.
    pub version: ProtocolVersion,

    /// The height of the sender's best chain tip, or -1 for an empty chain.
    pub start_height: i32,
}

impl Version {
    pub fn new(version: ProtocolVersion, start_height: i32) -> Version {
        Version {
            version,
            start_height,
        }
    }
}
