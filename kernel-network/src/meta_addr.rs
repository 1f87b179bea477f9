//! Gossiped peer addresses.
//!
//! Unlike Bitcoin's 16-byte fixed address encoding, this chain gossips a
//! length-prefixed host string with a u32 port, so hostnames survive the
//! trip.

use kernel_serde_derive::{KernelDeserialize, KernelSerialize};

use kernel_chain::{KernelDeserialize, KernelSerialize, SerializationError};

/// A peer address as carried in `addr` messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash, KernelSerialize, KernelDeserialize)]
pub struct MetaAddr {
    pub host: String,
    pub port: u32,
}

impl MetaAddr {
    pub fn new(host: impl Into<String>, port: u32) -> MetaAddr {
        MetaAddr {
            host: host.into(),
            port,
        }
    }

    /// The `host:port` form used for dialing.
    pub fn dial_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for MetaAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dial_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_round_trip() {
        let addr = MetaAddr::new("127.0.0.1", 8889);
        let bytes = addr.kernel_serialize_to_vec().unwrap();
        // varint host length + host + u32 port
        assert_eq!(bytes.len(), 1 + 9 + 4);
        assert_eq!(MetaAddr::kernel_deserialize(&bytes[..]).unwrap(), addr);
    }
}
