use kernel_chain::{KernelDeserialize, KernelSerialize, SerializationError};

/// The network magic prefixing every frame, identifying the chain.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Magic(pub [u8; 4]);

/// A protocol version number.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ProtocolVersion(pub u32);

/// A nonce used to pair `ping` and `pong` messages.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Nonce(pub u64);

impl Nonce {
    pub fn random() -> Nonce {
        use rand::Rng;
        Nonce(rand::thread_rng().gen())
    }
}

impl KernelSerialize for ProtocolVersion {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for ProtocolVersion {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::kernel_deserialize(reader)?))
    }
}

impl KernelSerialize for Nonce {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for Nonce {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::kernel_deserialize(reader)?))
    }
}
