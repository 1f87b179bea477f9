use crate::{KernelDeserialize, KernelSerialize, SerializationError};

/// A transaction lock time.
///
/// Carried for encoding compatibility; this chain's validator does not gate
/// inclusion on it, and the wallet always produces zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct LockTime(pub u32);

impl LockTime {
    pub const fn none() -> LockTime {
        LockTime(0)
    }
}

impl KernelSerialize for LockTime {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for LockTime {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(LockTime(u32::kernel_deserialize(reader)?))
    }
}
