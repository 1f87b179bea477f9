use serde::{Deserialize, Serialize};

use crate::{KernelDeserialize, KernelSerialize, SerializationError};

/// The height of a block is the length of the chain back to the genesis
/// block (whose height is zero).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Height(pub u32);

impl Height {
    /// The genesis height.
    pub const MIN: Height = Height(0);

    /// The next block up. Saturates rather than wrapping; chains never get
    /// anywhere near this.
    pub fn next(self) -> Height {
        Height(self.0.saturating_add(1))
    }
}

impl KernelSerialize for Height {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for Height {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::kernel_deserialize(reader)?))
    }
}
