//! The block index: per-block metadata forming a tree rooted at genesis.

use kernel_serde_derive::{KernelDeserialize, KernelSerialize};

use kernel_chain::{
    block::{Hash, Height},
    work::difficulty::AccumulatedWork,
    KernelDeserialize, KernelSerialize, SerializationError,
};

/// Validation status of an indexed block.
///
/// Blocks are indexed once their header and body validate context-free;
/// `Invalid` marks a block whose contextual connect failed, so a later
/// reorganization never tries it again.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockStatus {
    Valid,
    Invalid,
}

impl KernelSerialize for BlockStatus {
    fn kernel_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        let byte = match self {
            BlockStatus::Valid => 0u8,
            BlockStatus::Invalid => 1u8,
        };
        target.write_all(&[byte])
    }
}

impl KernelDeserialize for BlockStatus {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        match u8::kernel_deserialize(reader)? {
            0 => Ok(BlockStatus::Valid),
            1 => Ok(BlockStatus::Invalid),
            _ => Err(SerializationError::Parse("invalid block status byte")),
        }
    }
}

/// The index entry kept for every accepted block.
#[derive(Copy, Clone, Debug, Eq, PartialEq, KernelSerialize, KernelDeserialize)]
pub struct IndexEntry {
    /// Distance from genesis.
    pub height: Height,
    /// The parent block.
    pub prev_hash: Hash,
    /// Work from genesis to this block, inclusive.
    pub total_work: AccumulatedWork,
    /// Whether a contextual connect has ever failed for this block.
    pub status: BlockStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_entries_round_trip() {
        let entry = IndexEntry {
            height: Height(42),
            prev_hash: Hash([9; 32]),
            total_work: AccumulatedWork::zero(),
            status: BlockStatus::Invalid,
        };
        let bytes = entry.kernel_serialize_to_vec().unwrap();
        assert_eq!(IndexEntry::kernel_deserialize(&bytes[..]).unwrap(), entry);
    }
}
