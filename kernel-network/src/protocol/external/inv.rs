//! Inventory items for the gossip protocol.

use std::io::{Read, Write};

use kernel_chain::{
    block, transaction, KernelDeserialize, KernelSerialize, SerializationError,
};

/// An inventory hash which refers to some advertised or requested data.
///
/// The wire form is a u32 type code (1 = transaction, 2 = block) followed by
/// the 32-byte hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// A hash of a transaction.
    Tx(transaction::Hash),
    /// A hash of a block.
    Block(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(tx: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(tx)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

impl KernelSerialize for InventoryHash {
    fn kernel_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        let (code, bytes) = match *self {
            InventoryHash::Tx(hash) => (1u32, hash.0),
            InventoryHash::Block(hash) => (2u32, hash.0),
        };
        code.kernel_serialize(&mut writer)?;
        bytes.kernel_serialize(&mut writer)?;
        Ok(())
    }
}

impl KernelDeserialize for InventoryHash {
    fn kernel_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u32::kernel_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::kernel_deserialize(&mut reader)?;
        match code {
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_round_trips() {
        for inv in &[
            InventoryHash::Tx(transaction::Hash([1; 32])),
            InventoryHash::Block(block::Hash([2; 32])),
        ] {
            let bytes = inv.kernel_serialize_to_vec().unwrap();
            assert_eq!(bytes.len(), 36);
            assert_eq!(
                InventoryHash::kernel_deserialize(&bytes[..]).unwrap(),
                *inv
            );
        }
        assert!(InventoryHash::kernel_deserialize(&[0u8; 36][..]).is_err());
    }
}
