use std::{convert::TryInto, io::Read, sync::Arc};

use crate::{
    compactint::CompactInt,
    serialization::{KernelDeserialize, KernelSerialize, SerializationError},
    transaction::Transaction,
};

use super::{Block, Header};

/// The maximum size of a serialized block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 1_000_000;

impl KernelSerialize for Block {
    fn kernel_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.header.kernel_serialize(&mut writer)?;
        self.transactions.kernel_serialize(&mut writer)?;
        Ok(())
    }
}

impl KernelDeserialize for Block {
    fn kernel_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        // If the limit is reached mid-transaction, we'll get an UnexpectedEof.
        let mut limited_reader = reader.take(MAX_BLOCK_BYTES);
        let header = Header::kernel_deserialize(&mut limited_reader)?;

        let tx_count = CompactInt::kernel_deserialize(&mut limited_reader)?.value();
        // Sanity check the number of transactions to prevent DOS attacks:
        // every transaction needs at least one 36-byte outpoint.
        if tx_count > MAX_BLOCK_BYTES / 36 {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit in a block",
            ));
        }
        let mut transactions = Vec::with_capacity(
            tx_count
                .try_into()
                .expect("tx_count is bounded by MAX_BLOCK_BYTES / 36"),
        );
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::kernel_deserialize(&mut limited_reader)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
