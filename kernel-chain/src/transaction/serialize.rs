//! Deserialization for transactions, kept in one place so the size cap and
//! hash caching stay together.

use std::io::Read;

use crate::serialization::{KernelDeserialize, SerializationError};

use super::*;

/// The maximum size of a transaction, in bytes: a transaction can at most
/// fill its block.
pub const MAX_TX_SIZE: u64 = crate::block::MAX_BLOCK_BYTES;

/// Deserializes a transaction, calculating and caching its identifier.
impl KernelDeserialize for Transaction {
    fn kernel_deserialize<R: Read>(src: R) -> Result<Self, SerializationError> {
        // A transaction larger than a block can only be garbage; cut it off
        // before it allocates anything interesting.
        let mut src = src.take(MAX_TX_SIZE);
        let version = u32::kernel_deserialize(&mut src)?;
        let inputs = <Vec<transparent::Input>>::kernel_deserialize(&mut src)?;
        let outputs = <Vec<transparent::Output>>::kernel_deserialize(&mut src)?;
        let lock_time = LockTime::kernel_deserialize(&mut src)?;
        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        };
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
