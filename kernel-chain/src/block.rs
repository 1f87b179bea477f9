//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

use crate::compactint::CompactInt;
use crate::{transaction, transparent};

pub use hash::Hash;
pub use header::{BlockTimeError, Header};
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

/// A Kernel block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions; the first must be the coinbase.
    pub transactions: Vec<Arc<transaction::Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }
        fmter.field("hash", &self.hash()).finish()
    }
}

impl Block {
    /// Return the block height reported in the coinbase transaction, if any.
    pub fn coinbase_height(&self) -> Option<Height> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { height, .. } => *height,
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(&self.header)
    }

    /// The length of the canonical serialization in bytes, without
    /// serializing.
    pub fn serialized_len(&self) -> usize {
        Header::len()
            + CompactInt::size(self.transactions.len())
            + self
                .transactions
                .iter()
                .map(|tx| tx.serialized_len())
                .sum::<usize>()
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
