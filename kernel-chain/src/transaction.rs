//! Transactions and transaction-related structures.

use kernel_serde_derive::KernelSerialize;

use crate::KernelSerialize;
use crate::{cached::Cached, compactint::CompactInt};

mod hash;
mod lock_time;
mod serialize;
mod sighash;


pub use hash::Hash;
pub use lock_time::LockTime;
pub use sighash::{SigHash, SighashError, SIGHASH_ALL};

use crate::transparent;

/// A Kernel transaction.
///
/// A transaction is an encoded data structure that facilitates the transfer
/// of value between two public key addresses. Everything is designed to
/// ensure that transactions can be created, propagated on the network,
/// validated, and finally added to the global ledger of transactions (the
/// blockchain).
#[derive(Clone, Debug, PartialEq, Eq, KernelSerialize)]
pub struct Transaction {
    /// The transaction version.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// The transaction lock time.
    pub lock_time: LockTime,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        lock_time: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        }
    }

    /// Get the identifier of this transaction.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate and return the hash
        Hash::from(self)
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    /// Returns the serialized length (in bytes) of this transaction.
    pub fn serialized_len(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.serialized_len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.serialized_len();
        }
        size + 4
    }
}
