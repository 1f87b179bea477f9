//! The signature-hash construction for transparent spends.

use thiserror::Error;

use crate::serialization::{sha256d, KernelSerialize};
use crate::transparent::{Input, Script};

use super::Transaction;

/// The only signature-hash type this chain supports: sign all inputs and all
/// outputs. Appended to the preimage as 4 little-endian bytes and to the
/// signature itself as a single trailing byte.
pub const SIGHASH_ALL: u32 = 1;

/// The 32-byte digest a spender signs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SigHash(pub [u8; 32]);

impl AsRef<[u8]> for SigHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SighashError {
    #[error("signature hash requested for input {0}, but the transaction has {1} inputs")]
    InputIndexOutOfRange(usize, usize),
    #[error("coinbase inputs do not have signature hashes")]
    CoinbaseInput,
}

impl Transaction {
    /// Compute the digest signed by the owner of `input_index`'s referenced
    /// output.
    ///
    /// The preimage is this transaction with every input script blanked
    /// except the one being signed, which instead carries the lock script of
    /// the output it spends, followed by the 4-byte sighash type.
    pub fn sighash(
        &self,
        input_index: usize,
        lock_script: &Script,
    ) -> Result<SigHash, SighashError> {
        if input_index >= self.inputs.len() {
            return Err(SighashError::InputIndexOutOfRange(
                input_index,
                self.inputs.len(),
            ));
        }

        let mut writer = sha256d::Writer::default();
        self.version
            .kernel_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        let empty = Script::empty();
        let mut blanked_inputs = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            match input {
                Input::PrevOut {
                    outpoint, sequence, ..
                } => {
                    let script = if i == input_index {
                        lock_script.clone()
                    } else {
                        empty.clone()
                    };
                    blanked_inputs.push(Input::PrevOut {
                        outpoint: *outpoint,
                        unlock_script: script,
                        sequence: *sequence,
                    });
                }
                Input::Coinbase { .. } => return Err(SighashError::CoinbaseInput),
            }
        }
        blanked_inputs
            .kernel_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        self.outputs
            .kernel_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        self.lock_time
            .kernel_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        SIGHASH_ALL
            .kernel_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");

        Ok(SigHash(writer.finish()))
    }
}
