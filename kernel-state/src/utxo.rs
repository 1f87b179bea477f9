//! The unspent-output entry format.
//!
//! The UTXO store maps a transaction id to the outputs of that transaction
//! that are still unspent. Spending removes individual outputs; when the
//! last one goes, the whole entry goes.

use kernel_serde_derive::{KernelDeserialize, KernelSerialize};

use kernel_chain::{
    transaction::Transaction,
    transparent::Output,
    KernelDeserialize, KernelSerialize, SerializationError,
};

/// The surviving outputs of one transaction, keyed by output index.
#[derive(Clone, Debug, Eq, PartialEq, Default, KernelSerialize, KernelDeserialize)]
pub struct UtxoEntry {
    outputs: Vec<(u32, Output)>,
}

impl UtxoEntry {
    /// A fresh entry containing every output of `tx`.
    pub fn from_transaction(tx: &Transaction) -> UtxoEntry {
        UtxoEntry {
            outputs: tx
                .outputs
                .iter()
                .enumerate()
                .map(|(index, output)| (index as u32, output.clone()))
                .collect(),
        }
    }

    pub fn output(&self, index: u32) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, output)| output)
    }

    /// Remove and return the output at `index`.
    pub fn spend(&mut self, index: u32) -> Option<Output> {
        let position = self.outputs.iter().position(|(i, _)| *i == index)?;
        Some(self.outputs.remove(position).1)
    }

    /// Re-insert an output at `index`, keeping the list ordered.
    pub fn restore(&mut self, index: u32, output: Output) {
        if self.output(index).is_some() {
            return;
        }
        let position = self
            .outputs
            .iter()
            .position(|(i, _)| *i > index)
            .unwrap_or(self.outputs.len());
        self.outputs.insert(position, (index, output));
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Output)> {
        self.outputs.iter().map(|(i, output)| (*i, output))
    }
}
