//! The mempool: validated transactions waiting to be mined.
//!
//! The authoritative set lives in memory behind the mempool lock; writes
//! are mirrored into the `mempool_by_tx` tree so a running node can be
//! inspected, and the tree is cleared on every boot.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use kernel_serde_derive::{KernelDeserialize, KernelSerialize};
use tracing::{debug, info};

use kernel_chain::{
    amount::Amount,
    block::{Header, MAX_BLOCK_BYTES},
    compactint::CompactInt,
    transaction::{self, Transaction},
    transparent::OutPoint,
    KernelDeserialize, KernelSerialize, SerializationError,
};
use kernel_consensus::{transaction as tx_check, TransactionError};

use crate::{Store, StateError};

/// Bytes held back from transaction selection for the coinbase the miner
/// will prepend.
const COINBASE_RESERVED_BYTES: usize = 1_000;

/// One admitted transaction.
#[derive(Clone, Debug, Eq, PartialEq, KernelSerialize, KernelDeserialize)]
pub struct MempoolEntry {
    pub transaction: Transaction,
    pub fee: Amount,
    /// Unix seconds at admission.
    pub received_at: i64,
}

impl MempoolEntry {
    /// Fee per serialized byte, for template ordering.
    fn fee_rate(&self) -> u64 {
        self.fee.base_units() / self.transaction.serialized_len().max(1) as u64
    }
}

/// The transactions selected for a block template.
#[derive(Clone, Debug)]
pub struct TemplateTransactions {
    pub transactions: Vec<Transaction>,
    pub tx_ids: Vec<transaction::Hash>,
    pub total_fees: Amount,
    /// Running size including the header and the reserved coinbase room.
    pub size: usize,
}

#[derive(Clone)]
pub struct Mempool {
    entries: Arc<Mutex<BTreeMap<transaction::Hash, MempoolEntry>>>,
    tree: sled::Tree,
}

impl Mempool {
    /// A mempool mirroring into `store`'s mempool tree. Clears anything a
    /// previous run left behind.
    pub fn new(store: &Store) -> Result<Mempool, StateError> {
        let tree = store.mempool_tree();
        let stale = tree.len();
        tree.clear()?;
        if stale > 0 {
            info!(stale, "cleared persisted mempool from previous run");
        }
        Ok(Mempool {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            tree,
        })
    }

    /// Admit a transaction.
    ///
    /// Rules, in order: not a coinbase; not already present; no input
    /// conflicts with an existing entry (no replacement policy); inputs
    /// exist in the UTXO set, values conserve, and every unlock script
    /// verifies. Returns the fee on success.
    pub fn admit(&self, tx: Transaction, store: &Store) -> Result<Amount, StateError> {
        let txid = tx.hash();
        if tx.is_coinbase() {
            return Err(TransactionError::UnexpectedCoinbase.into());
        }

        let mut entries = self.entries.lock().expect("mempool lock poisoned");
        if entries.contains_key(&txid) {
            return Err(TransactionError::AlreadyInMempool(txid).into());
        }
        for (_, entry) in entries.iter() {
            for outpoint in tx_check::check::spent_outpoints(&entry.transaction) {
                if tx_check::check::spent_outpoints(&tx).any(|spend| spend == outpoint) {
                    return Err(TransactionError::SpentInMempool(outpoint).into());
                }
            }
        }

        let fee = tx_check::check::spend_is_valid(&tx, store)?;
        let entry = MempoolEntry {
            transaction: tx,
            fee,
            received_at: Utc::now().timestamp(),
        };
        self.tree.insert(
            txid.0.to_vec(),
            entry
                .kernel_serialize_to_vec()
                .expect("serializing to a vec never fails"),
        )?;
        entries.insert(txid, entry);
        debug!(%txid, fee = fee.base_units(), "transaction admitted to mempool");
        Ok(fee)
    }

    pub fn contains(&self, txid: &transaction::Hash) -> bool {
        self.entries
            .lock()
            .expect("mempool lock poisoned")
            .contains_key(txid)
    }

    pub fn transaction(&self, txid: &transaction::Hash) -> Option<Transaction> {
        self.entries
            .lock()
            .expect("mempool lock poisoned")
            .get(txid)
            .map(|entry| entry.transaction.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("mempool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Does any entry spend `outpoint`?
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        let entries = self.entries.lock().expect("mempool lock poisoned");
        entries.values().any(|entry| {
            tx_check::check::spent_outpoints(&entry.transaction).any(|spend| spend == *outpoint)
        })
    }

    /// Every outpoint spent by some entry; the wallet avoids these when
    /// selecting coins.
    pub fn spent_outpoints(&self) -> Vec<OutPoint> {
        let entries = self.entries.lock().expect("mempool lock poisoned");
        entries
            .values()
            .flat_map(|entry| {
                tx_check::check::spent_outpoints(&entry.transaction).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Drop the given transactions (because a block containing them
    /// connected).
    pub fn remove_all(&self, tx_ids: &[transaction::Hash]) {
        let mut entries = self.entries.lock().expect("mempool lock poisoned");
        for txid in tx_ids {
            if entries.remove(txid).is_some() {
                let _ = self.tree.remove(&txid.0);
            }
        }
    }

    /// Select transactions for a block template: highest fee-per-byte
    /// first, skipping entries that conflict with an already-selected spend,
    /// stopping before the block size limit (less the coinbase reserve).
    ///
    /// Selection order is a policy choice, not a consensus rule.
    pub fn select_for_block(&self) -> TemplateTransactions {
        let entries = self.entries.lock().expect("mempool lock poisoned");
        let mut by_fee_rate: Vec<&MempoolEntry> = entries.values().collect();
        by_fee_rate.sort_by(|a, b| b.fee_rate().cmp(&a.fee_rate()));

        let budget = MAX_BLOCK_BYTES as usize - COINBASE_RESERVED_BYTES;
        let mut size = Header::len() + CompactInt::size(by_fee_rate.len() + 1);
        let mut selected_spends: Vec<OutPoint> = Vec::new();
        let mut template = TemplateTransactions {
            transactions: Vec::new(),
            tx_ids: Vec::new(),
            total_fees: Amount::zero(),
            size: 0,
        };

        for entry in by_fee_rate {
            let tx_size = entry.transaction.serialized_len();
            if size + tx_size > budget {
                break;
            }
            let spends: Vec<OutPoint> =
                tx_check::check::spent_outpoints(&entry.transaction).collect();
            if spends
                .iter()
                .any(|outpoint| selected_spends.contains(outpoint))
            {
                continue;
            }
            selected_spends.extend(spends);
            size += tx_size;
            template.total_fees = template
                .total_fees
                .checked_add(entry.fee)
                .unwrap_or(template.total_fees);
            template.tx_ids.push(entry.transaction.hash());
            template.transactions.push(entry.transaction.clone());
        }
        template.size = size;
        template
    }

    /// All entries, oldest-admission first, for inspection surfaces.
    pub fn entries(&self) -> Vec<(transaction::Hash, MempoolEntry)> {
        let entries = self.entries.lock().expect("mempool lock poisoned");
        let mut all: Vec<_> = entries
            .iter()
            .map(|(txid, entry)| (*txid, entry.clone()))
            .collect();
        all.sort_by_key(|(_, entry)| entry.received_at);
        all
    }
}
