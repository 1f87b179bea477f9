//! The sled-backed store: typed access to every tree, plus the UTXO
//! apply/undo/rebuild primitives.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, trace};

use kernel_chain::{
    amount::Amount,
    block::{self, Block, Header, Height},
    transaction::{self, Transaction},
    transparent::{self, OutPoint},
    KernelDeserialize, KernelSerialize,
};
use kernel_consensus::CoinView;

use crate::{index::IndexEntry, utxo::UtxoEntry, Config, StateError};

/// The reserved main-chain-tip key in the index tree. Shorter than any
/// 32-byte hash key, so it can never collide.
const TIP_KEY: &[u8] = b"__main_chain_tip";

/// The reserved key in the UTXO tree holding the hash of the block whose
/// effects were applied last. Committed in the same batch as the effects
/// themselves; a mismatch against the tip at boot means a rebuild.
const LAST_APPLIED_KEY: &[u8] = b"__last_applied";

/// Handles to every tree. Cheap to clone; all clones share the same
/// underlying database.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    blocks: sled::Tree,
    index: sled::Tree,
    hash_by_height: sled::Tree,
    utxo: sled::Tree,
    mempool: sled::Tree,
    tx_index: sled::Tree,
}

fn get_typed<V: KernelDeserialize>(
    tree: &sled::Tree,
    key: &[u8],
) -> Result<Option<V>, StateError> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(V::kernel_deserialize(&bytes[..])?)),
        None => Ok(None),
    }
}

fn insert_typed<V: KernelSerialize>(
    tree: &sled::Tree,
    key: &[u8],
    value: &V,
) -> Result<(), StateError> {
    let bytes = value
        .kernel_serialize_to_vec()
        .expect("serializing to a vec never fails");
    tree.insert(key, bytes)?;
    Ok(())
}

fn height_key(height: Height) -> [u8; 4] {
    height.0.to_be_bytes()
}

impl Store {
    pub fn open(config: &Config) -> Result<Store, StateError> {
        let db = config.sled_config().open()?;
        let store = Store {
            blocks: db.open_tree(b"block_by_hash")?,
            index: db.open_tree(b"index_by_hash")?,
            hash_by_height: db.open_tree(b"hash_by_height")?,
            utxo: db.open_tree(b"utxo_by_tx")?,
            mempool: db.open_tree(b"mempool_by_tx")?,
            tx_index: db.open_tree(b"tx_by_hash")?,
            db,
        };
        Ok(store)
    }

    pub fn flush(&self) -> Result<(), StateError> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn mempool_tree(&self) -> sled::Tree {
        self.mempool.clone()
    }

    // ---- blocks ----

    pub fn contains_block(&self, hash: &block::Hash) -> Result<bool, StateError> {
        Ok(self.blocks.contains_key(&hash.0)?)
    }

    pub fn block(&self, hash: &block::Hash) -> Result<Option<Arc<Block>>, StateError> {
        Ok(get_typed::<Block>(&self.blocks, &hash.0)?.map(Arc::new))
    }

    pub fn insert_block(&self, block: &Block) -> Result<(), StateError> {
        insert_typed(&self.blocks, &block.hash().0, block)
    }

    // ---- index ----

    pub fn index_entry(&self, hash: &block::Hash) -> Result<Option<IndexEntry>, StateError> {
        get_typed(&self.index, &hash.0)
    }

    pub fn insert_index_entry(
        &self,
        hash: &block::Hash,
        entry: &IndexEntry,
    ) -> Result<(), StateError> {
        insert_typed(&self.index, &hash.0, entry)
    }

    pub fn tip_hash(&self) -> Result<Option<block::Hash>, StateError> {
        get_typed(&self.index, TIP_KEY)
    }

    pub fn set_tip_hash(&self, hash: &block::Hash) -> Result<(), StateError> {
        insert_typed(&self.index, TIP_KEY, hash)
    }

    /// The tip's index entry; `None` before genesis is connected.
    pub fn tip_entry(&self) -> Result<Option<(block::Hash, IndexEntry)>, StateError> {
        let hash = match self.tip_hash()? {
            Some(hash) => hash,
            None => return Ok(None),
        };
        let entry = self
            .index_entry(&hash)?
            .ok_or(StateError::Corrupt("tip hash has no index entry"))?;
        Ok(Some((hash, entry)))
    }

    // ---- main-chain height index ----

    pub fn hash_at_height(&self, height: Height) -> Result<Option<block::Hash>, StateError> {
        get_typed(&self.hash_by_height, &height_key(height))
    }

    pub fn set_hash_at_height(
        &self,
        height: Height,
        hash: &block::Hash,
    ) -> Result<(), StateError> {
        insert_typed(&self.hash_by_height, &height_key(height), hash)
    }

    pub fn remove_hash_at_height(&self, height: Height) -> Result<(), StateError> {
        self.hash_by_height.remove(&height_key(height))?;
        Ok(())
    }

    pub fn block_at_height(&self, height: Height) -> Result<Option<Arc<Block>>, StateError> {
        match self.hash_at_height(height)? {
            Some(hash) => self.block(&hash),
            None => Ok(None),
        }
    }

    /// Main-chain headers strictly after `locator`, oldest first, up to
    /// `max`. Empty when the locator is unknown or off the main chain.
    pub fn headers_after(
        &self,
        locator: &block::Hash,
        max: usize,
    ) -> Result<Vec<Header>, StateError> {
        let entry = match self.index_entry(locator)? {
            Some(entry) => entry,
            None => return Ok(Vec::new()),
        };
        if self.hash_at_height(entry.height)? != Some(*locator) {
            return Ok(Vec::new());
        }
        let mut headers = Vec::new();
        let mut height = entry.height.next();
        while headers.len() < max {
            let hash = match self.hash_at_height(height)? {
                Some(hash) => hash,
                None => break,
            };
            let block = self
                .block(&hash)?
                .ok_or(StateError::Corrupt("main-chain hash has no block"))?;
            headers.push(block.header);
            height = height.next();
        }
        Ok(headers)
    }

    // ---- transaction index ----

    pub fn tx_location(
        &self,
        txid: &transaction::Hash,
    ) -> Result<Option<block::Hash>, StateError> {
        get_typed(&self.tx_index, &txid.0)
    }

    pub fn index_block_transactions(&self, block: &Block) -> Result<(), StateError> {
        let hash = block.hash();
        let mut batch = sled::Batch::default();
        for tx in &block.transactions {
            batch.insert(
                tx.hash().0.to_vec(),
                hash.kernel_serialize_to_vec()
                    .expect("serializing to a vec never fails"),
            );
        }
        self.tx_index.apply_batch(batch)?;
        Ok(())
    }

    pub fn unindex_block_transactions(&self, block: &Block) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();
        for tx in &block.transactions {
            batch.remove(tx.hash().0.to_vec());
        }
        self.tx_index.apply_batch(batch)?;
        Ok(())
    }

    /// Look a transaction up through the index: the transaction and the
    /// main-chain block that contains it.
    pub fn transaction_by_id(
        &self,
        txid: &transaction::Hash,
    ) -> Result<Option<(Transaction, block::Hash)>, StateError> {
        let location = match self.tx_location(txid)? {
            Some(location) => location,
            None => return Ok(None),
        };
        let block = self
            .block(&location)?
            .ok_or(StateError::Corrupt("tx index points at a missing block"))?;
        for tx in &block.transactions {
            if tx.hash() == *txid {
                return Ok(Some(((**tx).clone(), location)));
            }
        }
        Err(StateError::Corrupt("tx index points at the wrong block"))
    }

    // ---- UTXO set ----

    pub fn utxo_entry(
        &self,
        txid: &transaction::Hash,
    ) -> Result<Option<UtxoEntry>, StateError> {
        get_typed(&self.utxo, &txid.0)
    }

    /// The hash of the block whose effects the UTXO set reflects.
    pub fn last_applied_hash(&self) -> Result<Option<block::Hash>, StateError> {
        get_typed(&self.utxo, LAST_APPLIED_KEY)
    }

    /// Apply a block's spend/create effects to the UTXO set, committing the
    /// last-applied marker in the same atomic batch.
    ///
    /// The block must already be fully validated: a spend of a missing
    /// output here is corruption, not a verdict.
    pub fn apply_block_utxos(&self, block: &Block) -> Result<(), StateError> {
        let mut staged: HashMap<transaction::Hash, Option<UtxoEntry>> = HashMap::new();
        for tx in &block.transactions {
            for input in &tx.inputs {
                if let Some(outpoint) = input.outpoint() {
                    let mut entry = self
                        .staged_entry(&staged, &outpoint.hash)?
                        .ok_or(StateError::Corrupt("spend references a missing UTXO entry"))?;
                    entry
                        .spend(outpoint.index)
                        .ok_or(StateError::Corrupt("spend references a missing output"))?;
                    let update = if entry.is_empty() { None } else { Some(entry) };
                    staged.insert(outpoint.hash, update);
                }
            }
            staged.insert(tx.hash(), Some(UtxoEntry::from_transaction(tx)));
        }
        self.commit_utxo_changes(staged, &block.hash())
    }

    /// Undo a block's effects: drop the entries it created and restore the
    /// outputs it spent, reading them back out of the block store through
    /// the transaction index.
    pub fn undo_block_utxos(&self, block: &Block) -> Result<(), StateError> {
        let mut staged: HashMap<transaction::Hash, Option<UtxoEntry>> = HashMap::new();
        for tx in &block.transactions {
            staged.insert(tx.hash(), None);
        }
        for tx in block.transactions.iter().skip(1) {
            for input in &tx.inputs {
                if let Some(outpoint) = input.outpoint() {
                    let restored = self.output_from_stored_tx(&outpoint)?;
                    let mut entry = self
                        .staged_entry(&staged, &outpoint.hash)?
                        .unwrap_or_default();
                    entry.restore(outpoint.index, restored);
                    staged.insert(outpoint.hash, Some(entry));
                }
            }
        }
        self.commit_utxo_changes(staged, &block.header.previous_block_hash)
    }

    /// Rebuild the whole UTXO set by replaying the main chain from genesis.
    pub fn rebuild_utxos(&self) -> Result<(), StateError> {
        info!("rebuilding UTXO set from the main chain");
        self.utxo.clear()?;
        let mut height = Height(0);
        while let Some(block) = self.block_at_height(height)? {
            self.apply_block_utxos(&block)?;
            height = height.next();
        }
        info!(entries = self.utxo.len(), "UTXO set rebuilt");
        Ok(())
    }

    fn staged_entry(
        &self,
        staged: &HashMap<transaction::Hash, Option<UtxoEntry>>,
        txid: &transaction::Hash,
    ) -> Result<Option<UtxoEntry>, StateError> {
        match staged.get(txid) {
            Some(entry) => Ok(entry.clone()),
            None => self.utxo_entry(txid),
        }
    }

    fn commit_utxo_changes(
        &self,
        staged: HashMap<transaction::Hash, Option<UtxoEntry>>,
        last_applied: &block::Hash,
    ) -> Result<(), StateError> {
        let mut batch = sled::Batch::default();
        for (txid, entry) in staged {
            match entry {
                Some(entry) => batch.insert(
                    txid.0.to_vec(),
                    entry
                        .kernel_serialize_to_vec()
                        .expect("serializing to a vec never fails"),
                ),
                None => batch.remove(txid.0.to_vec()),
            }
        }
        batch.insert(
            LAST_APPLIED_KEY,
            last_applied
                .kernel_serialize_to_vec()
                .expect("serializing to a vec never fails"),
        );
        self.utxo.apply_batch(batch)?;
        trace!(%last_applied, "UTXO batch committed");
        Ok(())
    }

    fn output_from_stored_tx(&self, outpoint: &OutPoint) -> Result<transparent::Output, StateError> {
        let (tx, _) = self
            .transaction_by_id(&outpoint.hash)?
            .ok_or(StateError::Corrupt("missing parent transaction during disconnect"))?;
        tx.outputs
            .get(outpoint.index as usize)
            .cloned()
            .ok_or(StateError::Corrupt("parent transaction lacks the spent output"))
    }

    /// Iterate every UTXO entry (skipping the reserved metadata key).
    fn utxo_entries(
        &self,
    ) -> impl Iterator<Item = Result<(transaction::Hash, UtxoEntry), StateError>> {
        self.utxo.iter().filter_map(|item| match item {
            Err(e) => Some(Err(StateError::from(e))),
            Ok((key, value)) => {
                if key.len() != 32 {
                    return None;
                }
                let mut txid = [0u8; 32];
                txid.copy_from_slice(&key);
                match UtxoEntry::kernel_deserialize(&value[..]) {
                    Ok(entry) => Some(Ok((transaction::Hash(txid), entry))),
                    Err(e) => Some(Err(StateError::from(e))),
                }
            }
        })
    }

    /// Confirmed balance: the sum of unspent P2PKH outputs paying
    /// `pub_key_hash`.
    pub fn balance_by_pub_key_hash(&self, pub_key_hash: &[u8; 20]) -> Result<Amount, StateError> {
        let mut balance = Amount::zero();
        for item in self.utxo_entries() {
            let (_, entry) = item?;
            for (_, output) in entry.iter() {
                if output.lock_script.p2pkh_pub_key_hash().as_ref() == Some(pub_key_hash) {
                    balance = balance
                        .checked_add(output.value)
                        .map_err(kernel_consensus::TransactionError::from)?;
                }
            }
        }
        Ok(balance)
    }

    /// Every unspent outpoint paying `pub_key_hash`, with its value.
    pub fn spendable_outputs(
        &self,
        pub_key_hash: &[u8; 20],
    ) -> Result<Vec<(OutPoint, Amount)>, StateError> {
        let mut spendable = Vec::new();
        for item in self.utxo_entries() {
            let (txid, entry) = item?;
            for (index, output) in entry.iter() {
                if output.lock_script.p2pkh_pub_key_hash().as_ref() == Some(pub_key_hash) {
                    spendable.push((OutPoint { hash: txid, index }, output.value));
                }
            }
        }
        Ok(spendable)
    }

    /// The full UTXO set, sorted by transaction id. For consistency checks
    /// and inspection; not on any hot path.
    pub fn utxo_snapshot(
        &self,
    ) -> Result<Vec<(transaction::Hash, UtxoEntry)>, StateError> {
        let mut snapshot = self.utxo_entries().collect::<Result<Vec<_>, _>>()?;
        snapshot.sort_by_key(|(txid, _)| *txid);
        Ok(snapshot)
    }

    pub fn utxo_entry_count(&self) -> usize {
        // Exclude the reserved metadata key when present.
        let len = self.utxo.len();
        match self.utxo.contains_key(LAST_APPLIED_KEY) {
            Ok(true) => len - 1,
            _ => len,
        }
    }
}

impl CoinView for Store {
    fn unspent_output(&self, outpoint: &OutPoint) -> Option<transparent::Output> {
        self.utxo_entry(&outpoint.hash)
            .ok()
            .flatten()
            .and_then(|entry| entry.output(outpoint.index).cloned())
    }
}
