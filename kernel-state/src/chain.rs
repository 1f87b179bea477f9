//! The chain manager: the single writer of chain state.
//!
//! `process_new_block` is serialized by the chain lock, so no reader ever
//! observes a half-applied reorganization: the UTXO set reflects exactly
//! the main chain after every completed call.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use kernel_chain::{
    amount::Amount,
    block::{self, merkle, Block, Header, Height},
    parameters::{genesis, BLOCK_VERSION, TX_VERSION},
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Input, Output, Script},
    work::difficulty::{AccumulatedWork, CompactDifficulty},
};
use kernel_consensus::{
    block as block_rules, difficulty, parameters::RESET_INTERVAL, transaction as tx_rules,
    BlockError, TransactionError,
};

use crate::{
    index::{BlockStatus, IndexEntry},
    Mempool, StateError, Store,
};

/// The main-chain tip, as published to the miner and the sync layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TipInfo {
    pub hash: block::Hash,
    pub height: Height,
}

/// Everything a miner needs to search for the next block.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub version: u32,
    pub previous_block_hash: block::Hash,
    pub height: Height,
    pub time: DateTime<Utc>,
    pub bits: CompactDifficulty,
    pub merkle_root: merkle::Root,
    /// Coinbase first.
    pub transactions: Vec<Arc<Transaction>>,
    pub total_fees: Amount,
}

impl BlockTemplate {
    pub fn header_with_nonce(&self, nonce: u32) -> Header {
        Header::new(
            self.version,
            self.previous_block_hash,
            self.merkle_root,
            self.time,
            self.bits,
            nonce,
        )
    }

    /// The assembled block once a nonce satisfies the target.
    pub fn into_block(self, nonce: u32) -> Block {
        Block {
            header: self.header_with_nonce(nonce),
            transactions: self.transactions,
        }
    }
}

pub struct ChainManager {
    store: Store,
    mempool: Mempool,
    chain_lock: Mutex<()>,
    tip_sender: watch::Sender<Option<TipInfo>>,
    // Held so the channel stays alive with zero outside subscribers.
    _tip_receiver: watch::Receiver<Option<TipInfo>>,
}

impl ChainManager {
    pub fn new(store: Store, mempool: Mempool) -> Result<Arc<ChainManager>, StateError> {
        let initial = match store.tip_entry()? {
            Some((hash, entry)) => Some(TipInfo {
                hash,
                height: entry.height,
            }),
            None => None,
        };
        let (tip_sender, tip_receiver) = watch::channel(initial);
        Ok(Arc::new(ChainManager {
            store,
            mempool,
            chain_lock: Mutex::new(()),
            tip_sender,
            _tip_receiver: tip_receiver,
        }))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// The current tip; `None` only before genesis is connected.
    pub fn tip(&self) -> Option<TipInfo> {
        *self.tip_sender.borrow()
    }

    /// Subscribe to tip changes. The miner polls this between nonce
    /// batches; the sync layer uses it to announce new blocks.
    pub fn tip_watcher(&self) -> watch::Receiver<Option<TipInfo>> {
        self.tip_sender.subscribe()
    }

    /// Create and connect the genesis block if the store is empty.
    pub fn init_genesis(&self) -> Result<(), StateError> {
        let _guard = self.chain_lock.lock().expect("chain lock poisoned");
        if self.store.tip_hash()?.is_some() {
            return Ok(());
        }

        let block = genesis::genesis_block();
        let hash = block.hash();
        info!(%hash, "no chain found, creating genesis block");

        let work = block
            .header
            .difficulty_threshold
            .to_expanded()
            .and_then(|target| target.to_work())
            .ok_or(StateError::Corrupt("genesis difficulty does not expand"))?;
        self.store.insert_block(&block)?;
        self.store.insert_index_entry(
            &hash,
            &IndexEntry {
                height: Height(0),
                prev_hash: genesis::GENESIS_PREVIOUS_BLOCK_HASH,
                total_work: AccumulatedWork::from(work),
                status: BlockStatus::Valid,
            },
        )?;
        self.store.apply_block_utxos(&block)?;
        self.store.index_block_transactions(&block)?;
        self.store.set_hash_at_height(Height(0), &hash)?;
        self.store.set_tip_hash(&hash)?;
        self.publish_tip()?;
        Ok(())
    }

    /// Verify at boot that the UTXO set reflects the main-chain tip,
    /// rebuilding it by linear replay when it does not.
    pub fn check_utxo_consistency(&self) -> Result<(), StateError> {
        let _guard = self.chain_lock.lock().expect("chain lock poisoned");
        let tip = self.store.tip_hash()?;
        let last_applied = self.store.last_applied_hash()?;
        match tip {
            Some(tip) if last_applied != Some(tip) => {
                warn!(
                    ?last_applied,
                    %tip,
                    "UTXO set is out of sync with the main chain"
                );
                self.store.rebuild_utxos()?;
            }
            _ => {
                debug!("UTXO set is in sync with the main-chain tip");
            }
        }
        Ok(())
    }

    /// Process a block from any source: the miner, a peer, or RPC
    /// `submit_block`.
    ///
    /// Returns `Ok(false)` for a block that is already known, `Ok(true)`
    /// once the block is persisted (whether it became the tip or sits on a
    /// side chain), and an error when validation rejects it.
    pub fn process_new_block(&self, block: Arc<Block>) -> Result<bool, StateError> {
        let _guard = self.chain_lock.lock().expect("chain lock poisoned");
        let hash = block.hash();
        if self.store.contains_block(&hash)? {
            debug!(%hash, "block already known, discarding");
            return Ok(false);
        }

        let parent_hash = block.header.previous_block_hash;
        let parent_entry = self
            .store
            .index_entry(&parent_hash)?
            .ok_or(BlockError::UnknownParent(hash, parent_hash))?;
        let height = parent_entry.height.next();

        block_rules::check::difficulty_is_valid(&block.header, &height, &hash)?;
        let parent_block = self
            .store
            .block(&parent_hash)?
            .ok_or(StateError::Corrupt("indexed parent has no stored block"))?;
        block_rules::check::time_is_valid_at(
            &block.header,
            parent_block.header.time,
            Utc::now(),
            &height,
            &hash,
        )?;
        block_rules::check::body_is_valid(&block, height)?;

        let work = block
            .header
            .difficulty_threshold
            .to_expanded()
            .and_then(|target| target.to_work())
            .ok_or(BlockError::InvalidDifficulty(height, hash))?;
        let entry = IndexEntry {
            height,
            prev_hash: parent_hash,
            total_work: parent_entry.total_work + work,
            status: BlockStatus::Valid,
        };
        self.store.insert_block(&block)?;
        self.store.insert_index_entry(&hash, &entry)?;
        info!(%hash, height = height.0, "accepted block");

        let (tip_hash, tip_entry) = self
            .store
            .tip_entry()?
            .ok_or(StateError::Corrupt("processing blocks with no tip"))?;
        if entry.total_work > tip_entry.total_work {
            self.reorganize(hash, tip_hash)?;
        } else {
            // Equal work keeps the current tip: first seen wins.
            debug!(%hash, "block stored on a side chain");
        }
        Ok(true)
    }

    /// Switch the main chain to `new_tip`.
    ///
    /// Both branch walks, the disconnects and the connects all happen under
    /// the chain lock held by the caller. If a connect fails midway, the
    /// already-connected prefix is unwound and the original chain is
    /// reconnected before the error surfaces.
    fn reorganize(&self, new_tip: block::Hash, old_tip: block::Hash) -> Result<(), StateError> {
        let mut new_chain = Vec::new();
        let mut old_chain = Vec::new();
        let mut cursor_new = new_tip;
        let mut cursor_old = old_tip;
        while cursor_new != cursor_old {
            let new_entry = self
                .store
                .index_entry(&cursor_new)?
                .ok_or(StateError::Corrupt("reorg walked off the index"))?;
            let old_entry = self
                .store
                .index_entry(&cursor_old)?
                .ok_or(StateError::Corrupt("reorg walked off the index"))?;
            if new_entry.height > old_entry.height {
                new_chain.push(cursor_new);
                cursor_new = new_entry.prev_hash;
            } else if new_entry.height < old_entry.height {
                old_chain.push(cursor_old);
                cursor_old = old_entry.prev_hash;
            } else {
                new_chain.push(cursor_new);
                cursor_new = new_entry.prev_hash;
                old_chain.push(cursor_old);
                cursor_old = old_entry.prev_hash;
            }
        }
        if !old_chain.is_empty() {
            info!(
                ancestor = %cursor_new,
                disconnecting = old_chain.len(),
                connecting = new_chain.len(),
                "reorganizing to a heavier chain"
            );
        }

        // Disconnect the old branch, tip toward ancestor.
        let mut disconnected = Vec::new();
        for hash in &old_chain {
            let block = self
                .store
                .block(hash)?
                .ok_or(StateError::Corrupt("indexed block missing from store"))?;
            self.disconnect_block(&block, &mut disconnected)?;
        }

        // Connect the new branch, ancestor toward tip.
        let mut connected: Vec<block::Hash> = Vec::new();
        let mut failure: Option<(block::Hash, StateError)> = None;
        for hash in new_chain.iter().rev() {
            let block = self
                .store
                .block(hash)?
                .ok_or(StateError::Corrupt("indexed block missing from store"))?;
            match self.connect_block(&block) {
                Ok(()) => connected.push(*hash),
                Err(error) => {
                    failure = Some((*hash, error));
                    break;
                }
            }
        }

        if let Some((bad_hash, error)) = failure {
            warn!(
                %bad_hash,
                %error,
                "connect failed mid-reorganization, restoring the previous chain"
            );
            if let Some(mut entry) = self.store.index_entry(&bad_hash)? {
                entry.status = BlockStatus::Invalid;
                self.store.insert_index_entry(&bad_hash, &entry)?;
            }
            for hash in connected.iter().rev() {
                let block = self
                    .store
                    .block(hash)?
                    .ok_or(StateError::Corrupt("indexed block missing from store"))?;
                self.disconnect_block(&block, &mut disconnected)?;
            }
            for hash in old_chain.iter().rev() {
                let block = self
                    .store
                    .block(hash)?
                    .ok_or(StateError::Corrupt("indexed block missing from store"))?;
                self.connect_block(&block)?;
            }
            self.store.set_tip_hash(&old_tip)?;
            self.publish_tip()?;
            return Err(error);
        }

        self.store.set_tip_hash(&new_tip)?;

        // Transactions orphaned by the switch go back to the mempool when
        // they are still valid against the new chain.
        for tx in disconnected {
            let txid = tx.hash();
            match self.mempool.admit(tx, &self.store) {
                Ok(_) => debug!(%txid, "orphaned transaction returned to mempool"),
                Err(error) => debug!(%txid, %error, "orphaned transaction dropped"),
            }
        }

        self.publish_tip()?;
        Ok(())
    }

    /// Contextually validate `block` against the current UTXO state and
    /// apply its effects.
    fn connect_block(&self, block: &Block) -> Result<(), StateError> {
        let hash = block.hash();
        let entry = self
            .store
            .index_entry(&hash)?
            .ok_or(StateError::Corrupt("connecting an unindexed block"))?;

        let mut total_fees = Amount::zero();
        for tx in block.transactions.iter().skip(1) {
            let fee = tx_rules::check::spend_is_valid(tx, &self.store)?;
            total_fees = total_fees
                .checked_add(fee)
                .map_err(TransactionError::from)?;
        }
        block_rules::subsidy::coinbase_value_is_valid(block, entry.height, total_fees)?;

        self.store.apply_block_utxos(block)?;
        self.store.index_block_transactions(block)?;
        self.store.set_hash_at_height(entry.height, &hash)?;

        let included: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
        self.mempool.remove_all(&included);

        debug!(%hash, height = entry.height.0, "connected block");
        Ok(())
    }

    /// Undo `block`'s effects, collecting its non-coinbase transactions for
    /// possible re-admission.
    fn disconnect_block(
        &self,
        block: &Block,
        disconnected: &mut Vec<Transaction>,
    ) -> Result<(), StateError> {
        let hash = block.hash();
        let entry = self
            .store
            .index_entry(&hash)?
            .ok_or(StateError::Corrupt("disconnecting an unindexed block"))?;

        self.store.undo_block_utxos(block)?;
        self.store.unindex_block_transactions(block)?;
        self.store.remove_hash_at_height(entry.height)?;

        for tx in block.transactions.iter().skip(1) {
            disconnected.push((**tx).clone());
        }

        debug!(%hash, height = entry.height.0, "disconnected block");
        Ok(())
    }

    /// Assemble a block template on the current tip: coinbase paying
    /// `miner_pub_key_hash` the subsidy plus the selected fees, mempool
    /// transactions by fee rate, bits from the retarget rule.
    pub fn build_block_template(
        &self,
        miner_pub_key_hash: &[u8; 20],
    ) -> Result<BlockTemplate, StateError> {
        let tip = self
            .tip()
            .ok_or(StateError::Corrupt("no tip to build a template on"))?;
        let parent = self
            .store
            .block(&tip.hash)?
            .ok_or(StateError::Corrupt("tip block missing from store"))?;

        let height = tip.height.next();
        let selected = self.mempool.select_for_block();

        let reward = block_rules::subsidy::block_subsidy(height)
            .checked_add(selected.total_fees)
            .map_err(kernel_consensus::SubsidyError::from)?;
        let coinbase = Transaction::new(
            TX_VERSION,
            vec![Input::new_coinbase(height, CoinbaseData::default())],
            vec![Output::new(reward, Script::new_p2pkh(miner_pub_key_hash))],
            LockTime::none(),
        );

        let mut transactions = vec![Arc::new(coinbase)];
        transactions.extend(selected.transactions.into_iter().map(Arc::new));
        let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();

        let bits = difficulty::next_difficulty(
            height,
            parent.header.difficulty_threshold,
            || self.retarget_span(height).ok().flatten(),
        );

        // Strictly after the parent, even against a skewed local clock.
        let time = std::cmp::max(Utc::now(), parent.header.time + Duration::seconds(1));

        Ok(BlockTemplate {
            version: BLOCK_VERSION,
            previous_block_hash: tip.hash,
            height,
            time,
            bits,
            merkle_root,
            transactions,
            total_fees: selected.total_fees,
        })
    }

    /// The observed seconds between the parent block and the block
    /// `RESET_INTERVAL` below the candidate height, both on the main chain.
    fn retarget_span(&self, height: Height) -> Result<Option<i64>, StateError> {
        let start_height = match height.0.checked_sub(RESET_INTERVAL) {
            Some(start) => Height(start),
            None => return Ok(None),
        };
        let start = match self.store.block_at_height(start_height)? {
            Some(block) => block,
            None => return Ok(None),
        };
        let parent = match self.store.block_at_height(Height(height.0 - 1))? {
            Some(block) => block,
            None => return Ok(None),
        };
        Ok(Some(
            parent.header.time.timestamp() - start.header.time.timestamp(),
        ))
    }

    fn publish_tip(&self) -> Result<(), StateError> {
        let info = match self.store.tip_entry()? {
            Some((hash, entry)) => Some(TipInfo {
                hash,
                height: entry.height,
            }),
            None => None,
        };
        // The held receiver keeps the channel open, so a send cannot fail.
        let _ = self.tip_sender.send(info);
        Ok(())
    }
}
