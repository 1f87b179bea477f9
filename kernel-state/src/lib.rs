//! Persistent chain state for the Kernel node.
//!
//! The state is a set of sled trees under one data directory:
//!
//! - `block_by_hash`: every block ever accepted, keyed by header hash;
//! - `index_by_hash`: per-block metadata (height, parent, accumulated work,
//!   validity), plus the reserved main-chain-tip key;
//! - `hash_by_height`: the main chain only, rewritten as the tip moves;
//! - `utxo_by_tx`: the unspent outputs of each transaction with any left,
//!   plus the reserved last-applied-block key;
//! - `mempool_by_tx`: validated but unmined transactions, cleared on boot;
//! - `tx_by_hash`: transaction id → containing main-chain block.
//!
//! The [`chain::ChainManager`] owns all mutation; everything else is reads.

pub mod chain;
pub mod index;
pub mod mempool;
pub mod store;
pub mod utxo;

use std::path::PathBuf;

use thiserror::Error;

use kernel_chain::SerializationError;
use kernel_consensus::{BlockError, SubsidyError, TransactionError};

pub use chain::{BlockTemplate, ChainManager, TipInfo};
pub use mempool::{Mempool, MempoolEntry, TemplateTransactions};
pub use store::Store;

/// Configuration for the state service.
#[derive(Clone, Debug)]
pub struct Config {
    /// The root directory for all sled trees.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Config {
        Config {
            data_dir: data_dir.into(),
        }
    }

    pub(crate) fn sled_config(&self) -> sled::Config {
        sled::Config::new().path(self.data_dir.join("chainstate"))
    }
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),

    #[error("stored value failed to decode: {0}")]
    Serialization(#[from] SerializationError),

    #[error("block failed validation: {0}")]
    Block(#[from] BlockError),

    #[error("transaction failed validation: {0}")]
    Transaction(#[from] TransactionError),

    #[error("subsidy check failed: {0}")]
    Subsidy(#[from] SubsidyError),

    #[error("state corruption: {0}")]
    Corrupt(&'static str),
}
