//! Errors that can occur while checking consensus rules.
//!
//! Each error includes enough context to know *which* rule was violated,
//! so peers relaying a bad object can be logged usefully without being
//! dropped (an honest peer may relay an invalid block).

use chrono::{DateTime, Utc};
use thiserror::Error;

use kernel_chain::{
    amount::AmountError,
    block::{Hash, Height},
    transaction,
    transparent::OutPoint,
    work::difficulty::CompactDifficulty,
};

use crate::script::ScriptError;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("transaction is larger than a block")]
    OversizedTransaction,

    #[error("coinbase transaction found where one is not allowed")]
    UnexpectedCoinbase,

    #[error("transaction mixes a coinbase input with other inputs")]
    CoinbaseInputFound,

    #[error("first transaction in a block must be a coinbase")]
    CoinbasePosition,

    #[error("previous output {0:?} was not found in the UTXO set")]
    MissingPreviousOutput(OutPoint),

    #[error("previous output {0:?} is spent by another mempool transaction")]
    SpentInMempool(OutPoint),

    #[error("transaction {0:?} is already in the mempool")]
    AlreadyInMempool(transaction::Hash),

    #[error("outputs ({outputs}) exceed the value of the referenced inputs ({inputs})")]
    ValueOverspend { inputs: u64, outputs: u64 },

    #[error("input {input_index} failed script verification: {source}")]
    Script {
        input_index: usize,
        source: ScriptError,
    },

    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] AmountError),
}

#[derive(Error, Debug)]
pub enum SubsidyError {
    #[error("block has no coinbase transaction")]
    NoCoinbase,

    #[error("coinbase claims {claimed} but only {allowed} (subsidy + fees) is allowed")]
    ExcessiveCoinbase { claimed: u64, allowed: u64 },

    #[error("fee calculation referenced an unknown output {0:?}")]
    MissingFeeInput(OutPoint),

    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] AmountError),
}

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("block {0:?} is already known")]
    AlreadyInChain(Hash),

    #[error("block {0:?} has unknown parent {1:?}")]
    UnknownParent(Hash, Hash),

    #[error("invalid difficulty encoding in block {1:?} at height {0:?}")]
    InvalidDifficulty(Height, Hash),

    #[error("block {1:?} at height {0:?} failed the difficulty filter: hash does not fall below target {2:?}")]
    DifficultyFilter(Height, Hash, CompactDifficulty),

    #[error("block {1:?} at height {0:?} has timestamp {2:?}, which is not after its parent's timestamp {3:?}")]
    TimeBeforeParent(Height, Hash, DateTime<Utc>, DateTime<Utc>),

    #[error("block time is too far in the future: {0}")]
    Time(#[from] kernel_chain::block::BlockTimeError),

    #[error("block {0:?} has a coinbase height of {1:?}, but sits at height {2:?}")]
    CoinbaseHeightMismatch(Hash, Option<Height>, Height),

    #[error("computed Merkle root {actual:?} does not match header {expected:?}")]
    BadMerkleRoot {
        actual: kernel_chain::block::merkle::Root,
        expected: kernel_chain::block::merkle::Root,
    },

    #[error("block contains duplicate transactions")]
    DuplicateTransaction,

    #[error("two inputs in the block spend the same previous output {0:?}")]
    DuplicateSpend(OutPoint),

    #[error("block of {0} bytes exceeds the {1} byte limit")]
    OversizedBlock(usize, u64),

    #[error("invalid transaction in block: {0}")]
    Transaction(#[from] TransactionError),

    #[error("invalid block subsidy: {0}")]
    Subsidy(#[from] SubsidyError),
}
