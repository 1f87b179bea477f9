//! Consensus check functions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use kernel_chain::{
    block::{Block, Hash, Header, Height, MAX_BLOCK_BYTES},
    transaction,
    transparent,
};

use crate::error::*;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `block`,
/// and that coinbase transaction is the first transaction in the block.
///
/// The first (and only the first) transaction in a block is a coinbase
/// transaction, which collects and spends the miner subsidy and the
/// transaction fees paid by transactions included in this block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition.into());
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound.into());
    }

    Ok(())
}

/// Returns `Ok(())` if the coinbase's leading script push encodes exactly
/// `height`.
pub fn coinbase_height_matches(block: &Block, height: Height) -> Result<(), BlockError> {
    let reported = block.coinbase_height();
    if reported == Some(height) {
        Ok(())
    } else {
        Err(BlockError::CoinbaseHeightMismatch(
            block.hash(),
            reported,
            height,
        ))
    }
}

/// Returns `Ok(())` if `hash` passes the difficulty filter for the target
/// carried in `header`.
///
/// Note: the comparison is a u256 integer comparison over the little-endian
/// interpretation of the hash. Greater values represent *less* work.
pub fn difficulty_is_valid(
    header: &Header,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;

    if !(hash < &difficulty_threshold) {
        return Err(BlockError::DifficultyFilter(
            *height,
            *hash,
            header.difficulty_threshold,
        ));
    }

    Ok(())
}

/// Returns `Ok(())` if `header.time` is strictly after its parent's
/// timestamp and no more than 2 hours past the local clock `now`.
///
/// The future bound is a non-deterministic rule, as clocks vary over time
/// and between nodes: a block rejected by it at a given point in time may
/// later be accepted.
pub fn time_is_valid_at(
    header: &Header,
    parent_time: DateTime<Utc>,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    // TODO: replace the parent bound with a real median-time-past once the
    // index keeps the last 11 timestamps.
    if header.time <= parent_time {
        return Err(BlockError::TimeBeforeParent(
            *height,
            *hash,
            header.time,
            parent_time,
        ));
    }
    header.time_is_valid_at(now, height, hash)?;
    Ok(())
}

/// Check Merkle root validity.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // The transaction Merkle tree is malleable, allowing blocks with
    // duplicate transactions to have the same Merkle root as blocks without
    // them. Duplicate transactions imply a double-spend, so as
    // defense-in-depth the hashes must also be distinct.
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Returns `Ok(())` if no two inputs anywhere in the block spend the same
/// previous output.
pub fn no_duplicate_spends(block: &Block) -> Result<(), BlockError> {
    let mut spent: HashSet<transparent::OutPoint> = HashSet::new();
    for tx in block.transactions.iter().skip(1) {
        for input in &tx.inputs {
            if let Some(outpoint) = input.outpoint() {
                if !spent.insert(outpoint) {
                    return Err(BlockError::DuplicateSpend(outpoint));
                }
            }
        }
    }
    Ok(())
}

/// Returns `Ok(())` if the serialized block is within the size limit.
pub fn size_is_valid(block: &Block) -> Result<(), BlockError> {
    let size = block.serialized_len();
    if size as u64 > MAX_BLOCK_BYTES {
        return Err(BlockError::OversizedBlock(size, MAX_BLOCK_BYTES));
    }
    Ok(())
}

/// All context-free body checks, in the order the chain manager applies
/// them.
pub fn body_is_valid(block: &Block, height: Height) -> Result<(), BlockError> {
    size_is_valid(block)?;
    coinbase_is_first(block)?;
    coinbase_height_matches(block, height)?;
    let transaction_hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
    merkle_root_validity(block, &transaction_hashes)?;
    no_duplicate_spends(block)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use kernel_chain::{
        amount::Amount,
        block::merkle,
        parameters::genesis::genesis_bits,
        transaction::{LockTime, Transaction},
        transparent::{CoinbaseData, Input, OutPoint, Output, Script},
    };

    fn coinbase_at(height: Height) -> Transaction {
        Transaction::new(
            1,
            vec![Input::new_coinbase(height, CoinbaseData::default())],
            vec![Output::new(
                Amount::from_base_units(5_000_000_000),
                Script::new_p2pkh(&[1; 20]),
            )],
            LockTime::none(),
        )
    }

    fn spend_of(prev: transaction::Hash, index: u32) -> Transaction {
        Transaction::new(
            1,
            vec![Input::new_spend(OutPoint { hash: prev, index })],
            vec![Output::new(
                Amount::from_base_units(1_000_000),
                Script::new_p2pkh(&[2; 20]),
            )],
            LockTime::none(),
        )
    }

    fn block_with(transactions: Vec<Transaction>) -> Block {
        let transactions: Vec<_> = transactions.into_iter().map(Arc::new).collect();
        let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
        Block {
            header: Header::new(
                1,
                Hash([0xaa; 32]),
                merkle_root,
                Utc.timestamp(1_759_900_000, 0),
                genesis_bits(),
                0,
            ),
            transactions,
        }
    }

    #[test]
    fn coinbase_must_come_first_and_alone() {
        let block = block_with(vec![
            coinbase_at(Height(5)),
            spend_of(transaction::Hash([9; 32]), 0),
        ]);
        assert!(coinbase_is_first(&block).is_ok());

        let swapped = block_with(vec![
            spend_of(transaction::Hash([9; 32]), 0),
            coinbase_at(Height(5)),
        ]);
        assert!(coinbase_is_first(&swapped).is_err());

        let doubled = block_with(vec![coinbase_at(Height(5)), coinbase_at(Height(5))]);
        assert!(coinbase_is_first(&doubled).is_err());
    }

    #[test]
    fn coinbase_height_must_match() {
        let block = block_with(vec![coinbase_at(Height(5))]);
        assert!(coinbase_height_matches(&block, Height(5)).is_ok());
        assert!(matches!(
            coinbase_height_matches(&block, Height(6)),
            Err(BlockError::CoinbaseHeightMismatch(_, Some(Height(5)), Height(6)))
        ));
    }

    #[test]
    fn merkle_mismatch_and_duplicates_are_rejected() {
        let block = block_with(vec![
            coinbase_at(Height(5)),
            spend_of(transaction::Hash([9; 32]), 0),
        ]);
        let hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
        assert!(merkle_root_validity(&block, &hashes).is_ok());

        let wrong = vec![hashes[1], hashes[0]];
        assert!(matches!(
            merkle_root_validity(&block, &wrong),
            Err(BlockError::BadMerkleRoot { .. })
        ));

        // A block whose Merkle root was built from a duplicated tx.
        let dup = block_with(vec![
            coinbase_at(Height(5)),
            spend_of(transaction::Hash([9; 32]), 0),
            spend_of(transaction::Hash([9; 32]), 0),
        ]);
        let dup_hashes: Vec<_> = dup.transactions.iter().map(|tx| tx.hash()).collect();
        assert!(matches!(
            merkle_root_validity(&dup, &dup_hashes),
            Err(BlockError::DuplicateTransaction)
        ));
    }

    #[test]
    fn in_block_double_spends_are_rejected() {
        let prev = transaction::Hash([9; 32]);
        let ok = block_with(vec![
            coinbase_at(Height(5)),
            spend_of(prev, 0),
            spend_of(prev, 1),
        ]);
        assert!(no_duplicate_spends(&ok).is_ok());

        let mut second_spend = spend_of(prev, 0);
        // Different outputs, same outpoint: still a double spend.
        second_spend.outputs[0] = Output::new(
            Amount::from_base_units(2_000_000),
            Script::new_p2pkh(&[3; 20]),
        );
        let bad = block_with(vec![
            coinbase_at(Height(5)),
            spend_of(prev, 0),
            second_spend,
        ]);
        assert!(matches!(
            no_duplicate_spends(&bad),
            Err(BlockError::DuplicateSpend(_))
        ));
    }

    #[test]
    fn difficulty_filter_uses_the_header_target() {
        // An impossible target: mantissa 1, exponent 3 → target = 1; only a
        // zero hash passes, and a hash of all 0xff certainly does not.
        let mut block = block_with(vec![coinbase_at(Height(5))]);
        block.header = Header::new(
            1,
            Hash([0xaa; 32]),
            block.header.merkle_root,
            block.header.time,
            kernel_chain::work::difficulty::CompactDifficulty::from_parts(3, 1),
            0,
        );
        let hash = block.hash();
        assert!(matches!(
            difficulty_is_valid(&block.header, &Height(5), &hash),
            Err(BlockError::DifficultyFilter(..))
        ));

        // The genesis block satisfies its own recorded target.
        let genesis = kernel_chain::parameters::genesis::genesis_block();
        let genesis_hash = genesis.hash();
        assert!(difficulty_is_valid(&genesis.header, &Height(0), &genesis_hash).is_ok());
    }

    #[test]
    fn timestamps_must_advance_past_the_parent() {
        let block = block_with(vec![coinbase_at(Height(5))]);
        let hash = block.hash();
        let parent_time = block.header.time - chrono::Duration::seconds(1);
        let now = block.header.time;
        assert!(time_is_valid_at(&block.header, parent_time, now, &Height(5), &hash).is_ok());

        let late_parent = block.header.time;
        assert!(matches!(
            time_is_valid_at(&block.header, late_parent, now, &Height(5), &hash),
            Err(BlockError::TimeBeforeParent(..))
        ));
    }
}
