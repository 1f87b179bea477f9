//! The fixed genesis block.
//!
//! Every field below is a constant of the chain: changing any of them forks
//! the network from block zero.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lazy_static::lazy_static;

use crate::{
    amount::Amount,
    block::{self, merkle, Block, Header},
    transaction::{LockTime, Transaction},
    transparent::{CoinbaseData, Input, Output, Script, SEQUENCE_FINAL},
    work::difficulty::CompactDifficulty,
};

/// The parent hash carried by the genesis header (and by no other block).
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0u8; 32]);

/// Unix timestamp the genesis header was mined at.
pub const GENESIS_TIMESTAMP: u32 = 1_759_863_403;

/// Genesis difficulty: wire bytes `b2 2d 12 1e`.
pub const GENESIS_BITS_EXPONENT: u8 = 0x1e;
pub const GENESIS_BITS_MANTISSA: u32 = 0x00b2_2d12;

/// The nonce that satisfies the genesis target.
pub const GENESIS_NONCE: u32 = 18_453;

/// The genesis coinbase identifier (displayed byte order). With a single
/// transaction, the Merkle root is the same digest.
pub const GENESIS_TX_ID: &str = "a0e3b9e806c95cf243bd03c881966ac1d518b1b44e220bf373ee4bf348a2e765";

/// The hash160 the genesis output pays to.
pub const GENESIS_PAYOUT_PUB_KEY_HASH: [u8; 20] = [
    0x32, 0x84, 0xb1, 0x6e, 0x8c, 0xdd, 0xbe, 0x53, 0x47, 0x9d, 0xda, 0xb1, 0xc2, 0xa6, 0x01,
    0x0c, 0xa9, 0x92, 0x3d, 0x88,
];

/// The value of the genesis output, in base units.
pub const GENESIS_OUTPUT_VALUE: u64 = 5_000_000_000;

pub fn genesis_bits() -> CompactDifficulty {
    CompactDifficulty::from_parts(GENESIS_BITS_EXPONENT, GENESIS_BITS_MANTISSA)
}

/// Build the genesis coinbase transaction.
///
/// Its unlock script is a single 13-byte push of `"Genesis Block"`; it
/// predates the height-push rule, so the height field stays empty.
pub fn genesis_coinbase() -> Transaction {
    let mut script = Vec::with_capacity(14);
    script.push(13u8);
    script.extend_from_slice(b"Genesis Block");
    let input = Input::Coinbase {
        height: None,
        data: CoinbaseData::new(script),
        sequence: SEQUENCE_FINAL,
    };
    let output = Output::new(
        Amount::from_base_units(GENESIS_OUTPUT_VALUE),
        Script::new_p2pkh(&GENESIS_PAYOUT_PUB_KEY_HASH),
    );
    Transaction::new(1, vec![input], vec![output], LockTime::none())
}

/// Build the genesis block.
pub fn genesis_block() -> Block {
    let coinbase = genesis_coinbase();
    let merkle_root = merkle::Root::from_hashes(&[coinbase.hash()]);
    let header = Header::new(
        1,
        GENESIS_PREVIOUS_BLOCK_HASH,
        merkle_root,
        Utc.timestamp(GENESIS_TIMESTAMP as i64, 0),
        genesis_bits(),
        GENESIS_NONCE,
    );
    Block {
        header,
        transactions: vec![Arc::new(coinbase)],
    }
}

lazy_static! {
    /// The genesis block hash, computed once.
    pub static ref GENESIS_HASH: block::Hash = genesis_block().hash();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::KernelSerialize;

    #[test]
    fn genesis_coinbase_matches_the_published_id() {
        let expected = crate::transaction::Hash::from_str(GENESIS_TX_ID).unwrap();
        assert_eq!(genesis_coinbase().hash(), expected);
    }

    #[test]
    fn genesis_merkle_root_is_the_coinbase_id() {
        let block = genesis_block();
        assert_eq!(block.header.merkle_root.0, block.transactions[0].hash().0);
        assert_eq!(
            block.header.merkle_root,
            merkle::Root::from_str(GENESIS_TX_ID).unwrap()
        );
    }

    #[test]
    fn genesis_header_satisfies_its_own_target() {
        let block = genesis_block();
        let target = block.header.difficulty_threshold.to_expanded().unwrap();
        assert!(block.hash() < target);
        // The displayed hash leads with zeros because the high-order bytes of
        // the little-endian proof integer are zero.
        assert!(block.hash().to_string().starts_with("0000"));
    }

    #[test]
    fn genesis_block_round_trips() {
        use crate::KernelDeserialize;
        let block = genesis_block();
        let bytes = block.kernel_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), block.serialized_len());
        let parsed = Block::kernel_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.hash(), block.hash());
    }

    #[test]
    fn genesis_header_is_eighty_bytes() {
        let header_bytes = genesis_block().header.kernel_serialize_to_vec().unwrap();
        assert_eq!(header_bytes.len(), Header::len());
    }
}
