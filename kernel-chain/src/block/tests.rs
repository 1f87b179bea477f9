use std::sync::Arc;

use chrono::{TimeZone, Utc};

use super::*;
use crate::{
    amount::Amount,
    parameters::genesis::{genesis_bits, genesis_block},
    serialization::{KernelDeserialize, KernelSerialize},
    transaction::{Hash as TxHash, LockTime, Transaction},
    transparent::{CoinbaseData, Input, OutPoint, Output, Script},
};

fn test_coinbase(height: Height) -> Transaction {
    Transaction::new(
        1,
        vec![Input::new_coinbase(height, CoinbaseData::default())],
        vec![Output::new(
            Amount::from_base_units(5_000_000_000),
            Script::new_p2pkh(&[0x21; 20]),
        )],
        LockTime::none(),
    )
}

fn test_spend(prev: TxHash) -> Transaction {
    Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: prev,
                index: 0,
            },
            unlock_script: Script::new(vec![0x51; 107]),
            sequence: 0xffff_ffff,
        }],
        vec![Output::new(
            Amount::from_base_units(4_000_000_000),
            Script::new_p2pkh(&[0x22; 20]),
        )],
        LockTime::none(),
    )
}

fn test_block() -> Block {
    let coinbase = test_coinbase(Height(7));
    let spend = test_spend(TxHash([9u8; 32]));
    let transactions = vec![Arc::new(coinbase), Arc::new(spend)];
    let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
    let header = Header::new(
        1,
        Hash([3u8; 32]),
        merkle_root,
        Utc.timestamp(1_759_900_000, 0),
        genesis_bits(),
        42,
    );
    Block {
        header,
        transactions,
    }
}

#[test]
fn block_round_trips_with_identical_hash() {
    let block = test_block();
    let bytes = block.kernel_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), block.serialized_len());

    let parsed = Block::kernel_deserialize(&bytes[..]).unwrap();
    assert_eq!(parsed, block);
    assert_eq!(parsed.hash(), block.hash());
    assert_eq!(
        parsed.transactions[1].hash(),
        block.transactions[1].hash()
    );
}

#[test]
fn coinbase_height_is_read_from_the_first_input() {
    assert_eq!(test_block().coinbase_height(), Some(Height(7)));
    assert_eq!(genesis_block().coinbase_height(), None);
}

#[test]
fn header_round_trip_caches_the_hash() {
    let header = test_block().header;
    let bytes = header.kernel_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), Header::len());

    let parsed = Header::kernel_deserialize(&bytes[..]).unwrap();
    assert_eq!(parsed, header);
    assert_eq!(parsed.hash(), header.hash());
}

#[test]
fn nonce_sits_at_the_documented_offset() {
    let mut header = test_block().header;
    header.nonce = 0xdead_beef;
    let bytes = header.kernel_serialize_to_vec().unwrap();
    assert_eq!(
        &bytes[Header::nonce_offset()..],
        &0xdead_beefu32.to_le_bytes()
    );
}

#[test]
fn future_timestamps_are_rejected_after_two_hours() {
    let header = test_block().header;
    let height = Height(7);
    let hash = header.hash();

    let now = header.time - chrono::Duration::hours(1);
    assert!(header.time_is_valid_at(now, &height, &hash).is_ok());

    let too_early = header.time - chrono::Duration::hours(3);
    assert!(header.time_is_valid_at(too_early, &height, &hash).is_err());
}

#[test]
fn oversized_blocks_fail_to_parse() {
    // A fake length prefix claiming more transactions than a block can hold.
    let mut bytes = test_block().header.kernel_serialize_to_vec().unwrap();
    bytes.extend_from_slice(&[0xfe, 0xff, 0xff, 0xff, 0x00]);
    assert!(Block::kernel_deserialize(&bytes[..]).is_err());
}
