use std::io::{Cursor, Read, Write};

use chrono::{DateTime, Duration, Utc};
use kernel_serde_derive::KernelSerialize;
use thiserror::Error;

use crate::{
    cached::Cached,
    serialization::{sha256d, KernelDeserialize, KernelSerialize, SerializationError},
    work::difficulty::CompactDifficulty,
};

use super::{merkle, Hash, Height};

/// A block header, containing metadata about a block.
///
/// How are blocks chained together? They are chained together via the
/// backwards reference (previous header hash) present in the block
/// header. Each block points backwards to its parent, all the way
/// back to the genesis block (the first block in the blockchain).
#[derive(Clone, Copy, Debug, Eq, PartialEq, KernelSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    ///
    /// This ensures no previous block can be changed without also changing
    /// this block's header.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner
    /// started hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header
    /// hash must be less than, in compact "bits" format.
    pub difficulty_threshold: CompactDifficulty,

    /// An arbitrary field that miners can change to modify the header
    /// hash in order to produce a hash less than the target threshold.
    pub nonce: u32,

    /// For efficiency, we cache the hash of this block after computing it the
    /// first time. This field is not part of the consensus serialization.
    hash: Cached<Hash>,
}

#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("invalid time {0:?} in block header {1:?} {2:?}: block time is more than 2 hours in the future ({3:?}). Hint: check your machine's date, time, and time zone.")]
    InvalidBlockTime(DateTime<Utc>, Height, Hash, DateTime<Utc>),
}

impl Header {
    /// Returns length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    /// Byte offset of the nonce within the serialized header, for miners that
    /// patch a pre-serialized header in place.
    pub const fn nonce_offset() -> usize {
        76
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
        }
    }

    /// Compute (or fetch the cached) hash of this header.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Check that the header time is no more than 2 hours after `now`.
    ///
    /// This is a non-deterministic rule, as clocks vary over time, and
    /// between different nodes. A block rejected by this rule at a given
    /// point in time may later be accepted.
    pub fn time_is_valid_at(
        &self,
        now: DateTime<Utc>,
        height: &Height,
        hash: &Hash,
    ) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::InvalidBlockTime(
                self.time,
                *height,
                *hash,
                two_hours_in_the_future,
            ))
        }
    }
}

/// Deserializes a header, hashing the 80 raw bytes once so the hash never
/// needs a re-serialization later.
impl KernelDeserialize for Header {
    fn kernel_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 80];
        reader.read_exact(&mut raw)?;

        let mut hash_writer = sha256d::Writer::default();
        hash_writer
            .write_all(&raw)
            .expect("Sha256dWriter is infallible");
        let own_hash = Hash::from_bytes_exact(hash_writer.finish());

        let mut src = Cursor::new(&raw[..]);
        Ok(Header {
            version: u32::kernel_deserialize(&mut src)?,
            previous_block_hash: Hash::kernel_deserialize(&mut src)?,
            merkle_root: merkle::Root::kernel_deserialize(&mut src)?,
            time: <DateTime<Utc>>::kernel_deserialize(&mut src)?,
            difficulty_threshold: CompactDifficulty::kernel_deserialize(&mut src)?,
            nonce: u32::kernel_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}
