//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the block header as a
//! 32-bit `CompactDifficulty`. The `ExpandedDifficulty` is the full 256-bit
//! integer it encodes: a valid block's header hash, interpreted as a
//! little-endian 256-bit integer, is strictly less than its expanded target.
//!
//! Work is calculated from the target, and accumulated along each chain to
//! pick the best tip.

use std::{fmt, ops::Add};

use primitive_types::U256;

use crate::{block, KernelDeserialize, KernelSerialize, SerializationError};

/// The compact (4-byte) encoding of a difficulty target.
///
/// Wire layout is three big-endian mantissa bytes followed by one exponent
/// byte: `m2 m1 m0 e`, encoding the target `m · 2^(8·(e−3))`. Internally the
/// value is packed as `(e << 24) | m`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct CompactDifficulty(u32);

impl CompactDifficulty {
    const MANTISSA_MASK: u32 = 0x00ff_ffff;

    /// Build from an exponent and a (max 24-bit) mantissa.
    pub fn from_parts(exponent: u8, mantissa: u32) -> CompactDifficulty {
        CompactDifficulty(((exponent as u32) << 24) | (mantissa & Self::MANTISSA_MASK))
    }

    pub fn exponent(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn mantissa(&self) -> u32 {
        self.0 & Self::MANTISSA_MASK
    }

    /// The four bytes as they appear on the wire.
    pub fn bytes(&self) -> [u8; 4] {
        let m = self.mantissa();
        [(m >> 16) as u8, (m >> 8) as u8, m as u8, self.exponent()]
    }

    /// Expand to the full 256-bit target.
    ///
    /// Returns `None` for encodings with a zero mantissa or an exponent large
    /// enough to overflow 256 bits; neither is a meaningful target.
    pub fn to_expanded(&self) -> Option<ExpandedDifficulty> {
        let mantissa = self.mantissa();
        if mantissa == 0 {
            return None;
        }
        let exponent = self.exponent() as u32;
        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            let shift = (8 * (exponent - 3)) as usize;
            // A mantissa shifted past bit 255 is unrepresentable.
            let mantissa_bits = (32 - mantissa.leading_zeros()) as usize;
            if shift + mantissa_bits > 256 {
                return None;
            }
            U256::from(mantissa) << shift
        };
        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }
}

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&hex::encode(self.bytes()))
            .finish()
    }
}

impl fmt::Display for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.bytes()))
    }
}

impl KernelSerialize for CompactDifficulty {
    fn kernel_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_all(&self.bytes())
    }
}

impl KernelDeserialize for CompactDifficulty {
    fn kernel_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let raw = <[u8; 4]>::kernel_deserialize(&mut reader)?;
        let mantissa = ((raw[0] as u32) << 16) | ((raw[1] as u32) << 8) | raw[2] as u32;
        Ok(CompactDifficulty::from_parts(raw[3], mantissa))
    }
}

/// A 256-bit difficulty target.
///
/// Greater values represent *less* work: the header hash must fall below the
/// target.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

impl ExpandedDifficulty {
    /// The easiest target this chain accepts from the retarget rule.
    pub fn target_difficulty_limit() -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from(0xffffu64) << 232usize)
    }

    pub fn from_u256(value: U256) -> ExpandedDifficulty {
        ExpandedDifficulty(value)
    }

    pub fn to_u256(self) -> U256 {
        self.0
    }

    /// A block hash as a 256-bit integer, for comparison against targets.
    ///
    /// Proof-of-work interprets the hash in little-endian byte order.
    pub fn from_hash(hash: &block::Hash) -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from_little_endian(&hash.0))
    }

    /// Compress back to the compact encoding, normalizing so the mantissa's
    /// top bit is zero. Lossy: low-order target bits are truncated.
    pub fn to_compact(self) -> CompactDifficulty {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        let first = match bytes.iter().position(|&b| b != 0) {
            Some(i) => i,
            None => return CompactDifficulty::from_parts(0, 0),
        };
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0) as u32;
        let len = (32 - first) as u8;
        if bytes[first] > 0x7f {
            CompactDifficulty::from_parts(len + 1, (at(first) << 8) | at(first + 1))
        } else {
            CompactDifficulty::from_parts(
                len,
                (at(first) << 16) | (at(first + 1) << 8) | at(first + 2),
            )
        }
    }

    /// The expected number of hash attempts this target represents:
    /// ⌊2²⁵⁶ / (target + 1)⌋.
    ///
    /// Returns `None` when the work does not fit in 128 bits; such targets
    /// are far below anything this chain produces.
    pub fn to_work(self) -> Option<Work> {
        let expanded = self.0;
        if expanded == U256::max_value() {
            return Some(Work(1));
        }
        // 2^256 does not fit in a U256, but (2^256 − 1 − t) / (t + 1) + 1
        // computes the same quotient.
        let work = (!expanded) / (expanded + 1) + 1;
        if work.bits() > 128 {
            return None;
        }
        Some(Work(work.low_u128()))
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(bytes))
            .finish()
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        self == &ExpandedDifficulty::from_hash(other)
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&ExpandedDifficulty::from_hash(other))
    }
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        &ExpandedDifficulty::from_hash(self) == other
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<std::cmp::Ordering> {
        ExpandedDifficulty::from_hash(self).partial_cmp(other)
    }
}

/// The work of a single block: the expected number of hashes needed to find
/// a header at its target.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(u128);

impl Work {
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

/// Work accumulated from genesis to a block, inclusive.
///
/// The best chain is the tree branch whose tip has the greatest accumulated
/// work.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AccumulatedWork(u128);

impl AccumulatedWork {
    pub fn zero() -> AccumulatedWork {
        AccumulatedWork(0)
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl From<Work> for AccumulatedWork {
    fn from(work: Work) -> Self {
        AccumulatedWork(work.0)
    }
}

impl Add<Work> for AccumulatedWork {
    type Output = AccumulatedWork;

    fn add(self, rhs: Work) -> AccumulatedWork {
        AccumulatedWork(self.0.saturating_add(rhs.0))
    }
}

impl KernelSerialize for AccumulatedWork {
    fn kernel_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.kernel_serialize(writer)
    }
}

impl KernelDeserialize for AccumulatedWork {
    fn kernel_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(AccumulatedWork(u128::kernel_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_bits_expand_to_the_expected_target() {
        // Wire bytes b2 2d 12 1e: mantissa 0xb22d12, exponent 0x1e.
        let bits = CompactDifficulty::kernel_deserialize(&[0xb2, 0x2d, 0x12, 0x1e][..]).unwrap();
        assert_eq!(bits.exponent(), 0x1e);
        assert_eq!(bits.mantissa(), 0xb2_2d_12);
        let target = bits.to_expanded().unwrap();
        assert_eq!(target.to_u256(), U256::from(0xb2_2d_12u64) << 216usize);
        assert_eq!(bits.kernel_serialize_to_vec().unwrap(), [0xb2, 0x2d, 0x12, 0x1e]);
    }

    #[test]
    fn compression_normalizes_high_mantissa_bit() {
        // 0xb22d12 · 2^216 has its top mantissa bit set; the encoder shifts
        // it into a longer exponent with a leading zero byte.
        let target = ExpandedDifficulty::from_u256(U256::from(0xb2_2d_12u64) << 216usize);
        let compact = target.to_compact();
        assert_eq!(compact.exponent(), 0x1f);
        assert_eq!(compact.mantissa(), 0x00_b2_2d);
        assert!(compact.to_expanded().unwrap() <= target);
    }

    #[test]
    fn round_trip_when_already_normalized() {
        let compact = CompactDifficulty::from_parts(0x20, 0x00_ff_ff);
        let expanded = compact.to_expanded().unwrap();
        assert_eq!(expanded.to_compact(), compact);
        assert_eq!(
            expanded,
            ExpandedDifficulty::target_difficulty_limit(),
        );
    }

    #[test]
    fn work_is_inverse_in_the_target() {
        let easy = CompactDifficulty::from_parts(0x20, 0x7f_ff_ff)
            .to_expanded()
            .unwrap();
        let hard = CompactDifficulty::from_parts(0x1e, 0x7f_ff_ff)
            .to_expanded()
            .unwrap();
        assert!(hard.to_work().unwrap() > easy.to_work().unwrap());
    }

    #[test]
    fn zero_mantissa_has_no_target() {
        assert!(CompactDifficulty::from_parts(0x20, 0).to_expanded().is_none());
    }

    #[test]
    fn hash_comparisons_use_little_endian_interpretation() {
        let mut high = [0u8; 32];
        // Most significant byte of the little-endian interpretation.
        high[31] = 0x01;
        let low = [0xffu8; 31];
        let mut low_bytes = [0u8; 32];
        low_bytes[..31].copy_from_slice(&low);

        let high_hash = block::Hash(high);
        let low_hash = block::Hash(low_bytes);
        let target = ExpandedDifficulty::from_u256(U256::one() << 248usize);
        assert!(low_hash < target);
        assert!(high_hash >= target);
    }
}
