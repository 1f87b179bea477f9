//! The Merkle tree binding a block header to its transactions.

use std::{fmt, io, iter::FromIterator};

use crate::serialization::{sha256d, KernelDeserialize, KernelSerialize, SerializationError};
use crate::transaction;

/// The root of the transaction Merkle tree.
///
/// The tree is built over the transaction identifiers in natural byte order:
/// adjacent pairs are concatenated and SHA256d-hashed, with the last element
/// duplicated when a level has an odd count, until a single digest remains. A
/// single-transaction block's root is that transaction's identifier.
///
/// Note that this construction is malleable (CVE-2012-2459): two different
/// transaction lists can produce the same root when one duplicates entries.
/// Block validation independently rejects duplicate transactions.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Root(pub [u8; 32]);

impl Root {
    pub fn from_hashes(hashes: &[transaction::Hash]) -> Root {
        let mut level: Vec<[u8; 32]> = hashes.iter().map(|h| h.0).collect();
        if level.is_empty() {
            return Root([0u8; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = *level.last().expect("level is non-empty");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        Root(level[0])
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    sha256d::digest(&concat)
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(iter: I) -> Self {
        let hashes: Vec<transaction::Hash> = iter.into_iter().collect();
        Root::from_hashes(&hashes)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl std::str::FromStr for Root {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Root(bytes))
        }
    }
}

impl KernelSerialize for Root {
    fn kernel_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl KernelDeserialize for Root {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::kernel_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> transaction::Hash {
        transaction::Hash([n; 32])
    }

    /// Recompute a root directly from the definition, one level at a time,
    /// for a handful of sizes including odd counts that force duplication.
    #[test]
    fn root_matches_manual_pairing() {
        for &n in &[1usize, 2, 3, 4, 5, 7, 8] {
            let leaves: Vec<transaction::Hash> = (0..n as u8).map(leaf).collect();
            let root = Root::from_hashes(&leaves);

            let mut level: Vec<[u8; 32]> = leaves.iter().map(|l| l.0).collect();
            while level.len() > 1 {
                let mut next = Vec::new();
                let mut i = 0;
                while i < level.len() {
                    let left = level[i];
                    let right = if i + 1 < level.len() {
                        level[i + 1]
                    } else {
                        level[i]
                    };
                    next.push(hash_pair(&left, &right));
                    i += 2;
                }
                level = next;
            }
            assert_eq!(root.0, level[0], "mismatch for {} leaves", n);
        }
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let only = leaf(7);
        assert_eq!(Root::from_hashes(&[only]).0, only.0);
    }

    #[test]
    fn odd_level_duplicates_the_last_leaf() {
        // With three leaves the second pair is (c, c).
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let left = hash_pair(&a.0, &b.0);
        let right = hash_pair(&c.0, &c.0);
        let expected = hash_pair(&left, &right);
        assert_eq!(Root::from_hashes(&[a, b, c]).0, expected);
    }
}
