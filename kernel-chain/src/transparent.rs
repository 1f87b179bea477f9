//! Transparent value transfer: outpoints, inputs, outputs and scripts.
#![allow(clippy::unit_arg)]

mod address;
mod script;

pub use address::{Address, ADDRESS_VERSION};
pub use script::{opcode, Script};

/// RIPEMD-160 of SHA-256, the digest behind addresses and P2PKH locks.
pub fn hash160(bytes: &[u8]) -> [u8; 20] {
    address::hash_payload(bytes)
}

use kernel_serde_derive::{KernelDeserialize, KernelSerialize};

use crate::{
    amount::Amount,
    block,
    compactint::CompactInt,
    serialization::{KernelDeserialize, KernelSerialize, SerializationError},
    transaction,
};

/// The previous-output index that marks an input as a coinbase.
pub const COINBASE_PREV_INDEX: u32 = 0xffff_ffff;

/// Arbitrary data inserted by miners into a coinbase transaction's unlock
/// script, after the block-height push.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct CoinbaseData(pub(crate) Vec<u8>);

impl CoinbaseData {
    pub fn new(data: Vec<u8>) -> CoinbaseData {
        CoinbaseData(data)
    }

    pub fn serialized_size(&self) -> usize {
        self.0.len()
    }
}

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, KernelSerialize, KernelDeserialize,
)]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The sentinel outpoint carried by coinbase inputs.
    pub fn coinbase() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0u8; 32]),
            index: COINBASE_PREV_INDEX,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.hash.is_zero() && self.index == COINBASE_PREV_INDEX
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the output.
        sequence: u32,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// The height of this block, from the leading push of the unlock
        /// script. `None` when the script does not start with a small
        /// minimal push (the genesis block predates the height rule).
        height: Option<block::Height>,
        /// Free data inserted by miners, after the height push.
        data: CoinbaseData,
        /// The sequence number for the output.
        sequence: u32,
    },
}

/// The default sequence number; neither the wallet nor the miner produce
/// anything else.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

impl Input {
    /// A standard spend of `outpoint` with an empty unlock script, to be
    /// filled in by signing.
    pub fn new_spend(outpoint: OutPoint) -> Input {
        Input::PrevOut {
            outpoint,
            unlock_script: Script::empty(),
            sequence: SEQUENCE_FINAL,
        }
    }

    /// A coinbase input for a block at `height`.
    pub fn new_coinbase(height: block::Height, data: CoinbaseData) -> Input {
        Input::Coinbase {
            height: Some(height),
            data,
            sequence: SEQUENCE_FINAL,
        }
    }

    /// The outpoint spent by this input, if it is not a coinbase.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    /// The raw unlock-script bytes as they appear in the serialization.
    pub fn unlock_script_bytes(&self) -> Vec<u8> {
        match self {
            Input::PrevOut { unlock_script, .. } => unlock_script.as_raw_bytes().to_vec(),
            Input::Coinbase { height, data, .. } => coinbase_script_bytes(*height, data),
        }
    }

    /// The serialized length (in bytes) of this input.
    pub fn serialized_len(&self) -> usize {
        match self {
            Input::PrevOut { unlock_script, .. } => {
                OutPoint::len() + unlock_script.serialized_size() + 4
            }
            Input::Coinbase { height, data, .. } => {
                let script_len = coinbase_script_bytes(*height, data).len();
                OutPoint::len() + CompactInt::size(script_len) + script_len + 4
            }
        }
    }
}

impl KernelSerialize for Input {
    fn kernel_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.kernel_serialize(&mut target)?;
                unlock_script.kernel_serialize(&mut target)?;
                sequence.kernel_serialize(&mut target)?;
            }
            Input::Coinbase {
                height,
                data,
                sequence,
            } => {
                OutPoint::coinbase().kernel_serialize(&mut target)?;
                coinbase_script_bytes(*height, data).kernel_serialize(&mut target)?;
                sequence.kernel_serialize(&mut target)?;
            }
        }
        Ok(())
    }
}

impl KernelDeserialize for Input {
    fn kernel_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::kernel_deserialize(&mut reader)?;
        if outpoint.is_coinbase() {
            let script = Vec::<u8>::kernel_deserialize(&mut reader)?;
            let sequence = u32::kernel_deserialize(&mut reader)?;
            let (height, data) = parse_coinbase_script(script);
            Ok(Input::Coinbase {
                height,
                data,
                sequence,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: Script::kernel_deserialize(&mut reader)?,
                sequence: u32::kernel_deserialize(&mut reader)?,
            })
        }
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you own in your "wallet" are in fact a subset of
/// unspent transaction outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety. Thus, to send someone 1 coin from a 2-coin UTXO, a
/// transaction spends the whole UTXO and pays 1 coin to the recipient and
/// 1 coin back to the sender as change.
#[derive(Clone, Debug, Eq, PartialEq, Hash, KernelSerialize, KernelDeserialize)]
pub struct Output {
    /// Transaction value.
    pub value: Amount,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    pub fn new(value: Amount, lock_script: Script) -> Output {
        Output { value, lock_script }
    }

    /// Returns the serialized length (in bytes) of this output.
    pub fn serialized_len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}

/// The minimal little-endian encoding of a block height, as pushed into
/// coinbase unlock scripts.
pub fn minimal_height_bytes(height: u32) -> Vec<u8> {
    let needed = if height == 0 {
        1
    } else {
        (4 - height.leading_zeros() as usize / 8) as usize
    };
    height.to_le_bytes()[..needed].to_vec()
}

fn coinbase_script_bytes(height: Option<block::Height>, data: &CoinbaseData) -> Vec<u8> {
    let mut script = Vec::new();
    if let Some(height) = height {
        let bytes = minimal_height_bytes(height.0);
        script.push(bytes.len() as u8);
        script.extend_from_slice(&bytes);
    }
    script.extend_from_slice(&data.0);
    script
}

/// Split a coinbase unlock script into its height push and trailing data.
///
/// Only a leading minimal push of 1–4 bytes is read back as a height, so
/// serialization round-trips exactly.
fn parse_coinbase_script(script: Vec<u8>) -> (Option<block::Height>, CoinbaseData) {
    if !script.is_empty() {
        let push_len = script[0] as usize;
        if (1..=4).contains(&push_len) && script.len() > push_len {
            let mut le = [0u8; 4];
            le[..push_len].copy_from_slice(&script[1..=push_len]);
            let height = u32::from_le_bytes(le);
            if minimal_height_bytes(height).len() == push_len {
                return (
                    Some(block::Height(height)),
                    CoinbaseData(script[1 + push_len..].to_vec()),
                );
            }
        }
    }
    (None, CoinbaseData(script))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_pushes_are_minimal() {
        assert_eq!(minimal_height_bytes(0), vec![0x00]);
        assert_eq!(minimal_height_bytes(1), vec![0x01]);
        assert_eq!(minimal_height_bytes(255), vec![0xff]);
        assert_eq!(minimal_height_bytes(256), vec![0x00, 0x01]);
        assert_eq!(minimal_height_bytes(0x01_00_00), vec![0x00, 0x00, 0x01]);
    }

    #[test]
    fn coinbase_input_round_trips_height_and_data() {
        let input = Input::new_coinbase(
            block::Height(170_000),
            CoinbaseData(b"mined by tests".to_vec()),
        );
        let bytes = input.kernel_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), input.serialized_len());
        let parsed = Input::kernel_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, input);
    }

    #[test]
    fn coinbase_script_without_height_stays_data() {
        // A 13-byte push cannot be a height, so the whole script is data.
        let script = {
            let mut s = vec![0x0d];
            s.extend_from_slice(b"Genesis Block");
            s
        };
        let (height, data) = parse_coinbase_script(script.clone());
        assert_eq!(height, None);
        assert_eq!(data.0, script);
    }

    #[test]
    fn spend_input_round_trips() {
        let input = Input::PrevOut {
            outpoint: OutPoint {
                hash: transaction::Hash([7u8; 32]),
                index: 3,
            },
            unlock_script: Script::new(vec![0xab; 72]),
            sequence: SEQUENCE_FINAL,
        };
        let bytes = input.kernel_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), input.serialized_len());
        assert_eq!(Input::kernel_deserialize(&bytes[..]).unwrap(), input);
    }
}
