#![allow(clippy::unit_arg)]
use crate::{
    compactint::CompactInt,
    serialization::{KernelDeserialize, KernelSerialize, SerializationError},
};
use std::{
    fmt,
    io::{self, Read},
};

/// Script opcodes used by this chain.
///
/// Pay-to-public-key-hash is the only script form the interpreter accepts,
/// so this list is intentionally short: values 0x01–0x4b are data pushes of
/// that many bytes.
pub mod opcode {
    pub const DUP: u8 = 0x76;
    pub const HASH160: u8 = 0xa9;
    pub const EQUALVERIFY: u8 = 0x88;
    pub const CHECKSIG: u8 = 0xac;

    /// The largest direct data push.
    pub const MAX_PUSH: u8 = 0x4b;
}

/// An encoding of a script: raw opcode/push bytes, length-prefixed on the
/// wire.
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(raw: Vec<u8>) -> Script {
        Script(raw)
    }

    pub fn empty() -> Script {
        Script(Vec::new())
    }

    pub fn as_raw_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Serialized size including the length prefix.
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    /// The standard lock script paying to a public-key hash:
    /// `DUP HASH160 <h160> EQUALVERIFY CHECKSIG`.
    pub fn new_p2pkh(pub_key_hash: &[u8; 20]) -> Script {
        let mut raw = Vec::with_capacity(25);
        raw.push(opcode::DUP);
        raw.push(opcode::HASH160);
        raw.push(20);
        raw.extend_from_slice(pub_key_hash);
        raw.push(opcode::EQUALVERIFY);
        raw.push(opcode::CHECKSIG);
        Script(raw)
    }

    /// The standard unlock script for a P2PKH spend:
    /// `<signature ∥ sighash byte> <public key>`.
    pub fn new_p2pkh_unlock(signature: &[u8], pub_key: &[u8]) -> Script {
        let mut raw = Vec::with_capacity(2 + signature.len() + pub_key.len());
        raw.push(signature.len() as u8);
        raw.extend_from_slice(signature);
        raw.push(pub_key.len() as u8);
        raw.extend_from_slice(pub_key);
        Script(raw)
    }

    /// If this is exactly the standard P2PKH lock script, the public-key
    /// hash it pays to.
    pub fn p2pkh_pub_key_hash(&self) -> Option<[u8; 20]> {
        let raw = &self.0;
        if raw.len() == 25
            && raw[0] == opcode::DUP
            && raw[1] == opcode::HASH160
            && raw[2] == 20
            && raw[23] == opcode::EQUALVERIFY
            && raw[24] == opcode::CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&raw[3..23]);
            Some(hash)
        } else {
            None
        }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl KernelSerialize for Script {
    fn kernel_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).kernel_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl KernelDeserialize for Script {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::kernel_deserialize(&mut reader)?.value();
        let mut bytes = Vec::new();
        reader.take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(SerializationError::Parse("script shorter than its prefix"));
        }
        Ok(Script(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_script_shape() {
        let h160 = [0x42u8; 20];
        let script = Script::new_p2pkh(&h160);
        assert_eq!(script.as_raw_bytes().len(), 25);
        assert_eq!(script.p2pkh_pub_key_hash(), Some(h160));
        assert_eq!(script.serialized_size(), 26);
    }

    #[test]
    fn non_p2pkh_is_not_matched() {
        assert_eq!(Script::empty().p2pkh_pub_key_hash(), None);
        let mut raw = Script::new_p2pkh(&[0u8; 20]).as_raw_bytes().to_vec();
        raw[24] = 0x00;
        assert_eq!(Script::new(raw).p2pkh_pub_key_hash(), None);
    }

    #[test]
    fn script_round_trip() {
        let script = Script::new(vec![1, 2, 3, 4, 5]);
        let bytes = script.kernel_serialize_to_vec().unwrap();
        assert_eq!(Script::kernel_deserialize(&bytes[..]).unwrap(), script);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_scripts_round_trip(raw in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..520)) {
            let script = Script::new(raw);
            let bytes = script.kernel_serialize_to_vec().unwrap();
            proptest::prop_assert_eq!(Script::kernel_deserialize(&bytes[..]).unwrap(), script);
        }
    }
}
