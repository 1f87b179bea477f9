//! Public addresses.

use std::{fmt, io};

use ripemd160::{Digest, Ripemd160};
use secp256k1::PublicKey;
use sha2::{Digest as Sha2Digest, Sha256};

use crate::serialization::{KernelDeserialize, KernelSerialize, SerializationError};

use super::Script;

/// The single version byte prepended to every address payload on this chain.
pub const ADDRESS_VERSION: u8 = 0x6c;

/// A pay-to-public-key-hash address.
///
/// The version byte is prepended to the 20-byte public-key hash, the result
/// is hashed with SHA256d, the first four bytes of the output are appended as
/// a checksum, and the whole payload is Base58-encoded.
///
/// https://en.bitcoin.it/wiki/Base58Check_encoding
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Address {
    /// 20 bytes specifying a public key hash, which is a RIPEMD-160 hash of
    /// a SHA-256 hash of a compressed ECDSA key encoding.
    pub_key_hash: [u8; 20],
}

impl Address {
    pub fn from_pub_key_hash(pub_key_hash: [u8; 20]) -> Address {
        Address { pub_key_hash }
    }

    /// The address of a compressed SEC-encoded public key.
    pub fn from_pub_key(pub_key: &PublicKey) -> Address {
        Address {
            pub_key_hash: hash_payload(&pub_key.serialize()[..]),
        }
    }

    pub fn pub_key_hash(&self) -> [u8; 20] {
        self.pub_key_hash
    }

    /// The lock script paying to this address.
    pub fn lock_script(&self) -> Script {
        Script::new_p2pkh(&self.pub_key_hash)
    }
}

/// A hash of an address payload: RIPEMD-160 of SHA-256. The result is always
/// exactly 20 bytes.
pub(crate) fn hash_payload(bytes: &[u8]) -> [u8; 20] {
    let sha_hash = Sha256::digest(bytes);
    let ripe_hash = Ripemd160::digest(&sha_hash);
    let mut payload = [0u8; 20];
    payload[..].copy_from_slice(&ripe_hash[..]);
    payload
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Address")
            .field("pub_key_hash", &hex::encode(self.pub_key_hash))
            .finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.kernel_serialize(&mut bytes);

        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = bs58::decode(s).with_check(None).into_vec();

        match result {
            Ok(bytes) => Self::kernel_deserialize(&bytes[..]),
            Err(_) => Err(SerializationError::Parse("address decoding error")),
        }
    }
}

impl KernelSerialize for Address {
    fn kernel_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&[ADDRESS_VERSION])?;
        writer.write_all(&self.pub_key_hash)?;
        Ok(())
    }
}

impl KernelDeserialize for Address {
    fn kernel_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_byte = [0; 1];
        reader.read_exact(&mut version_byte)?;
        if version_byte[0] != ADDRESS_VERSION {
            return Err(SerializationError::Parse("bad address version"));
        }

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;

        Ok(Address {
            pub_key_hash: hash_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn address_string_round_trip() {
        let addr = Address::from_pub_key_hash([0x11; 20]);
        let encoded = addr.to_string();
        assert_eq!(Address::from_str(&encoded).unwrap(), addr);
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let addr = Address::from_pub_key_hash([0x11; 20]);
        let mut encoded = addr.to_string();
        // Swap the last character for a different base58 digit.
        let last = encoded.pop().unwrap();
        encoded.push(if last == '2' { '3' } else { '2' });
        assert!(Address::from_str(&encoded).is_err());
    }

    #[test]
    fn genesis_payout_hash_parses() {
        let h160: [u8; 20] = {
            let mut bytes = [0u8; 20];
            hex::decode_to_slice("3284b16e8cddbe53479ddab1c2a6010ca9923d88", &mut bytes).unwrap();
            bytes
        };
        let addr = Address::from_pub_key_hash(h160);
        let round = Address::from_str(&addr.to_string()).unwrap();
        assert_eq!(round.pub_key_hash(), h160);
        assert_eq!(
            round.lock_script().p2pkh_pub_key_hash(),
            Some(h160)
        );
    }
}
