//! Wallet key management and the transaction-building path.
//!
//! Wallets are single-key: a JSON file per wallet under
//! `<data_dir>/wallets/`, holding the name, the public address, and the
//! private key as a decimal string.

pub mod send;

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use primitive_types::U256;
use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use kernel_chain::transparent::Address;

pub use send::{SendError, SendRequest};

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("a wallet named '{0}' already exists")]
    AlreadyExists(String),

    #[error("no wallet named '{0}'")]
    NotFound(String),

    #[error("no wallet holds the address {0}")]
    UnknownAddress(String),

    #[error("wallet names may not be empty or contain path separators: '{0}'")]
    InvalidName(String),

    #[error("stored private key does not decode to a usable key")]
    BadStoredKey,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wallet file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The on-disk wallet record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletFile {
    #[serde(rename = "WalletName")]
    pub name: String,
    #[serde(rename = "PublicAddress")]
    pub public_address: String,
    /// The 256-bit secret, as a decimal string.
    #[serde(rename = "privateKey")]
    pub private_key: String,
}

impl WalletFile {
    /// Reconstruct the signing key.
    pub fn secret_key(&self) -> Result<SecretKey, WalletError> {
        let decimal = U256::from_dec_str(&self.private_key).map_err(|_| WalletError::BadStoredKey)?;
        let mut bytes = [0u8; 32];
        decimal.to_big_endian(&mut bytes);
        SecretKey::from_slice(&bytes).map_err(|_| WalletError::BadStoredKey)
    }

    pub fn address(&self) -> Result<Address, WalletError> {
        Address::from_str(&self.public_address).map_err(|_| WalletError::BadStoredKey)
    }
}

/// The wallet directory.
#[derive(Clone, Debug)]
pub struct WalletStore {
    dir: PathBuf,
}

impl WalletStore {
    /// A store rooted at `<data_dir>/wallets`, created if missing.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<WalletStore, WalletError> {
        let dir = data_dir.into().join("wallets");
        fs::create_dir_all(&dir)?;
        Ok(WalletStore { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn validate_name(name: &str) -> Result<(), WalletError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(WalletError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Create a wallet with a freshly generated key. Fails if the name is
    /// taken.
    pub fn create(&self, name: &str) -> Result<WalletFile, WalletError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        if path.exists() {
            return Err(WalletError::AlreadyExists(name.to_string()));
        }

        let (secret, public) = generate_keypair();
        let address = Address::from_pub_key(&public);
        let wallet = WalletFile {
            name: name.to_string(),
            public_address: address.to_string(),
            private_key: U256::from_big_endian(&secret[..]).to_string(),
        };
        fs::write(&path, serde_json::to_string_pretty(&wallet)?)?;
        info!(wallet = name, address = %wallet.public_address, "wallet created");
        Ok(wallet)
    }

    pub fn get(&self, name: &str) -> Result<WalletFile, WalletError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(WalletError::NotFound(name.to_string()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Every wallet on disk, sorted by name.
    pub fn list(&self) -> Result<Vec<WalletFile>, WalletError> {
        let mut wallets = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                match serde_json::from_str::<WalletFile>(&fs::read_to_string(&path)?) {
                    Ok(wallet) => wallets.push(wallet),
                    Err(error) => {
                        tracing::warn!(?path, %error, "skipping unreadable wallet file")
                    }
                }
            }
        }
        wallets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(wallets)
    }

    /// Find the wallet holding `address`.
    pub fn find_by_address(&self, address: &str) -> Result<WalletFile, WalletError> {
        self.list()?
            .into_iter()
            .find(|wallet| wallet.public_address == address)
            .ok_or_else(|| WalletError::UnknownAddress(address.to_string()))
    }
}

/// Generate a fresh keypair from OS randomness.
fn generate_keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let mut rng = rand::rngs::OsRng;
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        // from_slice rejects zero and out-of-order values; just draw again.
        if let Ok(secret) = SecretKey::from_slice(&bytes) {
            let public = PublicKey::from_secret_key(&secp, &secret);
            return (secret, public);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn create_list_and_reload() {
        let dir = TempDir::new("kernel-wallet-test").unwrap();
        let store = WalletStore::open(dir.path()).unwrap();

        let alice = store.create("alice").unwrap();
        let bob = store.create("bob").unwrap();
        assert_ne!(alice.public_address, bob.public_address);

        // Names are unique.
        assert!(matches!(
            store.create("alice"),
            Err(WalletError::AlreadyExists(_))
        ));

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "alice");

        // The stored decimal key round-trips to the same address.
        let reloaded = store.get("alice").unwrap();
        let secret = reloaded.secret_key().unwrap();
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        assert_eq!(
            Address::from_pub_key(&public).to_string(),
            reloaded.public_address
        );

        assert!(matches!(
            store.get("carol"),
            Err(WalletError::NotFound(_))
        ));
        assert!(matches!(
            store.create("../escape"),
            Err(WalletError::InvalidName(_))
        ));
    }
}
