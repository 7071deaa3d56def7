use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use warden_core::types::Wid;
use zeroize::Zeroizing;

use crate::dilithium::SignatureError;
use crate::hash::wid_from_pubkey;

/// A watcher keypair: Dilithium2 public + secret keys with the derived WID.
///
/// The secret key is wiped from memory on drop.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub wid: Wid,
    pub public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        Self::from_raw(pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message)
    }

    /// Return a read-only view of the secret key bytes.
    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }

    /// Restore a KeyPair from raw bytes (e.g. loaded from a key file).
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        Self {
            wid: wid_from_pubkey(&pk_bytes),
            public_key: pk_bytes,
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ wid: {:?} }}", self.wid)
    }
}
