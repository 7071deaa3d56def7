use warden_core::error::WardenError;
use warden_core::transaction::{SignedTransaction, UnsignedTransaction};
use warden_core::types::Wid;

use crate::dilithium::{verify_signature, SignatureError};
use crate::keypair::KeyPair;

/// Turns an unsigned transaction skeleton into a submittable one.
///
/// Failures are opaque to callers and surface as `SigningFailed`.
pub trait TxSigner: Send + Sync {
    /// Identity of the watcher this signer speaks for.
    fn wid(&self) -> Wid;

    fn sign_tx(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, WardenError>;
}

impl TxSigner for KeyPair {
    fn wid(&self) -> Wid {
        self.wid
    }

    /// One detached signature over the body bytes per input, checked
    /// against our own public key before it is handed out.
    fn sign_tx(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, WardenError> {
        let body = tx.body_bytes();
        let proof = self
            .sign(&body)
            .map_err(|e| WardenError::SigningFailed(e.to_string()))?;
        let signed = SignedTransaction {
            tx_id: tx.tx_id(),
            proofs: vec![proof; tx.inputs.len()],
            unsigned: tx,
        };
        verify_transaction(&signed, &self.public_key).map_err(|e| WardenError::SigningFailed(e.to_string()))?;
        Ok(signed)
    }
}

/// Check that `tx` carries a valid proof by `public_key` for every input and
/// that its id matches its body.
pub fn verify_transaction(tx: &SignedTransaction, public_key: &[u8]) -> Result<(), SignatureError> {
    if tx.tx_id != tx.unsigned.tx_id() || tx.proofs.len() != tx.unsigned.inputs.len() {
        return Err(SignatureError::InvalidSignature);
    }
    let body = tx.unsigned.body_bytes();
    for proof in &tx.proofs {
        verify_signature(public_key, &body, proof)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::boxes::BoxCandidate;
    use warden_core::types::{Address, TxId};

    fn skeleton() -> UnsignedTransaction {
        let input = BoxCandidate::new(5_000, Address::new("watcher"), 1).into_box(&TxId([4; 32]), 0);
        UnsignedTransaction {
            inputs: vec![input],
            data_inputs: vec![],
            outputs: vec![BoxCandidate::new(4_000, Address::new("commitment"), 2)],
            fee: 1_000,
        }
    }

    #[test]
    fn signed_tx_verifies() {
        let kp = KeyPair::generate();
        let signed = kp.sign_tx(skeleton()).unwrap();
        assert_eq!(signed.tx_id, skeleton().tx_id());
        assert!(verify_transaction(&signed, &kp.public_key).is_ok());
    }

    #[test]
    fn foreign_key_does_not_verify() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let signed = kp.sign_tx(skeleton()).unwrap();
        assert!(verify_transaction(&signed, &other.public_key).is_err());
    }

    #[test]
    fn mismatched_halves_fail_self_check() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let mixed = KeyPair::from_raw(other.public_key.clone(), kp.secret_key_bytes().to_vec());
        assert!(matches!(mixed.sign_tx(skeleton()), Err(WardenError::SigningFailed(_))));
    }

    #[test]
    fn broken_key_reports_signing_failed() {
        let kp = KeyPair::from_raw(vec![1; 8], vec![2; 8]);
        assert!(matches!(kp.sign_tx(skeleton()), Err(WardenError::SigningFailed(_))));
    }
}
