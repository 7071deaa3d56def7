pub mod digest;
pub mod dilithium;
pub mod hash;
pub mod keypair;
pub mod signer;

pub use digest::commitment_digest;
pub use dilithium::{verify_signature, SignatureError};
pub use hash::{blake3_hash, request_id_for, wid_from_pubkey};
pub use keypair::KeyPair;
pub use signer::{verify_transaction, TxSigner};
