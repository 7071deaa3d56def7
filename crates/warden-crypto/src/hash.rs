use warden_core::types::Wid;

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a watcher id from raw public key bytes using BLAKE3.
pub fn wid_from_pubkey(pubkey_bytes: &[u8]) -> Wid {
    Wid::from_bytes(blake3_hash(pubkey_bytes))
}

/// Request id of a source-chain event: lowercase hex of BLAKE3(source tx id).
/// Every watcher derives the same id from the same event.
pub fn request_id_for(source_tx_id: &str) -> String {
    hex::encode(blake3_hash(source_tx_id.as_bytes()))
}
