use warden_core::observation::Observation;
use warden_core::types::{Digest, Wid};

/// Incremental writer for the commitment wire encoding.
struct DigestWriter(blake3::Hasher);

impl DigestWriter {
    fn str(&mut self, s: &str) -> &mut Self {
        // u32 BE length prefix keeps adjacent fields unambiguous.
        self.0.update(&(s.len() as u32).to_be_bytes());
        self.0.update(s.as_bytes());
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.update(&v.to_be_bytes());
        self
    }

    fn raw(&mut self, b: &[u8]) -> &mut Self {
        self.0.update(b);
        self
    }
}

/// Canonical digest of an observation as asserted by watcher `wid`.
///
/// Field order and encoding are part of the wire contract: every string is
/// `u32 big-endian length ‖ UTF-8 bytes`, `amount` and `fee` are `u64`
/// big-endian and the WID is appended as its raw 32 bytes.
pub fn commitment_digest(observation: &Observation, wid: &Wid) -> Digest {
    let mut w = DigestWriter(blake3::Hasher::new());
    w.str(&observation.source_tx_id)
        .str(&observation.from_chain)
        .str(&observation.to_chain)
        .str(&observation.from_address)
        .str(&observation.to_address)
        .u64(observation.amount)
        .u64(observation.fee)
        .str(&observation.source_chain_token_id)
        .str(&observation.target_chain_token_id)
        .str(&observation.source_block_id)
        .raw(wid.as_bytes());
    Digest::from_bytes(*w.0.finalize().as_bytes())
}
