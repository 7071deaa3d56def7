use serde::{Deserialize, Serialize};

use crate::boxes::UtxoBox;
use crate::types::{BoxId, Digest, Height, TxId, Wid};

/// A commitment box seen on chain, as stored by the scanner collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub box_id: BoxId,
    /// Request id of the observation the commitment asserts.
    pub event_id: String,
    pub wid: Wid,
    pub digest: Digest,
    pub height: Height,
    /// Height at which the box was spent; `None` while live.
    pub spend_height: Option<Height>,
    pub boxed: UtxoBox,
}

impl CommitmentRecord {
    pub fn is_live(&self) -> bool {
        self.spend_height.is_none()
    }
}

/// A trigger box seen on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub box_id: BoxId,
    pub event_id: String,
    pub source_tx_id: String,
    pub wids: Vec<Wid>,
    pub height: Height,
    pub spend_height: Option<Height>,
    pub boxed: UtxoBox,
}

// ── Transaction queue ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    Commitment,
    Trigger,
    Detach,
    Redeem,
    Permit,
}

/// A submitted transaction kept until it is confirmed or abandoned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_id: TxId,
    /// bincode-serialized `SignedTransaction`.
    pub tx_bytes: Vec<u8>,
    pub tx_type: TxType,
    /// Unix timestamp (seconds) of the first submission.
    pub creation_time: i64,
    /// Target-chain height of the last successful check.
    pub update_height: Height,
    pub request_id: Option<String>,
    pub deleted: bool,
}
