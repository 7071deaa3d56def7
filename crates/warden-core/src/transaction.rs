use serde::{Deserialize, Serialize};

use crate::boxes::{BoxCandidate, UtxoBox};
use crate::error::WardenError;
use crate::types::{TxId, Value};

// ── UnsignedTransaction ──────────────────────────────────────────────────────

/// A transaction skeleton ready to be handed to a signer.
///
/// The fee is implicit: `sum(inputs.value) - sum(outputs.value)`, and the
/// builders guarantee it equals `fee`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<UtxoBox>,
    /// Read-only inputs (e.g. the repo box consulted for the quorum).
    pub data_inputs: Vec<UtxoBox>,
    pub outputs: Vec<BoxCandidate>,
    pub fee: Value,
}

/// The bytes that are hashed to produce the tx id and covered by proofs.
#[derive(Serialize)]
struct UnsignedBody<'a> {
    inputs: Vec<&'a crate::types::BoxId>,
    data_inputs: Vec<&'a crate::types::BoxId>,
    outputs: &'a Vec<BoxCandidate>,
    fee: Value,
}

impl UnsignedTransaction {
    /// Canonical body bytes (bincode). Inputs are referenced by id only.
    pub fn body_bytes(&self) -> Vec<u8> {
        let body = UnsignedBody {
            inputs: self.inputs.iter().map(|b| &b.box_id).collect(),
            data_inputs: self.data_inputs.iter().map(|b| &b.box_id).collect(),
            outputs: &self.outputs,
            fee: self.fee,
        };
        bincode::serialize(&body).expect("body serialization is infallible")
    }

    pub fn tx_id(&self) -> TxId {
        TxId(*blake3::hash(&self.body_bytes()).as_bytes())
    }

    /// Output boxes with their final ids.
    pub fn output_boxes(&self) -> Vec<UtxoBox> {
        let tx_id = self.tx_id();
        self.outputs
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, c)| c.into_box(&tx_id, i as u16))
            .collect()
    }
}

// ── SignedTransaction ────────────────────────────────────────────────────────

/// A signed transaction: the unsigned skeleton plus one proof per input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx_id: TxId,
    pub unsigned: UnsignedTransaction,
    pub proofs: Vec<Vec<u8>>,
}

impl SignedTransaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WardenError> {
        bincode::deserialize(bytes).map_err(|e| WardenError::Serialization(e.to_string()))
    }

    pub fn inputs(&self) -> &[UtxoBox] {
        &self.unsigned.inputs
    }

    pub fn output_boxes(&self) -> Vec<UtxoBox> {
        self.unsigned.output_boxes()
    }
}
