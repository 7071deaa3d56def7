use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use warden_core::boxes::UtxoBox;
use warden_core::constants::DEFAULT_API_LIMIT;
use warden_core::error::WardenError;
use warden_core::observation::Observation;
use warden_core::transaction::SignedTransaction;
use warden_core::types::{Address, BoxId, Height, TokenId, TxId};
use warden_tx::BoxSource;

// ── Target chain ─────────────────────────────────────────────────────────────

/// Node or explorer of the target chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current height of the best chain.
    async fn height(&self) -> Result<Height, WardenError>;

    /// Broadcast `tx`. A refusal by the node is `TxRejected`.
    async fn submit(&self, tx: &SignedTransaction) -> Result<TxId, WardenError>;

    /// Unspent boxes owned by `address`, paged.
    async fn unspent_boxes_by_address(
        &self,
        address: &Address,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UtxoBox>, WardenError>;

    /// The unspent box currently holding `token`, if any.
    async fn box_by_token_id(&self, token: &TokenId) -> Result<Option<UtxoBox>, WardenError>;

    async fn box_by_id(&self, id: &BoxId) -> Result<Option<UtxoBox>, WardenError>;

    /// Confirmations of a mined transaction; `None` if it is not on chain.
    async fn tx_confirmations(&self, tx_id: &TxId) -> Result<Option<u64>, WardenError>;

    async fn is_in_mempool(&self, tx_id: &TxId) -> Result<bool, WardenError>;
}

// ── Scanner feed ─────────────────────────────────────────────────────────────

/// A trigger box together with the source transaction it finalizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub source_tx_id: String,
    pub boxed: UtxoBox,
}

/// Everything the scanner found between the requested height and `height`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBatch {
    /// Last source-chain block covered by this batch.
    pub height: Height,
    pub observations: Vec<Observation>,
    /// Commitment boxes created on the target chain.
    pub commitments: Vec<UtxoBox>,
    pub triggers: Vec<TriggerEvent>,
    /// Boxes spent on the target chain, with the spending height.
    pub spent: Vec<(BoxId, Height)>,
}

/// Append-only feed of confirmed source events and target-chain boxes.
#[async_trait]
pub trait ScannerFeed: Send + Sync {
    /// Next batch starting at `from_height`; `None` when nothing new.
    async fn fetch(&self, from_height: Height) -> Result<Option<ScanBatch>, WardenError>;
}

// ── Paged box source ─────────────────────────────────────────────────────────

/// Pages through the unspent boxes of one address on demand.
pub struct ChainBoxSource {
    chain: Arc<dyn ChainClient>,
    address: Address,
    offset: u64,
    page: VecDeque<UtxoBox>,
    exhausted: bool,
}

impl ChainBoxSource {
    pub fn new(chain: Arc<dyn ChainClient>, address: Address) -> Self {
        Self { chain, address, offset: 0, page: VecDeque::new(), exhausted: false }
    }
}

#[async_trait]
impl BoxSource for ChainBoxSource {
    async fn next_box(&mut self) -> Result<Option<UtxoBox>, WardenError> {
        if self.page.is_empty() && !self.exhausted {
            let boxes = self
                .chain
                .unspent_boxes_by_address(&self.address, self.offset, DEFAULT_API_LIMIT)
                .await?;
            self.exhausted = (boxes.len() as u64) < DEFAULT_API_LIMIT;
            self.offset += boxes.len() as u64;
            self.page.extend(boxes);
        }
        Ok(self.page.pop_front())
    }
}

/// Collect every unspent box at `address`.
pub async fn all_unspent(chain: Arc<dyn ChainClient>, address: &Address) -> Result<Vec<UtxoBox>, WardenError> {
    let mut source = ChainBoxSource::new(chain, address.clone());
    let mut out = Vec::new();
    while let Some(b) = source.next_box().await? {
        out.push(b);
    }
    Ok(out)
}
