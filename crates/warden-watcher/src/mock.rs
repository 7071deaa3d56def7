//! In-memory chain and scanner used by the watcher tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use warden_core::boxes::UtxoBox;
use warden_core::error::WardenError;
use warden_core::transaction::SignedTransaction;
use warden_core::types::{Address, BoxId, Height, TokenId, TxId};

use crate::network::{ChainClient, ScanBatch, ScannerFeed};

#[derive(Default)]
struct ChainState {
    height: Height,
    unspent: Vec<UtxoBox>,
    submitted: Vec<SignedTransaction>,
    confirmations: HashMap<TxId, u64>,
    mempool: HashSet<TxId>,
    reject: bool,
    page_requests: usize,
}

pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(height: Height) -> Self {
        Self { state: Mutex::new(ChainState { height, ..Default::default() }) }
    }

    pub fn add_box(&self, b: UtxoBox) {
        self.state.lock().unwrap().unspent.push(b);
    }

    pub fn set_height(&self, height: Height) {
        self.state.lock().unwrap().height = height;
    }

    pub fn set_reject(&self, reject: bool) {
        self.state.lock().unwrap().reject = reject;
    }

    /// Mine `tx_id` with `n` confirmations.
    pub fn confirm(&self, tx_id: &TxId, n: u64) {
        let mut s = self.state.lock().unwrap();
        s.mempool.remove(tx_id);
        s.confirmations.insert(*tx_id, n);
    }

    /// Drop `tx_id` from the mempool without mining it.
    pub fn evict(&self, tx_id: &TxId) {
        self.state.lock().unwrap().mempool.remove(tx_id);
    }

    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn page_requests(&self) -> usize {
        self.state.lock().unwrap().page_requests
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn height(&self) -> Result<Height, WardenError> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<TxId, WardenError> {
        let mut s = self.state.lock().unwrap();
        if s.reject {
            return Err(WardenError::TxRejected("mock rejection".into()));
        }
        let spent: HashSet<BoxId> = tx.inputs().iter().map(|b| b.box_id).collect();
        s.unspent.retain(|b| !spent.contains(&b.box_id));
        s.mempool.insert(tx.tx_id);
        s.submitted.push(tx.clone());
        Ok(tx.tx_id)
    }

    async fn unspent_boxes_by_address(
        &self,
        address: &Address,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UtxoBox>, WardenError> {
        let mut s = self.state.lock().unwrap();
        s.page_requests += 1;
        Ok(s.unspent
            .iter()
            .filter(|b| &b.address == address)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn box_by_token_id(&self, token: &TokenId) -> Result<Option<UtxoBox>, WardenError> {
        let s = self.state.lock().unwrap();
        Ok(s.unspent.iter().find(|b| b.tokens.amount_of(token) > 0).cloned())
    }

    async fn box_by_id(&self, id: &BoxId) -> Result<Option<UtxoBox>, WardenError> {
        let s = self.state.lock().unwrap();
        Ok(s.unspent.iter().find(|b| &b.box_id == id).cloned())
    }

    async fn tx_confirmations(&self, tx_id: &TxId) -> Result<Option<u64>, WardenError> {
        Ok(self.state.lock().unwrap().confirmations.get(tx_id).copied())
    }

    async fn is_in_mempool(&self, tx_id: &TxId) -> Result<bool, WardenError> {
        Ok(self.state.lock().unwrap().mempool.contains(tx_id))
    }
}

/// Scanner feed replaying queued batches.
#[derive(Default)]
pub struct MockFeed {
    batches: Mutex<VecDeque<ScanBatch>>,
    requested: Mutex<Vec<Height>>,
}

impl MockFeed {
    pub fn push(&self, batch: ScanBatch) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn requested(&self) -> Vec<Height> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScannerFeed for MockFeed {
    async fn fetch(&self, from_height: Height) -> Result<Option<ScanBatch>, WardenError> {
        self.requested.lock().unwrap().push(from_height);
        Ok(self.batches.lock().unwrap().pop_front())
    }
}
