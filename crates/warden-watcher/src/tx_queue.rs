use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::boxes::UtxoBox;
use warden_core::config::WatcherParams;
use warden_core::error::WardenError;
use warden_core::observation::Observation;
use warden_core::records::{TxRecord, TxType};
use warden_core::transaction::SignedTransaction;
use warden_core::types::{Address, BoxId, Height, TokenId};
use warden_state::WatcherDb;
use warden_tx::BoxSource;

use crate::network::ChainClient;

/// Submitted transactions awaiting confirmation.
pub struct TxQueue {
    db: Arc<WatcherDb>,
    chain: Arc<dyn ChainClient>,
    params: WatcherParams,
}

impl TxQueue {
    pub fn new(db: Arc<WatcherDb>, chain: Arc<dyn ChainClient>, params: WatcherParams) -> Self {
        Self { db, chain, params }
    }

    /// Record `tx`, move the observation's status forward and broadcast.
    ///
    /// The record is written before the status moves, and removed again if
    /// the status cannot move, so an upgraded status always has a queued
    /// transaction behind it. A failed broadcast is not an error here: the
    /// queue resends it on the next pass.
    pub async fn submit_transaction(
        &self,
        tx: &SignedTransaction,
        tx_type: TxType,
        observation: Option<&Observation>,
    ) -> Result<(), WardenError> {
        let height = self.chain.height().await?;
        self.db.insert_tx(&TxRecord {
            tx_id: tx.tx_id,
            tx_bytes: tx.to_bytes(),
            tx_type,
            creation_time: chrono::Utc::now().timestamp(),
            update_height: height,
            request_id: observation.map(|o| o.request_id.clone()),
            deleted: false,
        })?;
        if let Some(obs) = observation {
            if let Err(e) = self.db.upgrade_status(&obs.request_id, tx_type == TxType::Redeem, height) {
                self.db.remove_tx(&tx.tx_id)?;
                return Err(e);
            }
        }
        match self.chain.submit(tx).await {
            Ok(_) => info!(tx_id = %tx.tx_id, ?tx_type, "transaction submitted"),
            Err(e) => warn!(tx_id = %tx.tx_id, ?tx_type, error = %e, "broadcast failed; will resend"),
        }
        Ok(())
    }

    /// One pass over the queue. Each record is handled independently.
    pub async fn process_queue(&self) -> Result<(), WardenError> {
        let height = self.chain.height().await?;
        for record in self.db.active_txs()? {
            if let Err(e) = self.process_one(&record, height).await {
                warn!(tx_id = %record.tx_id, error = %e, "failed to process queued transaction");
            }
        }
        Ok(())
    }

    async fn process_one(&self, record: &TxRecord, height: Height) -> Result<(), WardenError> {
        match self.chain.tx_confirmations(&record.tx_id).await? {
            Some(n) if n >= self.params.transaction_confirmation => {
                info!(tx_id = %record.tx_id, confirmations = n, "transaction confirmed");
                self.db.remove_tx(&record.tx_id)
            }
            Some(_) => self.db.set_tx_update_height(&record.tx_id, height),
            None if self.chain.is_in_mempool(&record.tx_id).await? => {
                self.db.set_tx_update_height(&record.tx_id, height)
            }
            None if height.saturating_sub(record.update_height) > self.params.transaction_timeout => {
                warn!(tx_id = %record.tx_id, tx_type = ?record.tx_type, "transaction timed out");
                self.abandon(record, height)
            }
            None => {
                let tx = SignedTransaction::from_bytes(&record.tx_bytes)?;
                match self.chain.submit(&tx).await {
                    Ok(_) => debug!(tx_id = %record.tx_id, "transaction resent"),
                    Err(e) => warn!(tx_id = %record.tx_id, error = %e, "resend failed"),
                }
                Ok(())
            }
        }
    }

    /// Undo the status change of a transaction that will never confirm.
    fn abandon(&self, record: &TxRecord, height: Height) -> Result<(), WardenError> {
        if let Some(request_id) = &record.request_id {
            let step_back = match record.tx_type {
                TxType::Commitment => Some(false),
                TxType::Redeem => Some(true),
                TxType::Trigger | TxType::Detach | TxType::Permit => None,
            };
            if let Some(redeem) = step_back {
                if let Err(e) = self.db.downgrade_status(request_id, redeem, height) {
                    warn!(request_id, error = %e, "status not downgraded");
                }
            }
        }
        self.db.remove_tx(&record.tx_id)
    }

    /// Follow queued transactions spending `start` to the newest output at
    /// the same address, optionally requiring `token` as its first token, so
    /// new transactions can chain on unconfirmed outputs.
    pub fn track_tx_queue(&self, start: UtxoBox, token: Option<TokenId>) -> Result<UtxoBox, WardenError> {
        let queued = self.queued_txs()?;
        let mut current = start;
        loop {
            let spender = queued
                .iter()
                .find(|tx| tx.inputs().iter().any(|b| b.box_id == current.box_id));
            let Some(tx) = spender else {
                return Ok(current);
            };
            let next = tx.output_boxes().into_iter().find(|b| {
                b.address == current.address
                    && token.map_or(true, |t| b.tokens.first().is_some_and(|f| f.id == t))
            });
            match next {
                Some(b) => current = b,
                None => return Ok(current),
            }
        }
    }

    fn queued_txs(&self) -> Result<Vec<SignedTransaction>, WardenError> {
        self.db
            .active_txs()?
            .iter()
            .map(|r| SignedTransaction::from_bytes(&r.tx_bytes))
            .collect()
    }

    /// Wrap `inner` so it funds new transactions on top of the queue: boxes
    /// spent by a queued transaction are hidden, and the queue's unspent
    /// outputs at `address` are offered first.
    pub fn queued_source<S: BoxSource>(&self, inner: S, address: &Address) -> Result<QueuedBoxSource<S>, WardenError> {
        let queued = self.queued_txs()?;
        let spent: HashSet<BoxId> = queued
            .iter()
            .flat_map(|tx| tx.inputs().iter().map(|b| b.box_id))
            .collect();
        let pending: VecDeque<UtxoBox> = queued
            .iter()
            .flat_map(|tx| tx.output_boxes())
            .filter(|b| &b.address == address && !spent.contains(&b.box_id))
            .collect();
        let seen = pending.iter().map(|b| b.box_id).collect();
        Ok(QueuedBoxSource { inner, pending, spent, seen })
    }
}

/// A [`BoxSource`] that sees the chain as it will be once the queue confirms.
pub struct QueuedBoxSource<S> {
    inner: S,
    pending: VecDeque<UtxoBox>,
    spent: HashSet<BoxId>,
    // Pending outputs the chain may already report once confirmed.
    seen: HashSet<BoxId>,
}

#[async_trait]
impl<S: BoxSource> BoxSource for QueuedBoxSource<S> {
    async fn next_box(&mut self) -> Result<Option<UtxoBox>, WardenError> {
        if let Some(b) = self.pending.pop_front() {
            return Ok(Some(b));
        }
        while let Some(b) = self.inner.next_box().await? {
            if !self.spent.contains(&b.box_id) && !self.seen.contains(&b.box_id) {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use warden_core::boxes::BoxCandidate;
    use warden_core::observation::TxStatus;
    use warden_core::transaction::UnsignedTransaction;
    use warden_core::types::{Address, TxId};
    use warden_crypto::request_id_for;
    use warden_tx::VecBoxSource;

    fn params() -> WatcherParams {
        WatcherParams {
            commitment_address: Address::new("commitment"),
            trigger_address: Address::new("trigger"),
            permit_address: Address::new("permit"),
            watcher_address: Address::new("watcher"),
            rwt_id: TokenId([0xAA; 32]),
            repo_nft: TokenId([0xBB; 32]),
            tx_fee: 1_000,
            min_box_value: 100,
            observation_confirmation: 2,
            observation_valid_threshold: 100,
            transaction_confirmation: 3,
            commitment_timeout_confirmation: 50,
            transaction_timeout: 15,
            scanner_name: "scanner".into(),
        }
    }

    fn observation() -> Observation {
        Observation {
            from_chain: "cardano".into(),
            to_chain: "ergo".into(),
            from_address: "sender".into(),
            to_address: "receiver".into(),
            amount: 100,
            fee: 1,
            source_chain_token_id: "ada".into(),
            target_chain_token_id: "wada".into(),
            source_tx_id: "src".into(),
            source_block_id: "block".into(),
            request_id: request_id_for("src"),
            height: 10,
        }
    }

    fn spend(input: UtxoBox, seed: u64) -> SignedTransaction {
        let out = BoxCandidate::new(input.value - 1_000 - seed, input.address.clone(), 1);
        let unsigned = UnsignedTransaction {
            inputs: vec![input],
            data_inputs: vec![],
            outputs: vec![out],
            fee: 1_000 + seed,
        };
        SignedTransaction { tx_id: unsigned.tx_id(), unsigned, proofs: vec![vec![]] }
    }

    fn setup() -> (Arc<WatcherDb>, Arc<MockChain>, TxQueue) {
        let db = Arc::new(WatcherDb::open_temporary().unwrap());
        let chain = Arc::new(MockChain::new(100));
        let queue = TxQueue::new(db.clone(), chain.clone(), params());
        (db, chain, queue)
    }

    fn watcher_box(seed: u8) -> UtxoBox {
        BoxCandidate::new(10_000, Address::new("watcher"), 1).into_box(&TxId([seed; 32]), 0)
    }

    fn committed(db: &WatcherDb) -> Observation {
        let obs = observation();
        db.insert_observation(&obs).unwrap();
        db.check_new_observation(&obs, 10).unwrap();
        obs
    }

    #[tokio::test]
    async fn submit_upgrades_status_and_queues() {
        let (db, chain, queue) = setup();
        let obs = committed(&db);
        let tx = spend(watcher_box(1), 0);
        queue.submit_transaction(&tx, TxType::Commitment, Some(&obs)).await.unwrap();
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::Committed);
        assert_eq!(db.active_txs().unwrap().len(), 1);
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn refused_status_change_unqueues_without_broadcast() {
        let (db, chain, queue) = setup();
        let obs = committed(&db);
        let tx = spend(watcher_box(1), 0);
        let err = queue.submit_transaction(&tx, TxType::Redeem, Some(&obs)).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidTransition { .. }));
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::NotCommitted);
        assert!(db.active_txs().unwrap().is_empty());
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn confirmed_transactions_leave_the_queue() {
        let (db, chain, queue) = setup();
        let obs = committed(&db);
        let tx = spend(watcher_box(1), 0);
        queue.submit_transaction(&tx, TxType::Commitment, Some(&obs)).await.unwrap();

        chain.confirm(&tx.tx_id, 1);
        chain.set_height(102);
        queue.process_queue().await.unwrap();
        assert_eq!(db.active_txs().unwrap()[0].update_height, 102);

        chain.confirm(&tx.tx_id, 3);
        queue.process_queue().await.unwrap();
        assert!(db.active_txs().unwrap().is_empty());
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::Committed);
    }

    #[tokio::test]
    async fn lost_transaction_is_resent_then_abandoned() {
        let (db, chain, queue) = setup();
        let obs = committed(&db);
        let tx = spend(watcher_box(1), 0);
        queue.submit_transaction(&tx, TxType::Commitment, Some(&obs)).await.unwrap();

        chain.evict(&tx.tx_id);
        chain.set_height(105);
        queue.process_queue().await.unwrap();
        assert_eq!(chain.submitted().len(), 2);

        chain.evict(&tx.tx_id);
        chain.set_reject(true);
        chain.set_height(200);
        queue.process_queue().await.unwrap();
        assert!(db.active_txs().unwrap().is_empty());
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::NotCommitted);
    }

    #[tokio::test]
    async fn abandoned_redeem_returns_to_committed() {
        let (db, chain, queue) = setup();
        let obs = committed(&db);
        db.upgrade_status(&obs.request_id, false, 11).unwrap();
        let tx = spend(watcher_box(1), 0);
        queue.submit_transaction(&tx, TxType::Redeem, Some(&obs)).await.unwrap();
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::RedeemSent);

        chain.evict(&tx.tx_id);
        chain.set_height(300);
        queue.process_queue().await.unwrap();
        assert_eq!(db.status_for(&obs.request_id).unwrap().unwrap().status, TxStatus::Committed);
    }

    #[tokio::test]
    async fn tracking_follows_chained_outputs() {
        let (_db, _chain, queue) = setup();
        let start = watcher_box(1);
        let first = spend(start.clone(), 0);
        let middle = first.output_boxes()[0].clone();
        let second = spend(middle, 1);
        queue.submit_transaction(&first, TxType::Detach, None).await.unwrap();
        queue.submit_transaction(&second, TxType::Detach, None).await.unwrap();

        let tip = queue.track_tx_queue(start, None).unwrap();
        assert_eq!(tip.box_id, second.output_boxes()[0].box_id);

        let untouched = watcher_box(9);
        assert_eq!(queue.track_tx_queue(untouched.clone(), None).unwrap(), untouched);

        let with_token = queue.track_tx_queue(watcher_box(1), Some(TokenId([1; 32]))).unwrap();
        assert_eq!(with_token.box_id, watcher_box(1).box_id);
    }

    #[tokio::test]
    async fn queued_source_chains_on_pending_outputs() {
        let (_db, chain, queue) = setup();
        chain.set_reject(true);
        let first = spend(watcher_box(1), 0);
        queue.submit_transaction(&first, TxType::Detach, None).await.unwrap();
        let change = first.output_boxes()[0].clone();

        let chain_view = VecBoxSource::new(vec![watcher_box(1), change.clone(), watcher_box(2)]);
        let mut source = queue.queued_source(chain_view, &Address::new("watcher")).unwrap();
        let mut order = Vec::new();
        while let Some(b) = source.next_box().await.unwrap() {
            order.push(b.box_id);
        }
        assert_eq!(order, vec![change.box_id, watcher_box(2).box_id]);
    }
}
