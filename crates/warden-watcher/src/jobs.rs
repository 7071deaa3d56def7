use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::boxes::{RegisterId, UtxoBox};
use warden_core::config::WatcherParams;
use warden_core::error::{ErrorKind, WardenError};
use warden_core::observation::TxStatus;
use warden_core::records::TxType;
use warden_core::types::Wid;
use warden_crypto::TxSigner;
use warden_state::WatcherDb;
use warden_tx::{BuilderState, CommitmentTxBuilder, RwtRepo, TriggerTxBuilder};

use crate::network::{all_unspent, ChainBoxSource, ChainClient, ScannerFeed};
use crate::sync::ScanSync;
use crate::tracker::{ChainTips, CommitmentSet, ObservationTracker};
use crate::tx_queue::{QueuedBoxSource, TxQueue};

/// Everything one watcher does, one step per call to [`Watcher::tick`].
pub struct Watcher {
    params: WatcherParams,
    db: Arc<WatcherDb>,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TxSigner>,
    sync: ScanSync,
    queue: TxQueue,
    tracker: ObservationTracker,
}

impl Watcher {
    pub fn new(
        params: WatcherParams,
        db: Arc<WatcherDb>,
        chain: Arc<dyn ChainClient>,
        feed: Arc<dyn ScannerFeed>,
        signer: Arc<dyn TxSigner>,
    ) -> Self {
        let wid = signer.wid();
        Self {
            sync: ScanSync::new(db.clone(), feed, params.clone()),
            queue: TxQueue::new(db.clone(), chain.clone(), params.clone()),
            tracker: ObservationTracker::new(db.clone(), params.clone(), wid),
            params,
            db,
            chain,
            signer,
        }
    }

    pub fn wid(&self) -> Wid {
        self.signer.wid()
    }

    pub fn tracker(&self) -> &ObservationTracker {
        &self.tracker
    }

    /// One scheduling step: scan sync, tx queue, commitment creation,
    /// trigger creation, commitment redeem.
    ///
    /// A failing job is logged and retried on the next tick; later jobs still
    /// run.
    pub async fn tick(&self) {
        if let Err(e) = self.sync.sync().await {
            warn!(error = %e, "scan sync failed");
        }
        if let Err(e) = self.queue.process_queue().await {
            warn!(error = %e, "tx queue processing failed");
        }
        let tips = match self.tips().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "chain heights unavailable");
                return;
            }
        };
        if let Err(e) = self.create_commitments(tips).await {
            warn!(error = %e, "commitment job failed");
        }
        if let Err(e) = self.create_triggers(tips).await {
            warn!(error = %e, "trigger job failed");
        }
        if let Err(e) = self.redeem_commitments(tips).await {
            warn!(error = %e, "redeem job failed");
        }
    }

    pub async fn tips(&self) -> Result<ChainTips, WardenError> {
        let source = match self.db.last_block_height(&self.params.scanner_name) {
            Ok(h) => h,
            Err(WardenError::NoScannedBlock(_)) => 0,
            Err(e) => return Err(e),
        };
        let target = self.chain.height().await?;
        Ok(ChainTips { source, target })
    }

    async fn repo(&self) -> Result<RwtRepo, WardenError> {
        let boxed = self
            .chain
            .box_by_token_id(&self.params.repo_nft)
            .await?
            .ok_or(WardenError::RepoBoxNotFound(self.params.repo_nft))?;
        RwtRepo::from_box(&boxed)
    }

    /// Funding boxes at the watcher address, as they stand after the queue.
    fn funding(&self) -> Result<QueuedBoxSource<ChainBoxSource>, WardenError> {
        let chain = ChainBoxSource::new(self.chain.clone(), self.params.watcher_address.clone());
        self.queue.queued_source(chain, &self.params.watcher_address)
    }

    /// This watcher's permit boxes, advanced past queued transactions.
    async fn permits(&self) -> Result<Vec<UtxoBox>, WardenError> {
        let wid = self.wid();
        let mut out = Vec::new();
        for b in all_unspent(self.chain.clone(), &self.params.permit_address).await? {
            if !b.registers.bytes(RegisterId::R4).is_ok_and(|w| w == wid.as_bytes()) {
                continue;
            }
            let tip = self.queue.track_tx_queue(b, Some(self.params.rwt_id))?;
            if !out.iter().any(|p: &UtxoBox| p.box_id == tip.box_id) {
                out.push(tip);
            }
        }
        Ok(out)
    }

    // ── Commitment creation ──────────────────────────────────────────────────

    /// Commit to every ready observation. Returns how many were submitted.
    pub async fn create_commitments(&self, tips: ChainTips) -> Result<usize, WardenError> {
        let ready = self.tracker.all_ready_observations(tips)?;
        if ready.is_empty() {
            return Ok(0);
        }
        let repo = self.repo().await?;
        let wid = self.wid();
        if repo.bonded_of(&wid) == 0 {
            warn!(wid = %wid, "watcher holds no bonded RWT; not committing");
            return Ok(0);
        }
        let builder = CommitmentTxBuilder::new(&self.params, tips.target);
        let mut submitted = 0;
        for obs in ready {
            let permits = self.permits().await?;
            let mut funding = self.funding()?;
            let tx = match builder
                .build(&obs, &wid, repo.commitment_stake, &permits, &mut funding)
                .await
            {
                Ok(tx) => tx,
                Err(e) if e.kind() == ErrorKind::Resource => {
                    warn!(request_id = %obs.request_id, error = %e, "not enough funds to commit");
                    break;
                }
                Err(e) => {
                    warn!(request_id = %obs.request_id, error = %e, "commitment not built");
                    continue;
                }
            };
            let signed = self.signer.sign_tx(tx)?;
            self.queue.submit_transaction(&signed, TxType::Commitment, Some(&obs)).await?;
            info!(request_id = %obs.request_id, tx_id = %signed.tx_id, "commitment sent");
            submitted += 1;
        }
        Ok(submitted)
    }

    // ── Trigger creation ─────────────────────────────────────────────────────

    /// Merge every commitment set that reached the quorum.
    pub async fn create_triggers(&self, tips: ChainTips) -> Result<usize, WardenError> {
        let sets = self.tracker.all_ready_commitment_sets(tips)?;
        if sets.is_empty() {
            return Ok(0);
        }
        let repo = self.repo().await?;
        let required = repo.required_commitments()?;
        let mut submitted = 0;
        for set in sets {
            if (set.commitments.len() as u64) < required {
                debug!(
                    request_id = %set.observation.request_id,
                    have = set.commitments.len(),
                    need = required,
                    "quorum not reached yet"
                );
                continue;
            }
            match self.merge(set, &repo, tips).await {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "trigger not built"),
            }
        }
        Ok(submitted)
    }

    async fn merge(&self, set: CommitmentSet, repo: &RwtRepo, tips: ChainTips) -> Result<bool, WardenError> {
        let obs = set.observation;
        let mut builder = TriggerTxBuilder::new(self.params.clone(), obs.clone(), repo.clone(), tips.target)?;
        let boxes: Vec<UtxoBox> = set.commitments.into_iter().map(|c| c.boxed).collect();
        if let Err(e) = builder.add_commitments(&boxes) {
            // One bad peer must not block the merge: retry box by box.
            debug!(request_id = %obs.request_id, error = %e, "batch rejected, adding individually");
            for b in &boxes {
                if let Err(e) = builder.add_commitments(std::slice::from_ref(b)) {
                    warn!(request_id = %obs.request_id, box_id = %b.box_id, error = %e, "invalid commitment");
                }
            }
        }
        if builder.state() != BuilderState::Ready {
            return Ok(false);
        }
        let tx = builder.build(&mut self.funding()?).await?;
        let signed = self.signer.sign_tx(tx)?;
        self.queue.submit_transaction(&signed, TxType::Trigger, Some(&obs)).await?;
        info!(request_id = %obs.request_id, tx_id = %signed.tx_id, "trigger sent");
        Ok(true)
    }

    // ── Commitment redeem ────────────────────────────────────────────────────

    /// Reclaim the stake of expired commitments and drop spent ones that are
    /// older than the timeout.
    pub async fn redeem_commitments(&self, tips: ChainTips) -> Result<usize, WardenError> {
        let wid = self.wid();
        let builder = CommitmentTxBuilder::new(&self.params, tips.target);
        let mut submitted = 0;
        for rec in self.tracker.all_timeout_commitments(tips)? {
            let Some(obs) = self.db.observation(&rec.event_id)? else {
                warn!(event_id = %rec.event_id, "commitment for unknown observation");
                continue;
            };
            let committed = self.db.status_for(&obs.request_id)?.is_some_and(|s| s.status == TxStatus::Committed);
            if !committed {
                continue;
            }
            let tx = match builder.build_redeem(&rec.boxed, &wid, &mut self.funding()?).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(box_id = %rec.box_id, error = %e, "redeem not built");
                    continue;
                }
            };
            let signed = self.signer.sign_tx(tx)?;
            self.queue.submit_transaction(&signed, TxType::Redeem, Some(&obs)).await?;
            info!(request_id = %obs.request_id, tx_id = %signed.tx_id, "commitment redeem sent");
            submitted += 1;
        }

        if let Some(before) = tips.target.checked_sub(self.params.commitment_timeout_confirmation) {
            let old: Vec<_> = self.db.old_spent_commitments(before)?.iter().map(|c| c.box_id).collect();
            if !old.is_empty() {
                debug!(count = old.len(), "removing old spent commitments");
                self.db.delete_commitments(&old)?;
            }
        }
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChain, MockFeed};
    use crate::network::ScanBatch;
    use warden_core::boxes::{BoxCandidate, RegisterValue, Token, TokenBag};
    use std::collections::HashSet;
    use warden_core::observation::Observation;
    use warden_core::transaction::SignedTransaction;
    use warden_core::types::{Address, BoxId, Height, TokenId, TxId};
    use warden_crypto::{commitment_digest, request_id_for, KeyPair};
    use warden_tx::encode_commitment_box;

    const STAKE: u64 = 100;

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

    struct Fixture {
        watcher: Watcher,
        db: Arc<WatcherDb>,
        chain: Arc<MockChain>,
        feed: Arc<MockFeed>,
        wid: Wid,
    }

    /// Three bonded watchers, quorum two. The local one holds a permit and
    /// two funding boxes.
    fn fixture() -> Fixture {
        let p = params();
        let signer = Arc::new(KeyPair::generate());
        let wid = signer.wid;
        let chain = Arc::new(MockChain::new(500));

        let entries = [(wid, STAKE), (Wid([1; 32]), STAKE), (Wid([2; 32]), STAKE)];
        let mut repo = BoxCandidate::new(p.min_box_value, Address::new("repo"), 1);
        repo.tokens = TokenBag::new().with(p.repo_nft, 1);
        repo.registers = RwtRepo::registers(&entries, STAKE, 51, 100);
        chain.add_box(repo.into_box(&TxId([0xEE; 32]), 0));

        let mut permit = BoxCandidate::new(p.min_box_value, p.permit_address.clone(), 1);
        permit.tokens = TokenBag::new().with(p.rwt_id, 3 * STAKE);
        permit.registers.set(RegisterId::R4, RegisterValue::Bytes(wid.as_bytes().to_vec()));
        chain.add_box(permit.into_box(&TxId([0xDD; 32]), 0));

        for i in 0..2u8 {
            chain.add_box(BoxCandidate::new(100_000, p.watcher_address.clone(), 1).into_box(&TxId([0x50 + i; 32]), 0));
        }

        let db = Arc::new(WatcherDb::open_temporary().unwrap());
        let feed = Arc::new(MockFeed::default());
        let watcher = Watcher::new(p, db.clone(), chain.clone(), feed.clone(), signer);
        Fixture { watcher, db, chain, feed, wid }
    }

    fn peer_commitment(wid: Wid, height: Height) -> UtxoBox {
        let p = params();
        let obs = observation();
        encode_commitment_box(
            &p.commitment_address,
            &Token::new(p.rwt_id, STAKE),
            &wid,
            &obs.request_id,
            &commitment_digest(&obs, &wid),
            p.min_box_value,
            height,
        )
        .into_box(&TxId([wid.as_bytes()[0]; 32]), 0)
    }

    fn status(db: &WatcherDb) -> TxStatus {
        db.status_for(&observation().request_id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn observation_is_committed_then_merged() {
        let f = fixture();
        let obs = observation();
        f.feed.push(ScanBatch { height: 20, observations: vec![obs.clone()], ..Default::default() });

        f.watcher.tick().await;
        assert_eq!(status(&f.db), TxStatus::Committed);
        let submitted = f.chain.submitted();
        assert_eq!(submitted.len(), 1);
        let own = submitted[0]
            .output_boxes()
            .into_iter()
            .find(|b| b.address == params().commitment_address)
            .unwrap();
        assert_eq!(own.registers.bytes(RegisterId::R4).unwrap(), f.wid.as_bytes());
        assert_eq!(own.tokens.amount_of(&params().rwt_id), STAKE);

        // A second tick before the scanner reports anything does not commit again.
        f.watcher.tick().await;
        assert_eq!(f.chain.submitted().len(), 1);

        f.feed.push(ScanBatch {
            height: 21,
            commitments: vec![own, peer_commitment(Wid([1; 32]), 501)],
            ..Default::default()
        });
        f.watcher.tick().await;
        assert_eq!(status(&f.db), TxStatus::Revealed);

        let submitted = f.chain.submitted();
        assert_eq!(submitted.len(), 2);
        let trigger = &submitted[1].unsigned.outputs[0];
        assert_eq!(trigger.address, params().trigger_address);
        assert_eq!(trigger.tokens.amount_of(&params().rwt_id), 2 * STAKE);
        assert_eq!(trigger.registers.bytes_coll(RegisterId::R4).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_peer_commitment_is_skipped() {
        let f = fixture();
        let obs = observation();
        f.feed.push(ScanBatch { height: 20, observations: vec![obs.clone()], ..Default::default() });
        f.watcher.tick().await;
        let own = f.chain.submitted()[0]
            .output_boxes()
            .into_iter()
            .find(|b| b.address == params().commitment_address)
            .unwrap();

        // Peer 1 commits with a digest for another WID; peer 2 is honest.
        let mut forged = peer_commitment(Wid([1; 32]), 501);
        forged.registers.set(
            RegisterId::R6,
            RegisterValue::Bytes(commitment_digest(&obs, &Wid([9; 32])).as_bytes().to_vec()),
        );
        f.feed.push(ScanBatch {
            height: 21,
            commitments: vec![own, forged, peer_commitment(Wid([2; 32]), 502)],
            ..Default::default()
        });
        f.watcher.tick().await;

        let submitted = f.chain.submitted();
        assert_eq!(submitted.len(), 2);
        let wids = submitted[1].unsigned.outputs[0].registers.bytes_coll(RegisterId::R4).unwrap().to_vec();
        assert!(!wids.contains(&vec![1u8; 32]));
        assert!(wids.contains(&vec![2u8; 32]));
    }

    #[tokio::test]
    async fn quorum_not_reached_builds_nothing() {
        let f = fixture();
        let obs = observation();
        f.feed.push(ScanBatch { height: 20, observations: vec![obs], ..Default::default() });
        f.watcher.tick().await;
        let own = f.chain.submitted()[0]
            .output_boxes()
            .into_iter()
            .find(|b| b.address == params().commitment_address)
            .unwrap();
        f.feed.push(ScanBatch { height: 21, commitments: vec![own], ..Default::default() });
        f.watcher.tick().await;

        assert_eq!(f.chain.submitted().len(), 1);
        assert_eq!(status(&f.db), TxStatus::Committed);
    }

    #[tokio::test]
    async fn expired_commitment_is_redeemed() {
        let f = fixture();
        let obs = observation();
        f.feed.push(ScanBatch { height: 20, observations: vec![obs.clone()], ..Default::default() });
        f.watcher.tick().await;
        let own = f.chain.submitted()[0]
            .output_boxes()
            .into_iter()
            .find(|b| b.address == params().commitment_address)
            .unwrap();
        f.feed.push(ScanBatch { height: 21, commitments: vec![own.clone()], ..Default::default() });
        f.watcher.tick().await;

        f.chain.confirm(&f.chain.submitted()[0].tx_id, 10);
        f.chain.set_height(600);
        let tips = ChainTips { source: 21, target: 600 };
        assert_eq!(f.watcher.redeem_commitments(tips).await.unwrap(), 1);
        assert_eq!(status(&f.db), TxStatus::RedeemSent);

        let redeem = f.chain.submitted().last().cloned().unwrap();
        assert_eq!(redeem.inputs()[0].box_id, own.box_id);
        let permit = &redeem.unsigned.outputs[0];
        assert_eq!(permit.address, params().permit_address);
        assert_eq!(permit.tokens.amount_of(&params().rwt_id), STAKE);

        // Already sent: the next pass leaves it alone.
        assert_eq!(f.watcher.redeem_commitments(tips).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_repo_box_fails_the_job() {
        let db = Arc::new(WatcherDb::open_temporary().unwrap());
        let chain = Arc::new(MockChain::new(500));
        let feed = Arc::new(MockFeed::default());
        let watcher = Watcher::new(params(), db.clone(), chain, feed.clone(), Arc::new(KeyPair::generate()));
        feed.push(ScanBatch { height: 20, observations: vec![observation()], ..Default::default() });
        watcher.sync.sync().await.unwrap();

        let tips = watcher.tips().await.unwrap();
        assert_eq!(tips, ChainTips { source: 20, target: 500 });
        let err = watcher.create_commitments(tips).await.unwrap_err();
        assert!(matches!(err, WardenError::RepoBoxNotFound(_)));
        assert_eq!(status(&db), TxStatus::NotCommitted);
    }

    #[tokio::test]
    async fn commitments_in_one_tick_chain_their_funding() {
        let f = fixture();
        let first = observation();
        let second = Observation {
            source_tx_id: "src-2".into(),
            request_id: request_id_for("src-2"),
            ..observation()
        };
        // Nothing reaches the chain, so its unspent set never moves.
        f.chain.set_reject(true);
        f.feed.push(ScanBatch {
            height: 20,
            observations: vec![first.clone(), second.clone()],
            ..Default::default()
        });
        f.watcher.tick().await;

        let queued: Vec<SignedTransaction> = f
            .db
            .active_txs()
            .unwrap()
            .iter()
            .map(|r| SignedTransaction::from_bytes(&r.tx_bytes).unwrap())
            .collect();
        assert_eq!(queued.len(), 2);
        let inputs: Vec<BoxId> = queued.iter().flat_map(|tx| tx.inputs().iter().map(|b| b.box_id)).collect();
        let distinct: HashSet<BoxId> = inputs.iter().copied().collect();
        assert_eq!(distinct.len(), inputs.len());

        let spends_change_of = |a: &SignedTransaction, b: &SignedTransaction| {
            a.output_boxes()
                .iter()
                .filter(|o| o.address == params().watcher_address)
                .any(|o| b.inputs().iter().any(|i| i.box_id == o.box_id))
        };
        assert!(spends_change_of(&queued[0], &queued[1]) || spends_change_of(&queued[1], &queued[0]));
        for o in [&first, &second] {
            assert_eq!(f.db.status_for(&o.request_id).unwrap().unwrap().status, TxStatus::Committed);
        }
    }

    #[tokio::test]
    async fn unbonded_watcher_does_not_commit() {
        let f = fixture();
        let outsider = Watcher::new(
            params(),
            f.db.clone(),
            f.chain.clone(),
            f.feed.clone(),
            Arc::new(KeyPair::generate()),
        );
        f.feed.push(ScanBatch { height: 20, observations: vec![observation()], ..Default::default() });
        outsider.tick().await;
        assert!(f.chain.submitted().is_empty());
        assert_eq!(status(&f.db), TxStatus::NotCommitted);
    }
}
