use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::config::WatcherParams;
use warden_core::error::WardenError;
use warden_core::observation::{Observation, ObservationStatus, Transition, TxStatus};
use warden_core::records::CommitmentRecord;
use warden_core::types::{Height, Wid};
use warden_state::WatcherDb;

/// Latest known heights of both chains, read once per tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTips {
    /// Last source-chain block processed by the scanner.
    pub source: Height,
    /// Current target-chain height.
    pub target: Height,
}

/// Live commitments for one committed observation, ready to be merged.
#[derive(Clone, Debug)]
pub struct CommitmentSet {
    pub observation: Observation,
    /// One commitment per WID, in ascending box id order.
    pub commitments: Vec<CommitmentRecord>,
    /// WIDs seen on more than one live commitment.
    pub duplicate_wids: Vec<Wid>,
}

/// Drives each observation through its lifecycle for one watcher.
pub struct ObservationTracker {
    db: Arc<WatcherDb>,
    params: WatcherParams,
    wid: Wid,
}

impl ObservationTracker {
    pub fn new(db: Arc<WatcherDb>, params: WatcherParams, wid: Wid) -> Self {
        Self { db, params, wid }
    }

    /// Whether a trigger already merged commitments for `observation`.
    ///
    /// Once the trigger is `transaction_confirmation` blocks deep the status
    /// is moved to `Revealed`.
    pub fn is_merge_happened(&self, observation: &Observation, tips: ChainTips) -> Result<bool, WardenError> {
        let Some(trigger) = self.db.trigger_by_source_tx_id(&observation.source_tx_id)? else {
            return Ok(false);
        };
        let status = self.status_of(observation)?;
        let deep = trigger.height.saturating_add(self.params.transaction_confirmation) <= tips.target;
        if deep && status.status.next(Transition::MergeDetected).is_some() && status.status != TxStatus::Revealed {
            self.db.mark_revealed(&observation.request_id, tips.source)?;
            info!(request_id = %observation.request_id, "merge detected");
        }
        Ok(true)
    }

    /// Whether this watcher may still commit to `observation`.
    ///
    /// Side effects are idempotent: the timeout and merge transitions fire
    /// at most once because later calls see the updated status.
    pub fn is_observation_valid(&self, observation: &Observation, tips: ChainTips) -> Result<bool, WardenError> {
        let status = self.status_of(observation)?;
        if status.status.is_terminal() {
            return Ok(false);
        }
        if tips.source.saturating_sub(observation.height) > self.params.observation_valid_threshold {
            if status.status.next(Transition::Timeout).is_some() {
                self.db.mark_timed_out(&observation.request_id, tips.source)?;
                info!(request_id = %observation.request_id, "observation timed out");
            }
            return Ok(false);
        }
        if self.is_merge_happened(observation, tips)? {
            return Ok(false);
        }
        Ok(self.own_live_commitment(&observation.request_id)?.is_none())
    }

    /// Status row of a tracked observation. Rows are created on ingest, so a
    /// missing one is an error, never an implicit insert.
    fn status_of(&self, observation: &Observation) -> Result<ObservationStatus, WardenError> {
        self.db
            .status_for(&observation.request_id)?
            .ok_or_else(|| WardenError::NoObservationStatus(observation.request_id.clone()))
    }

    fn own_live_commitment(&self, request_id: &str) -> Result<Option<CommitmentRecord>, WardenError> {
        Ok(self
            .db
            .commitments_by_event_id(request_id)?
            .into_iter()
            .find(|c| c.wid == self.wid && c.is_live()))
    }

    /// Confirmed observations this watcher has not committed to yet and may
    /// still commit to.
    pub fn all_ready_observations(&self, tips: ChainTips) -> Result<Vec<Observation>, WardenError> {
        let mut ready = Vec::new();
        let confirmed = self
            .db
            .confirmed_observations(self.params.observation_confirmation, tips.source)?;
        for obs in confirmed {
            let status = self.db.check_new_observation(&obs, tips.source)?;
            if status.status != TxStatus::NotCommitted {
                continue;
            }
            if self.is_observation_valid(&obs, tips)? {
                ready.push(obs);
            }
        }
        debug!(count = ready.len(), "ready observations");
        Ok(ready)
    }

    /// Commitment sets for committed observations that have not been merged.
    ///
    /// Same-WID duplicates are flagged, not resolved silently: a duplicate of
    /// this watcher's own WID points at a local bug and is logged as a
    /// warning. The first commitment per WID is kept.
    pub fn all_ready_commitment_sets(&self, tips: ChainTips) -> Result<Vec<CommitmentSet>, WardenError> {
        let mut sets = Vec::new();
        for obs in self.db.observations_by_status(TxStatus::Committed)? {
            if self.is_merge_happened(&obs, tips)? {
                continue;
            }
            let mut seen = HashSet::new();
            let mut commitments = Vec::new();
            let mut duplicate_wids = Vec::new();
            for c in self.db.commitments_by_event_id(&obs.request_id)? {
                if !c.is_live() {
                    continue;
                }
                if seen.insert(c.wid) {
                    commitments.push(c);
                    continue;
                }
                if c.wid == self.wid {
                    warn!(request_id = %obs.request_id, box_id = %c.box_id, "duplicate commitment with own WID");
                } else {
                    info!(request_id = %obs.request_id, wid = %c.wid, box_id = %c.box_id, "duplicate commitment");
                }
                if !duplicate_wids.contains(&c.wid) {
                    duplicate_wids.push(c.wid);
                }
            }
            if !commitments.is_empty() {
                sets.push(CommitmentSet { observation: obs, commitments, duplicate_wids });
            }
        }
        Ok(sets)
    }

    /// This watcher's live commitments older than the commitment timeout
    /// whose observation was never merged.
    pub fn all_timeout_commitments(&self, tips: ChainTips) -> Result<Vec<CommitmentRecord>, WardenError> {
        let Some(max_height) = tips.target.checked_sub(self.params.commitment_timeout_confirmation) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for c in self.db.commitments_by_wid_and_max_height(&self.wid, max_height)? {
            let merged = match self.db.observation(&c.event_id)? {
                Some(obs) => self.db.trigger_by_source_tx_id(&obs.source_tx_id)?.is_some(),
                None => false,
            };
            if !merged {
                out.push(c);
            }
        }
        Ok(out)
    }
}
