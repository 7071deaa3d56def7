use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use warden_core::error::WardenError;
use warden_core::observation::{Observation, ObservationStatus, Transition, TxStatus};
use warden_core::records::{CommitmentRecord, TriggerRecord, TxRecord};
use warden_core::types::{BoxId, Height, TxId, Wid};

fn storage(e: sled::Error) -> WardenError {
    WardenError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WardenError> {
    bincode::serialize(value).map_err(|e| WardenError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WardenError> {
    bincode::deserialize(bytes).map_err(|e| WardenError::Serialization(e.to_string()))
}

fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, WardenError> {
    match tree.get(key).map_err(storage)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<(), WardenError> {
    tree.insert(key, encode(value)?).map_err(storage)?;
    Ok(())
}

fn values<T: DeserializeOwned>(tree: &sled::Tree) -> impl Iterator<Item = Result<T, WardenError>> + '_ {
    tree.iter().map(|item| {
        let (_, bytes) = item.map_err(storage)?;
        decode(&bytes)
    })
}

/// Persistent watcher state backed by sled.
///
/// Named trees:
///   scanners     : utf8 scanner name   → u64 BE height
///   observations : utf8 request id     → bincode(Observation)
///   source_txs   : utf8 source tx id   → utf8 request id
///   statuses     : utf8 request id     → bincode(ObservationStatus)
///   commitments  : BoxId bytes         → bincode(CommitmentRecord)
///   triggers     : BoxId bytes         → bincode(TriggerRecord)
///   txs          : TxId bytes          → bincode(TxRecord)
///
/// Box-keyed trees iterate in ascending box id order, which is the
/// canonical commitment order.
pub struct WatcherDb {
    _db: sled::Db,
    scanners: sled::Tree,
    observations: sled::Tree,
    source_txs: sled::Tree,
    statuses: sled::Tree,
    commitments: sled::Tree,
    triggers: sled::Tree,
    txs: sled::Tree,
}

impl WatcherDb {
    /// Open or create the watcher database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WardenError> {
        let db = sled::open(path).map_err(storage)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn open_temporary() -> Result<Self, WardenError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, WardenError> {
        let scanners     = db.open_tree("scanners").map_err(storage)?;
        let observations = db.open_tree("observations").map_err(storage)?;
        let source_txs   = db.open_tree("source_txs").map_err(storage)?;
        let statuses     = db.open_tree("statuses").map_err(storage)?;
        let commitments  = db.open_tree("commitments").map_err(storage)?;
        let triggers     = db.open_tree("triggers").map_err(storage)?;
        let txs          = db.open_tree("txs").map_err(storage)?;
        Ok(Self { _db: db, scanners, observations, source_txs, statuses, commitments, triggers, txs })
    }

    // ── Scanner progress ─────────────────────────────────────────────────────

    pub fn put_last_block_height(&self, scanner: &str, height: Height) -> Result<(), WardenError> {
        self.scanners
            .insert(scanner.as_bytes(), height.to_be_bytes().to_vec())
            .map_err(storage)?;
        Ok(())
    }

    /// Last height processed by `scanner`; fails if it has never run.
    pub fn last_block_height(&self, scanner: &str) -> Result<Height, WardenError> {
        let bytes = self
            .scanners
            .get(scanner.as_bytes())
            .map_err(storage)?
            .ok_or_else(|| WardenError::NoScannedBlock(scanner.to_string()))?;
        let arr: [u8; 8] = bytes[..]
            .try_into()
            .map_err(|_| WardenError::Serialization(format!("bad height for {scanner}")))?;
        Ok(u64::from_be_bytes(arr))
    }

    // ── Observations ─────────────────────────────────────────────────────────

    /// Store a new observation. Observations are immutable, so an existing
    /// request id is left untouched and `false` is returned.
    pub fn insert_observation(&self, observation: &Observation) -> Result<bool, WardenError> {
        let key = observation.request_id.as_bytes();
        let inserted = self
            .observations
            .compare_and_swap(key, None as Option<&[u8]>, Some(encode(observation)?))
            .map_err(storage)?
            .is_ok();
        if inserted {
            self.source_txs
                .insert(observation.source_tx_id.as_bytes(), key)
                .map_err(storage)?;
        }
        Ok(inserted)
    }

    pub fn observation(&self, request_id: &str) -> Result<Option<Observation>, WardenError> {
        get(&self.observations, request_id.as_bytes())
    }

    pub fn observation_by_source_tx_id(
        &self,
        source_tx_id: &str,
    ) -> Result<Option<Observation>, WardenError> {
        match self.source_txs.get(source_tx_id.as_bytes()).map_err(storage)? {
            Some(request_id) => get(&self.observations, &request_id),
            None => Ok(None),
        }
    }

    /// Observations at least `confirmation` blocks deep at `height`.
    pub fn confirmed_observations(
        &self,
        confirmation: u64,
        height: Height,
    ) -> Result<Vec<Observation>, WardenError> {
        let mut out = Vec::new();
        for obs in values::<Observation>(&self.observations) {
            let obs = obs?;
            if obs.height.saturating_add(confirmation) <= height {
                out.push(obs);
            }
        }
        Ok(out)
    }

    pub fn observations_by_status(&self, status: TxStatus) -> Result<Vec<Observation>, WardenError> {
        let mut out = Vec::new();
        for st in values::<ObservationStatus>(&self.statuses) {
            let st = st?;
            if st.status != status {
                continue;
            }
            match self.observation(&st.request_id)? {
                Some(obs) => out.push(obs),
                None => return Err(WardenError::ObservationNotFound(st.request_id)),
            }
        }
        Ok(out)
    }

    // ── Observation status ───────────────────────────────────────────────────

    /// Return the status of `observation`, creating a `NotCommitted` one the
    /// first time it is seen.
    pub fn check_new_observation(
        &self,
        observation: &Observation,
        height: Height,
    ) -> Result<ObservationStatus, WardenError> {
        let key = observation.request_id.as_bytes();
        let fresh = ObservationStatus::new(observation.request_id.clone(), height);
        match self
            .statuses
            .compare_and_swap(key, None as Option<&[u8]>, Some(encode(&fresh)?))
            .map_err(storage)?
        {
            Ok(()) => {
                debug!(request_id = %observation.request_id, "status created");
                Ok(fresh)
            }
            Err(cas) => match cas.current {
                Some(bytes) => decode(&bytes),
                None => Err(WardenError::NoObservationStatus(observation.request_id.clone())),
            },
        }
    }

    pub fn status_for(&self, request_id: &str) -> Result<Option<ObservationStatus>, WardenError> {
        get(&self.statuses, request_id.as_bytes())
    }

    /// Atomically apply `transition` to the stored status.
    ///
    /// The read-modify-write retries until no concurrent writer changed the
    /// row between the read and the swap.
    pub fn transition_status(
        &self,
        request_id: &str,
        transition: Transition,
        height: Height,
    ) -> Result<ObservationStatus, WardenError> {
        let key = request_id.as_bytes();
        loop {
            let current = self
                .statuses
                .get(key)
                .map_err(storage)?
                .ok_or_else(|| WardenError::NoObservationStatus(request_id.to_string()))?;
            let mut status: ObservationStatus = decode(&current)?;
            let from = status.status;
            status.status = from.apply(transition)?;
            status.updated_height = height;
            let swapped = self
                .statuses
                .compare_and_swap(key, Some(&current), Some(encode(&status)?))
                .map_err(storage)?;
            if swapped.is_ok() {
                debug!(request_id, ?from, to = ?status.status, "status changed");
                return Ok(status);
            }
        }
    }

    /// One step forward; `redeem` takes the `Committed → RedeemSent` edge.
    pub fn upgrade_status(
        &self,
        request_id: &str,
        redeem: bool,
        height: Height,
    ) -> Result<ObservationStatus, WardenError> {
        let t = if redeem { Transition::RedeemSent } else { Transition::Upgrade };
        self.transition_status(request_id, t, height)
    }

    /// One step back; `redeem` takes the `RedeemSent → Committed` edge.
    pub fn downgrade_status(
        &self,
        request_id: &str,
        redeem: bool,
        height: Height,
    ) -> Result<ObservationStatus, WardenError> {
        let t = if redeem { Transition::RedeemFailed } else { Transition::Downgrade };
        self.transition_status(request_id, t, height)
    }

    pub fn mark_timed_out(&self, request_id: &str, height: Height) -> Result<ObservationStatus, WardenError> {
        self.transition_status(request_id, Transition::Timeout, height)
    }

    pub fn mark_revealed(&self, request_id: &str, height: Height) -> Result<ObservationStatus, WardenError> {
        self.transition_status(request_id, Transition::MergeDetected, height)
    }

    // ── Commitments ──────────────────────────────────────────────────────────

    pub fn insert_commitment(&self, record: &CommitmentRecord) -> Result<(), WardenError> {
        put(&self.commitments, record.box_id.as_bytes(), record)
    }

    pub fn commitment(&self, box_id: &BoxId) -> Result<Option<CommitmentRecord>, WardenError> {
        get(&self.commitments, box_id.as_bytes())
    }

    /// Every commitment for `event_id`, spent or not, in ascending box id order.
    pub fn commitments_by_event_id(&self, event_id: &str) -> Result<Vec<CommitmentRecord>, WardenError> {
        self.filter_commitments(|c| c.event_id == event_id)
    }

    /// Commitments created by `wid`, paged.
    pub fn commitments_by_wid(
        &self,
        wid: &Wid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CommitmentRecord>, WardenError> {
        let all = self.filter_commitments(|c| &c.wid == wid)?;
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    /// Live commitments by `wid` created strictly below `max_height`.
    pub fn commitments_by_wid_and_max_height(
        &self,
        wid: &Wid,
        max_height: Height,
    ) -> Result<Vec<CommitmentRecord>, WardenError> {
        self.filter_commitments(|c| &c.wid == wid && c.is_live() && c.height < max_height)
    }

    /// Commitments spent before `height`; candidates for cleanup.
    pub fn old_spent_commitments(&self, height: Height) -> Result<Vec<CommitmentRecord>, WardenError> {
        self.filter_commitments(|c| matches!(c.spend_height, Some(h) if h < height))
    }

    pub fn delete_commitments(&self, box_ids: &[BoxId]) -> Result<(), WardenError> {
        for id in box_ids {
            self.commitments.remove(id.as_bytes()).map_err(storage)?;
        }
        Ok(())
    }

    fn filter_commitments<F>(&self, keep: F) -> Result<Vec<CommitmentRecord>, WardenError>
    where
        F: Fn(&CommitmentRecord) -> bool,
    {
        let mut out = Vec::new();
        for rec in values::<CommitmentRecord>(&self.commitments) {
            let rec = rec?;
            if keep(&rec) {
                out.push(rec);
            }
        }
        Ok(out)
    }

    /// Record that `box_id` was spent at `height`. Returns whether a
    /// commitment or trigger with that id was known.
    pub fn spend_box(&self, box_id: &BoxId, height: Height) -> Result<bool, WardenError> {
        if let Some(mut c) = self.commitment(box_id)? {
            if c.spend_height.is_none() {
                c.spend_height = Some(height);
                self.insert_commitment(&c)?;
            }
            return Ok(true);
        }
        if let Some(mut t) = get::<TriggerRecord>(&self.triggers, box_id.as_bytes())? {
            if t.spend_height.is_none() {
                t.spend_height = Some(height);
                self.insert_trigger(&t)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    // ── Triggers ─────────────────────────────────────────────────────────────

    pub fn insert_trigger(&self, record: &TriggerRecord) -> Result<(), WardenError> {
        put(&self.triggers, record.box_id.as_bytes(), record)
    }

    pub fn trigger_by_source_tx_id(&self, source_tx_id: &str) -> Result<Option<TriggerRecord>, WardenError> {
        for rec in values::<TriggerRecord>(&self.triggers) {
            let rec = rec?;
            if rec.source_tx_id == source_tx_id {
                return Ok(Some(rec));
            }
        }
        Ok(None)
    }

    /// Triggers whose merged WIDs include `wid`, paged.
    pub fn triggers_by_wid(
        &self,
        wid: &Wid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TriggerRecord>, WardenError> {
        let mut out = Vec::new();
        for rec in values::<TriggerRecord>(&self.triggers) {
            let rec = rec?;
            if rec.wids.contains(wid) {
                out.push(rec);
            }
        }
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    // ── Transaction queue ────────────────────────────────────────────────────

    pub fn insert_tx(&self, record: &TxRecord) -> Result<(), WardenError> {
        put(&self.txs, record.tx_id.as_bytes(), record)
    }

    pub fn tx(&self, tx_id: &TxId) -> Result<Option<TxRecord>, WardenError> {
        get(&self.txs, tx_id.as_bytes())
    }

    /// Queued transactions not yet removed, oldest first.
    pub fn active_txs(&self) -> Result<Vec<TxRecord>, WardenError> {
        let mut out = Vec::new();
        for rec in values::<TxRecord>(&self.txs) {
            let rec = rec?;
            if !rec.deleted {
                out.push(rec);
            }
        }
        out.sort_by_key(|r| r.creation_time);
        Ok(out)
    }

    /// Soft-delete a queued transaction.
    pub fn remove_tx(&self, tx_id: &TxId) -> Result<(), WardenError> {
        if let Some(mut rec) = self.tx(tx_id)? {
            rec.deleted = true;
            self.insert_tx(&rec)?;
        }
        Ok(())
    }

    pub fn set_tx_update_height(&self, tx_id: &TxId, height: Height) -> Result<(), WardenError> {
        if let Some(mut rec) = self.tx(tx_id)? {
            rec.update_height = height;
            self.insert_tx(&rec)?;
        }
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), WardenError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}
