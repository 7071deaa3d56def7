use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::boxes::{RegisterId, UtxoBox};
use warden_core::config::WatcherParams;
use warden_core::error::WardenError;
use warden_core::records::{CommitmentRecord, TriggerRecord};
use warden_core::types::Wid;
use warden_state::WatcherDb;
use warden_tx::{decode_commitment, decode_event_id};

use crate::network::{ScanBatch, ScannerFeed, TriggerEvent};

fn commitment_record(b: &UtxoBox) -> Result<CommitmentRecord, WardenError> {
    let (wid, digest) = decode_commitment(b)?;
    Ok(CommitmentRecord {
        box_id: b.box_id,
        event_id: decode_event_id(b)?,
        wid,
        digest,
        height: b.creation_height,
        spend_height: None,
        boxed: b.clone(),
    })
}

fn trigger_record(event: &TriggerEvent) -> Result<TriggerRecord, WardenError> {
    let b = &event.boxed;
    let wids = b
        .registers
        .bytes_coll(RegisterId::R4)?
        .iter()
        .map(|w| Wid::from_slice(w).ok_or(WardenError::MalformedRegister(RegisterId::R4)))
        .collect::<Result<Vec<_>, _>>()?;
    let event_id = String::from_utf8(b.registers.bytes(RegisterId::R7)?.to_vec())
        .map_err(|_| WardenError::MalformedRegister(RegisterId::R7))?;
    Ok(TriggerRecord {
        box_id: b.box_id,
        event_id,
        source_tx_id: event.source_tx_id.clone(),
        wids,
        height: b.creation_height,
        spend_height: None,
        boxed: b.clone(),
    })
}

/// Persists what the scanner reports and advances its height.
pub struct ScanSync {
    db: Arc<WatcherDb>,
    feed: Arc<dyn ScannerFeed>,
    params: WatcherParams,
}

impl ScanSync {
    pub fn new(db: Arc<WatcherDb>, feed: Arc<dyn ScannerFeed>, params: WatcherParams) -> Self {
        Self { db, feed, params }
    }

    /// Fetch and store the next batch. Returns the number of new
    /// observations, or `None` if the feed had nothing new.
    pub async fn sync(&self) -> Result<Option<usize>, WardenError> {
        let from = match self.db.last_block_height(&self.params.scanner_name) {
            Ok(h) => h + 1,
            Err(WardenError::NoScannedBlock(_)) => 0,
            Err(e) => return Err(e),
        };
        let Some(batch) = self.feed.fetch(from).await? else {
            debug!(from, "scanner has nothing new");
            return Ok(None);
        };
        let fresh = self.store(&batch)?;
        self.db.put_last_block_height(&self.params.scanner_name, batch.height)?;
        info!(height = batch.height, observations = fresh, "scan synced");
        Ok(Some(fresh))
    }

    fn store(&self, batch: &ScanBatch) -> Result<usize, WardenError> {
        let mut fresh = 0;
        for obs in &batch.observations {
            if self.db.insert_observation(obs)? {
                self.db.check_new_observation(obs, batch.height)?;
                fresh += 1;
            }
        }
        for b in &batch.commitments {
            match commitment_record(b) {
                Ok(rec) => {
                    if self.db.commitment(&rec.box_id)?.is_none() {
                        self.db.insert_commitment(&rec)?;
                    }
                }
                Err(e) => warn!(box_id = %b.box_id, error = %e, "skipping malformed commitment"),
            }
        }
        for event in &batch.triggers {
            match trigger_record(event) {
                Ok(rec) => {
                    let known = self.db.observation_by_source_tx_id(&rec.source_tx_id)?;
                    if known.is_some_and(|o| o.request_id != rec.event_id) {
                        warn!(
                            box_id = %rec.box_id,
                            source_tx_id = %rec.source_tx_id,
                            event_id = %rec.event_id,
                            "trigger event id does not match its observation"
                        );
                        continue;
                    }
                    if self.db.trigger_by_source_tx_id(&rec.source_tx_id)?.is_none() {
                        self.db.insert_trigger(&rec)?;
                    }
                }
                Err(e) => warn!(box_id = %event.boxed.box_id, error = %e, "skipping malformed trigger"),
            }
        }
        for (box_id, height) in &batch.spent {
            self.db.spend_box(box_id, *height)?;
        }
        Ok(fresh)
    }
}
