use std::collections::HashSet;
use tracing::{debug, info};
use warden_core::boxes::{token_sum, value_sum, Assets, BoxCandidate, RegisterId, RegisterValue, TokenBag, UtxoBox};
use warden_core::config::WatcherParams;
use warden_core::error::WardenError;
use warden_core::observation::Observation;
use warden_core::transaction::UnsignedTransaction;
use warden_core::types::{Digest, Height, TokenAmount, Value, Wid};
use warden_crypto::commitment_digest;

use crate::change::compute_change_box;
use crate::quorum::RwtRepo;
use crate::selection::{select_from_source, BoxSource, Excluding};

/// Progress of one trigger build attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderState {
    /// No commitment accepted yet.
    Empty,
    /// Some commitments accepted, fewer than the quorum.
    Accumulating,
    /// Quorum reached; `build` may run.
    Ready,
    /// Transaction built; the builder no longer changes.
    Built,
}

/// Validates peer commitments for one observation and merges them into a
/// single trigger box once the quorum is reached.
///
/// Commitments are kept in the order they were supplied, which becomes the
/// order of the trigger's WID and digest registers.
pub struct TriggerTxBuilder {
    params: WatcherParams,
    observation: Observation,
    repo: RwtRepo,
    required: u64,
    height: Height,
    commitments: Vec<UtxoBox>,
    wids: Vec<Wid>,
    digests: Vec<Digest>,
    built: bool,
}

impl TriggerTxBuilder {
    pub fn new(
        params: WatcherParams,
        observation: Observation,
        repo: RwtRepo,
        height: Height,
    ) -> Result<Self, WardenError> {
        let required = repo.required_commitments()?;
        Ok(Self {
            params,
            observation,
            repo,
            required,
            height,
            commitments: Vec::new(),
            wids: Vec::new(),
            digests: Vec::new(),
            built: false,
        })
    }

    pub fn state(&self) -> BuilderState {
        if self.built {
            BuilderState::Built
        } else if self.commitments.is_empty() {
            BuilderState::Empty
        } else if (self.commitments.len() as u64) < self.required {
            BuilderState::Accumulating
        } else {
            BuilderState::Ready
        }
    }

    /// Number of commitments needed before `build` may run.
    pub fn required_commitments(&self) -> u64 {
        self.required
    }

    pub fn wids(&self) -> &[Wid] {
        &self.wids
    }

    pub fn set_creation_height(&mut self, height: Height) -> Result<(), WardenError> {
        if self.built {
            return Err(WardenError::BuilderFrozen);
        }
        self.height = height;
        Ok(())
    }

    /// Validate and accept a batch of commitment boxes.
    ///
    /// All or nothing: the first invalid box rejects the whole batch and the
    /// accumulated set is left as it was.
    pub fn add_commitments(&mut self, batch: &[UtxoBox]) -> Result<BuilderState, WardenError> {
        if self.built {
            return Err(WardenError::BuilderFrozen);
        }
        let mut seen: HashSet<Wid> = self.wids.iter().copied().collect();
        let mut accepted = Vec::with_capacity(batch.len());
        for b in batch {
            let (wid, digest) = self.validate(b, &seen)?;
            seen.insert(wid);
            accepted.push((b.clone(), wid, digest));
        }
        let merged: Vec<UtxoBox> =
            self.commitments.iter().cloned().chain(accepted.iter().map(|(b, _, _)| b.clone())).collect();
        token_sum(&merged, &self.params.rwt_id)?;
        value_sum(&merged)?;
        for (b, wid, digest) in accepted {
            self.commitments.push(b);
            self.wids.push(wid);
            self.digests.push(digest);
        }
        let state = self.state();
        debug!(
            request_id = %self.observation.request_id,
            have = self.commitments.len(),
            need = self.required,
            ?state,
            "commitments accepted"
        );
        Ok(state)
    }

    /// Protocol checks for one commitment, in order.
    fn validate(&self, b: &UtxoBox, seen: &HashSet<Wid>) -> Result<(Wid, Digest), WardenError> {
        if b.address != self.params.commitment_address {
            return Err(WardenError::WrongAddress);
        }
        let stake = match b.tokens().first() {
            Some(t) if t.id == self.params.rwt_id => t.amount,
            _ => return Err(WardenError::MissingStakeToken),
        };
        if stake < self.repo.commitment_stake {
            return Err(WardenError::InsufficientStake { need: self.repo.commitment_stake, got: stake });
        }
        let wid = match b.registers.get(RegisterId::R4) {
            None => return Err(WardenError::MissingWid),
            Some(RegisterValue::Bytes(w)) => {
                Wid::from_slice(w).ok_or(WardenError::MalformedRegister(RegisterId::R4))?
            }
            Some(_) => return Err(WardenError::MalformedRegister(RegisterId::R4)),
        };
        let digest = match b.registers.get(RegisterId::R6) {
            None => return Err(WardenError::MissingDigest),
            Some(RegisterValue::Bytes(d)) => {
                Digest::from_slice(d).ok_or(WardenError::MalformedRegister(RegisterId::R6))?
            }
            Some(_) => return Err(WardenError::MalformedRegister(RegisterId::R6)),
        };
        if digest != commitment_digest(&self.observation, &wid) {
            return Err(WardenError::DigestMismatch(wid.to_hex()));
        }
        if seen.contains(&wid) {
            return Err(WardenError::DuplicateWid(wid.to_hex()));
        }
        Ok((wid, digest))
    }

    /// RWT held by the accumulated commitments.
    pub fn total_stake(&self) -> Result<TokenAmount, WardenError> {
        token_sum(&self.commitments, &self.params.rwt_id)
    }

    /// Value held by the accumulated commitments.
    pub fn total_value(&self) -> Result<Value, WardenError> {
        value_sum(&self.commitments)
    }

    /// The trigger box for the current accumulation. Identical inputs give
    /// a byte-identical box.
    pub fn create_trigger_box(&self, total_stake: TokenAmount, total_value: Value) -> BoxCandidate {
        let p = &self.params;
        let mut c = BoxCandidate::new(total_value, p.trigger_address.clone(), self.height);
        c.tokens = TokenBag::new().with(p.rwt_id, total_stake);
        c.registers.set(
            RegisterId::R4,
            RegisterValue::BytesColl(self.wids.iter().map(|w| w.as_bytes().to_vec()).collect()),
        );
        c.registers.set(
            RegisterId::R5,
            RegisterValue::BytesColl(self.digests.iter().map(|d| d.as_bytes().to_vec()).collect()),
        );
        c.registers.set(
            RegisterId::R6,
            RegisterValue::Bytes(p.permit_address.script_hash().as_bytes().to_vec()),
        );
        c.registers.set(
            RegisterId::R7,
            RegisterValue::Bytes(self.observation.request_id.as_bytes().to_vec()),
        );
        c
    }

    /// Assemble the merge transaction. The commitments' value moves into the
    /// trigger, so `funding` only has to pay the fee and the change box.
    pub async fn build(&mut self, funding: &mut dyn BoxSource) -> Result<UnsignedTransaction, WardenError> {
        match self.state() {
            BuilderState::Empty => return Err(WardenError::NoCommitments),
            BuilderState::Accumulating => {
                return Err(WardenError::QuorumNotReached {
                    need: self.required,
                    have: self.commitments.len() as u64,
                })
            }
            BuilderState::Built => return Err(WardenError::BuilderFrozen),
            BuilderState::Ready => {}
        }
        let p = &self.params;
        let trigger = self.create_trigger_box(self.total_stake()?, self.total_value()?);

        let used = self.commitments.iter().map(|b| b.box_id).collect();
        let mut source = Excluding::new(funding, used);
        let extra = select_from_source(&mut source, p.tx_fee + p.min_box_value, &TokenBag::new()).await?;

        let mut inputs = self.commitments.clone();
        inputs.extend(extra);
        let mut outputs = vec![trigger];
        if let Some(change) = compute_change_box(&inputs, &outputs, p.tx_fee, self.height, &p.watcher_address)? {
            outputs.push(change);
        }
        let tx = UnsignedTransaction {
            inputs,
            data_inputs: vec![self.repo.boxed.clone()],
            outputs,
            fee: p.tx_fee,
        };
        self.built = true;
        info!(
            request_id = %self.observation.request_id,
            commitments = self.commitments.len(),
            tx_id = %tx.tx_id(),
            "trigger tx built"
        );
        Ok(tx)
    }
}
