use tracing::debug;
use warden_core::boxes::{token_sum, value_sum, BoxCandidate, RegisterId, RegisterValue, Token, TokenBag, UtxoBox};
use warden_core::config::WatcherParams;
use warden_core::error::WardenError;
use warden_core::observation::Observation;
use warden_core::transaction::UnsignedTransaction;
use warden_core::types::{Address, Digest, Height, TokenAmount, Value, Wid};
use warden_crypto::commitment_digest;

use crate::change::compute_change_box;
use crate::selection::{select_from_source, select_inputs, BoxSource, Excluding};

// ── Codec ────────────────────────────────────────────────────────────────────

/// Build a commitment box: `stake` RWT as the first token, the WID in R4,
/// the request id in R5 and the digest in R6.
pub fn encode_commitment_box(
    address: &Address,
    stake: &Token,
    wid: &Wid,
    request_id: &str,
    digest: &Digest,
    value: Value,
    height: Height,
) -> BoxCandidate {
    let mut c = BoxCandidate::new(value, address.clone(), height);
    c.tokens = TokenBag::new().with(stake.id, stake.amount);
    c.registers.set(RegisterId::R4, RegisterValue::Bytes(wid.as_bytes().to_vec()));
    c.registers.set(RegisterId::R5, RegisterValue::Bytes(request_id.as_bytes().to_vec()));
    c.registers.set(RegisterId::R6, RegisterValue::Bytes(digest.as_bytes().to_vec()));
    c
}

/// Read the WID and digest of a commitment box.
pub fn decode_commitment(b: &UtxoBox) -> Result<(Wid, Digest), WardenError> {
    let wid = Wid::from_slice(b.registers.bytes(RegisterId::R4)?)
        .ok_or(WardenError::MalformedRegister(RegisterId::R4))?;
    let digest = Digest::from_slice(b.registers.bytes(RegisterId::R6)?)
        .ok_or(WardenError::MalformedRegister(RegisterId::R6))?;
    Ok((wid, digest))
}

/// Read the request id a commitment box refers to.
pub fn decode_event_id(b: &UtxoBox) -> Result<String, WardenError> {
    String::from_utf8(b.registers.bytes(RegisterId::R5)?.to_vec())
        .map_err(|_| WardenError::MalformedRegister(RegisterId::R5))
}

fn permit_box(params: &WatcherParams, wid: &Wid, amount: TokenAmount, height: Height) -> BoxCandidate {
    let mut c = BoxCandidate::new(params.min_box_value, params.permit_address.clone(), height);
    c.tokens = TokenBag::new().with(params.rwt_id, amount);
    c.registers.set(RegisterId::R4, RegisterValue::Bytes(wid.as_bytes().to_vec()));
    c
}

// ── Builders ─────────────────────────────────────────────────────────────────

/// Builds this watcher's commitment and commitment-redeem transactions.
pub struct CommitmentTxBuilder<'a> {
    params: &'a WatcherParams,
    height: Height,
}

impl<'a> CommitmentTxBuilder<'a> {
    pub fn new(params: &'a WatcherParams, height: Height) -> Self {
        Self { params, height }
    }

    /// Commit to `observation`: moves `stake` RWT out of this watcher's
    /// permit boxes into a new commitment box.
    ///
    /// Outputs are `[residual permit?, commitment, change?]`.
    pub async fn build(
        &self,
        observation: &Observation,
        wid: &Wid,
        stake: TokenAmount,
        permits: &[UtxoBox],
        funding: &mut dyn BoxSource,
    ) -> Result<UnsignedTransaction, WardenError> {
        let p = self.params;
        let need = TokenBag::new().with(p.rwt_id, stake);
        let permit_inputs = select_inputs(permits, 0, &need)?;
        let held = token_sum(&permit_inputs, &p.rwt_id)?;

        let mut outputs = Vec::new();
        if held > stake {
            outputs.push(permit_box(p, wid, held - stake, self.height));
        }
        let digest = commitment_digest(observation, wid);
        outputs.push(encode_commitment_box(
            &p.commitment_address,
            &Token::new(p.rwt_id, stake),
            wid,
            &observation.request_id,
            &digest,
            p.min_box_value,
            self.height,
        ));

        let inputs = self.fund(permit_inputs, &outputs, funding).await?;
        debug!(
            request_id = %observation.request_id,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "commitment tx assembled"
        );
        self.finish(inputs, outputs)
    }

    /// Return the RWT locked in an expired `commitment` to a permit box.
    pub async fn build_redeem(
        &self,
        commitment: &UtxoBox,
        wid: &Wid,
        funding: &mut dyn BoxSource,
    ) -> Result<UnsignedTransaction, WardenError> {
        let amount = commitment.tokens.amount_of(&self.params.rwt_id);
        if amount == 0 {
            return Err(WardenError::MissingStakeToken);
        }
        let outputs = vec![permit_box(self.params, wid, amount, self.height)];
        let inputs = self.fund(vec![commitment.clone()], &outputs, funding).await?;
        debug!(box_id = %commitment.box_id, "redeem tx assembled");
        self.finish(inputs, outputs)
    }

    /// Top up `inputs` from `funding` so they cover the outputs, the fee and
    /// a change box of at least the minimum value.
    async fn fund(
        &self,
        mut inputs: Vec<UtxoBox>,
        outputs: &[BoxCandidate],
        funding: &mut dyn BoxSource,
    ) -> Result<Vec<UtxoBox>, WardenError> {
        let p = self.params;
        let need = value_sum(outputs)?
            .checked_add(p.tx_fee + p.min_box_value)
            .ok_or(WardenError::ValueOverflow)?;
        let have = value_sum(&inputs)?;
        if have < need {
            let used = inputs.iter().map(|b| b.box_id).collect();
            let mut source = Excluding::new(funding, used);
            inputs.extend(select_from_source(&mut source, need - have, &TokenBag::new()).await?);
        }
        Ok(inputs)
    }

    fn finish(
        &self,
        inputs: Vec<UtxoBox>,
        mut outputs: Vec<BoxCandidate>,
    ) -> Result<UnsignedTransaction, WardenError> {
        let p = self.params;
        if let Some(change) = compute_change_box(&inputs, &outputs, p.tx_fee, self.height, &p.watcher_address)? {
            outputs.push(change);
        }
        Ok(UnsignedTransaction { inputs, data_inputs: Vec::new(), outputs, fee: p.tx_fee })
    }
}
