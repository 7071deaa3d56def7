use warden_core::boxes::{RegisterId, RegisterValue, Registers, UtxoBox};
use warden_core::error::WardenError;
use warden_core::types::{TokenAmount, Wid};

/// Minimum number of distinct commitments needed to finalize an event:
/// `ceil(total / stake * numerator / denominator)`, at least 1.
///
/// Evaluated as a single rational in `u128` so every watcher derives the
/// same threshold.
pub fn required_commitment_count(
    total_rwt: TokenAmount,
    commitment_stake: TokenAmount,
    numerator: u64,
    denominator: u64,
) -> Result<u64, WardenError> {
    if commitment_stake == 0 {
        return Err(WardenError::InvalidQuorumParams("commitment stake is zero".into()));
    }
    if denominator == 0 {
        return Err(WardenError::InvalidQuorumParams("quorum denominator is zero".into()));
    }
    let num = total_rwt as u128 * numerator as u128;
    let den = commitment_stake as u128 * denominator as u128;
    let count = num.div_ceil(den).max(1);
    u64::try_from(count)
        .map_err(|_| WardenError::InvalidQuorumParams(format!("quorum {count} overflows u64")))
}

// ── Repo box ─────────────────────────────────────────────────────────────────

/// Decoded view of the repo box.
///
/// R4 lists the bonded WIDs, R5 the RWT bonded by each, and R6 holds
/// `[commitment_stake, quorum_numerator, quorum_denominator]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RwtRepo {
    pub wids: Vec<Wid>,
    pub bonded: Vec<TokenAmount>,
    pub commitment_stake: TokenAmount,
    pub quorum_numerator: u64,
    pub quorum_denominator: u64,
    pub boxed: UtxoBox,
}

fn non_negative(values: &[i64], reg: RegisterId) -> Result<Vec<u64>, WardenError> {
    values
        .iter()
        .map(|v| u64::try_from(*v).map_err(|_| WardenError::MalformedRegister(reg)))
        .collect()
}

impl RwtRepo {
    pub fn from_box(boxed: &UtxoBox) -> Result<Self, WardenError> {
        let regs = &boxed.registers;
        let wids = regs
            .bytes_coll(RegisterId::R4)?
            .iter()
            .map(|w| Wid::from_slice(w).ok_or(WardenError::MalformedRegister(RegisterId::R4)))
            .collect::<Result<Vec<_>, _>>()?;
        let bonded = non_negative(regs.long_coll(RegisterId::R5)?, RegisterId::R5)?;
        if bonded.len() != wids.len() {
            return Err(WardenError::MalformedRegister(RegisterId::R5));
        }
        let settings = non_negative(regs.long_coll(RegisterId::R6)?, RegisterId::R6)?;
        let &[stake, num, den] = settings.as_slice() else {
            return Err(WardenError::MalformedRegister(RegisterId::R6));
        };
        Ok(Self {
            wids,
            bonded,
            commitment_stake: stake,
            quorum_numerator: num,
            quorum_denominator: den,
            boxed: boxed.clone(),
        })
    }

    /// Total RWT bonded across every watcher.
    pub fn total_bonded(&self) -> Result<TokenAmount, WardenError> {
        self.bonded
            .iter()
            .try_fold(0u64, |acc, b| acc.checked_add(*b))
            .ok_or_else(|| WardenError::InvalidQuorumParams("bonded RWT does not fit in 64 bits".into()))
    }

    pub fn bonded_of(&self, wid: &Wid) -> TokenAmount {
        self.wids
            .iter()
            .position(|w| w == wid)
            .map(|i| self.bonded[i])
            .unwrap_or(0)
    }

    pub fn required_commitments(&self) -> Result<u64, WardenError> {
        required_commitment_count(
            self.total_bonded()?,
            self.commitment_stake,
            self.quorum_numerator,
            self.quorum_denominator,
        )
    }

    /// Registers of a repo box holding this bonding table.
    pub fn registers(
        entries: &[(Wid, TokenAmount)],
        commitment_stake: TokenAmount,
        quorum_numerator: u64,
        quorum_denominator: u64,
    ) -> Registers {
        Registers::new()
            .with(
                RegisterId::R4,
                RegisterValue::BytesColl(entries.iter().map(|(w, _)| w.as_bytes().to_vec()).collect()),
            )
            .with(
                RegisterId::R5,
                RegisterValue::LongColl(entries.iter().map(|(_, a)| *a as i64).collect()),
            )
            .with(
                RegisterId::R6,
                RegisterValue::LongColl(vec![
                    commitment_stake as i64,
                    quorum_numerator as i64,
                    quorum_denominator as i64,
                ]),
            )
    }
}
