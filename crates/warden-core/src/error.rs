use thiserror::Error;

use crate::boxes::RegisterId;
use crate::observation::{Transition, TxStatus};
use crate::types::{TokenAmount, TokenId, Value};

/// Coarse classification of every failure, used by the scheduling loop to
/// decide whether the work item is retried on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or rule-violating commitment; the batch is rejected.
    Validation,
    /// Token overspend or burn; the transaction build is abandoned.
    Conservation,
    /// Data-consistency problem; the triggering operation is aborted.
    State,
    /// Not enough funding boxes yet; retried once more boxes appear.
    Resource,
    /// Scanner, chain, signer or storage failure; propagated unchanged.
    External,
}

#[derive(Debug, Error)]
pub enum WardenError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("commitment box is not owned by the commitment address")]
    WrongAddress,

    #[error("commitment box must hold RWT as its first token")]
    MissingStakeToken,

    #[error("insufficient stake: need {need} RWT, got {got}")]
    InsufficientStake { need: TokenAmount, got: TokenAmount },

    #[error("commitment has no WID in R4")]
    MissingWid,

    #[error("commitment has no event digest in R6")]
    MissingDigest,

    #[error("commitment digest does not match the observation for WID {0}")]
    DigestMismatch(String),

    #[error("WID {0} is already included in the commitments")]
    DuplicateWid(String),

    #[error("register {0} is missing")]
    MissingRegister(RegisterId),

    #[error("register {0} has an unexpected type or length")]
    MalformedRegister(RegisterId),

    // ── Conservation errors ──────────────────────────────────────────────────
    #[error("outputs spend {spent} of token {token} but inputs only hold {held}")]
    TokenOverspend {
        token: TokenId,
        spent: TokenAmount,
        held: TokenAmount,
    },

    #[error("{amount} of token {token} would be burned: no value left to carry it")]
    TokenBurn { token: TokenId, amount: TokenAmount },

    #[error("outputs and fee need {need} but inputs only hold {have}")]
    ValueOverspend { need: Value, have: Value },

    #[error("total of token {0} does not fit in 64 bits")]
    TokenOverflow(TokenId),

    #[error("total value does not fit in 64 bits")]
    ValueOverflow,

    // ── State errors ─────────────────────────────────────────────────────────
    #[error("observation with request id {0} has no status")]
    NoObservationStatus(String),

    #[error("observation with request id {0} not found")]
    ObservationNotFound(String),

    #[error("transition {transition:?} is not allowed from {from:?}")]
    InvalidTransition { from: TxStatus, transition: Transition },

    #[error("no commitments have been added to the trigger builder")]
    NoCommitments,

    #[error("quorum not reached: need {need} commitments, have {have}")]
    QuorumNotReached { need: u64, have: u64 },

    #[error("trigger builder has already built its transaction")]
    BuilderFrozen,

    #[error("invalid quorum parameters: {0}")]
    InvalidQuorumParams(String),

    #[error("no block recorded for scanner {0}")]
    NoScannedBlock(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Resource errors ──────────────────────────────────────────────────────
    #[error("insufficient funds: need {need} value, found {found}")]
    InsufficientFunds { need: Value, found: Value },

    #[error("insufficient tokens: need {need} of {token}, found {found}")]
    InsufficientTokens {
        token: TokenId,
        need: TokenAmount,
        found: TokenAmount,
    },

    #[error("repo box holding token {0} not found")]
    RepoBoxNotFound(TokenId),

    // ── External errors ──────────────────────────────────────────────────────
    #[error("network error: {0}")]
    Network(String),

    #[error("transaction rejected: {0}")]
    TxRejected(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl WardenError {
    pub fn kind(&self) -> ErrorKind {
        use WardenError::*;
        match self {
            WrongAddress
            | MissingStakeToken
            | InsufficientStake { .. }
            | MissingWid
            | MissingDigest
            | DigestMismatch(_)
            | DuplicateWid(_)
            | MissingRegister(_)
            | MalformedRegister(_) => ErrorKind::Validation,

            TokenOverspend { .. }
            | TokenBurn { .. }
            | ValueOverspend { .. }
            | TokenOverflow(_)
            | ValueOverflow => {
                ErrorKind::Conservation
            }

            NoObservationStatus(_)
            | ObservationNotFound(_)
            | InvalidTransition { .. }
            | NoCommitments
            | QuorumNotReached { .. }
            | BuilderFrozen
            | InvalidQuorumParams(_)
            | NoScannedBlock(_)
            | Config(_) => ErrorKind::State,

            InsufficientFunds { .. } | InsufficientTokens { .. } | RepoBoxNotFound(_) => {
                ErrorKind::Resource
            }

            Network(_) | TxRejected(_) | SigningFailed(_) | Serialization(_) | Storage(_) => {
                ErrorKind::External
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(WardenError::MissingWid.kind(), ErrorKind::Validation);
        assert_eq!(
            WardenError::TokenBurn { token: TokenId([0; 32]), amount: 1 }.kind(),
            ErrorKind::Conservation
        );
        assert_eq!(WardenError::ValueOverflow.kind(), ErrorKind::Conservation);
        assert_eq!(WardenError::NoCommitments.kind(), ErrorKind::State);
        assert_eq!(
            WardenError::InsufficientFunds { need: 2, found: 1 }.kind(),
            ErrorKind::Resource
        );
        assert_eq!(WardenError::Storage("io".into()).kind(), ErrorKind::External);
    }
}
