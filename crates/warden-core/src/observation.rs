use serde::{Deserialize, Serialize};

use crate::error::WardenError;
use crate::types::Height;

// ── Observation ──────────────────────────────────────────────────────────────

/// A confirmed transfer event on the source chain. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub from_chain: String,
    pub to_chain: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: u64,
    pub fee: u64,
    pub source_chain_token_id: String,
    pub target_chain_token_id: String,
    pub source_tx_id: String,
    pub source_block_id: String,
    /// Globally unique event id, derived from `source_tx_id`.
    pub request_id: String,
    /// Source-chain height at which the event was observed.
    pub height: Height,
}

// ── TxStatus ─────────────────────────────────────────────────────────────────

/// Progress of this watcher on one observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    NotCommitted,
    Committed,
    Revealed,
    TimedOut,
    RedeemSent,
}

/// Every way a status may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// One step forward after submitting a commitment or trigger tx.
    Upgrade,
    /// One step back after such a transaction failed.
    Downgrade,
    /// A commitment redeem transaction was submitted.
    RedeemSent,
    /// The redeem transaction failed.
    RedeemFailed,
    /// The observation outlived its validity window.
    Timeout,
    /// A trigger for the observation was seen on chain.
    MergeDetected,
}

impl TxStatus {
    /// The transition table. Returns `None` for every illegal transition;
    /// `TimedOut` and `Revealed` only change through the dedicated paths.
    pub fn next(self, transition: Transition) -> Option<TxStatus> {
        use Transition as T;
        use TxStatus as S;
        match (self, transition) {
            (S::NotCommitted, T::Upgrade) => Some(S::Committed),
            (S::Committed, T::Upgrade) => Some(S::Revealed),
            (S::Committed, T::Downgrade) => Some(S::NotCommitted),
            (S::Committed, T::RedeemSent) => Some(S::RedeemSent),
            (S::RedeemSent, T::RedeemFailed) => Some(S::Committed),
            (S::NotCommitted | S::Committed, T::Timeout) => Some(S::TimedOut),
            (S::NotCommitted | S::Committed | S::Revealed, T::MergeDetected) => {
                Some(S::Revealed)
            }
            (S::NotCommitted, T::Downgrade | T::RedeemSent | T::RedeemFailed) => None,
            (S::Committed, T::RedeemFailed) => None,
            (S::Revealed | S::TimedOut | S::RedeemSent, _) => None,
        }
    }

    /// Like [`next`](Self::next) but reports the rejected transition.
    pub fn apply(self, transition: Transition) -> Result<TxStatus, WardenError> {
        self.next(transition)
            .ok_or(WardenError::InvalidTransition { from: self, transition })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::TimedOut | TxStatus::RedeemSent)
    }
}

/// Mutable progress record, one per observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationStatus {
    pub request_id: String,
    pub status: TxStatus,
    pub updated_height: Height,
}

impl ObservationStatus {
    pub fn new(request_id: impl Into<String>, height: Height) -> Self {
        Self {
            request_id: request_id.into(),
            status: TxStatus::NotCommitted,
            updated_height: height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain() {
        let s = TxStatus::NotCommitted;
        let s = s.apply(Transition::Upgrade).unwrap();
        assert_eq!(s, TxStatus::Committed);
        let s = s.apply(Transition::Upgrade).unwrap();
        assert_eq!(s, TxStatus::Revealed);
    }

    #[test]
    fn revealed_and_timed_out_are_protected() {
        for t in [Transition::Upgrade, Transition::Downgrade, Transition::Timeout] {
            assert!(TxStatus::Revealed.next(t).is_none());
            assert!(TxStatus::TimedOut.next(t).is_none());
        }
        assert!(TxStatus::TimedOut.next(Transition::MergeDetected).is_none());
    }

    #[test]
    fn redeem_bypasses_revealed() {
        let s = TxStatus::Committed.apply(Transition::RedeemSent).unwrap();
        assert_eq!(s, TxStatus::RedeemSent);
        assert_eq!(s.apply(Transition::RedeemFailed).unwrap(), TxStatus::Committed);
        assert!(matches!(
            TxStatus::NotCommitted.apply(Transition::RedeemSent),
            Err(WardenError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn downgrade_from_not_committed_is_rejected() {
        assert!(TxStatus::NotCommitted.next(Transition::Downgrade).is_none());
        assert_eq!(
            TxStatus::Committed.next(Transition::Downgrade),
            Some(TxStatus::NotCommitted)
        );
    }

    #[test]
    fn timeout_from_committed_is_the_race_path() {
        assert_eq!(TxStatus::Committed.next(Transition::Timeout), Some(TxStatus::TimedOut));
        assert!(TxStatus::TimedOut.is_terminal());
    }
}
