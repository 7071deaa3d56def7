use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMMITMENT_TIMEOUT_CONFIRMATION, DEFAULT_OBSERVATION_CONFIRMATION,
    DEFAULT_OBSERVATION_VALID_THRESHOLD, DEFAULT_TRANSACTION_CONFIRMATION,
    DEFAULT_TRANSACTION_TIMEOUT, DEFAULT_TX_FEE, MIN_BOX_VALUE, OBSERVATION_SCANNER_NAME,
};
use crate::error::WardenError;
use crate::types::{Address, TokenId, Value};

// ── Serde default helpers ──────────────────────────────────────────────────────

fn default_tx_fee() -> Value { DEFAULT_TX_FEE }
fn default_min_box_value() -> Value { MIN_BOX_VALUE }
fn default_observation_confirmation() -> u64 { DEFAULT_OBSERVATION_CONFIRMATION }
fn default_observation_valid_threshold() -> u64 { DEFAULT_OBSERVATION_VALID_THRESHOLD }
fn default_transaction_confirmation() -> u64 { DEFAULT_TRANSACTION_CONFIRMATION }
fn default_commitment_timeout() -> u64 { DEFAULT_COMMITMENT_TIMEOUT_CONFIRMATION }
fn default_transaction_timeout() -> u64 { DEFAULT_TRANSACTION_TIMEOUT }
fn default_scanner_name() -> String { OBSERVATION_SCANNER_NAME.to_string() }

/// Protocol parameters for one watcher. Constructed once at startup and
/// passed to every component that needs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherParams {
    /// Script every commitment box must be locked by.
    pub commitment_address: Address,
    /// Script trigger boxes are locked by.
    pub trigger_address: Address,
    /// Script of permit boxes; its hash is stamped into triggers.
    pub permit_address: Address,
    /// This watcher's own address; receives change.
    pub watcher_address: Address,
    /// Repo-wide token used as commitment stake.
    pub rwt_id: TokenId,
    /// Singleton token identifying the repo box.
    pub repo_nft: TokenId,

    #[serde(default = "default_tx_fee")]
    pub tx_fee: Value,
    #[serde(default = "default_min_box_value")]
    pub min_box_value: Value,

    #[serde(default = "default_observation_confirmation")]
    pub observation_confirmation: u64,
    #[serde(default = "default_observation_valid_threshold")]
    pub observation_valid_threshold: u64,
    #[serde(default = "default_transaction_confirmation")]
    pub transaction_confirmation: u64,
    #[serde(default = "default_commitment_timeout")]
    pub commitment_timeout_confirmation: u64,
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout: u64,
    #[serde(default = "default_scanner_name")]
    pub scanner_name: String,
}

impl WatcherParams {
    /// Reject parameter sets no watcher could operate with.
    pub fn validate(&self) -> Result<(), WardenError> {
        let addresses = [
            ("commitment_address", &self.commitment_address),
            ("trigger_address", &self.trigger_address),
            ("permit_address", &self.permit_address),
            ("watcher_address", &self.watcher_address),
        ];
        for (name, addr) in addresses {
            if addr.as_str().is_empty() {
                return Err(WardenError::Config(format!("{name} is not set")));
            }
        }
        if self.rwt_id == self.repo_nft {
            return Err(WardenError::Config("rwt_id and repo_nft must differ".into()));
        }
        if self.tx_fee == 0 {
            return Err(WardenError::Config("tx_fee must be positive".into()));
        }
        if self.min_box_value == 0 {
            return Err(WardenError::Config("min_box_value must be positive".into()));
        }
        if self.scanner_name.is_empty() {
            return Err(WardenError::Config("scanner_name is not set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_json() -> serde_json::Value {
        serde_json::json!({
            "commitment_address": "commitment",
            "trigger_address": "trigger",
            "permit_address": "permit",
            "watcher_address": "watcher",
            "rwt_id": "11".repeat(32),
            "repo_nft": "22".repeat(32),
        })
    }

    #[test]
    fn defaults_fill_tunables() {
        let p: WatcherParams = serde_json::from_value(params_json()).unwrap();
        assert_eq!(p.tx_fee, DEFAULT_TX_FEE);
        assert_eq!(p.observation_valid_threshold, DEFAULT_OBSERVATION_VALID_THRESHOLD);
        assert_eq!(p.scanner_name, OBSERVATION_SCANNER_NAME);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn empty_address_is_rejected() {
        let mut json = params_json();
        json["trigger_address"] = serde_json::json!("");
        let p: WatcherParams = serde_json::from_value(json).unwrap();
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("trigger_address"));
    }
}
