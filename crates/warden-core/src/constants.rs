/// ─── Warden Protocol Constants ──────────────────────────────────────────────
///
/// Values every watcher must agree on, plus the defaults used when a
/// configuration file leaves a tunable unset.

// ── Quorum ───────────────────────────────────────────────────────────────────

/// Fraction of bonded stake that must commit before a trigger is built
/// (numerator / denominator).
pub const QUORUM_NUMERATOR: u64 = 51;
pub const QUORUM_DENOMINATOR: u64 = 100;

// ── Boxes ────────────────────────────────────────────────────────────────────

/// Length of a watcher identifier in bytes.
pub const WID_LENGTH: usize = 32;

/// Smallest value a box may carry (nano units).
pub const MIN_BOX_VALUE: u64 = 1_000_000;

/// Default transaction fee (nano units).
pub const DEFAULT_TX_FEE: u64 = 1_100_000;

// ── Confirmations (blocks) ───────────────────────────────────────────────────

/// Source-chain confirmations before an observation may be committed to.
pub const DEFAULT_OBSERVATION_CONFIRMATION: u64 = 2;

/// Source-chain blocks after which an uncommitted observation times out.
pub const DEFAULT_OBSERVATION_VALID_THRESHOLD: u64 = 720;

/// Target-chain confirmations before a transaction counts as final.
pub const DEFAULT_TRANSACTION_CONFIRMATION: u64 = 3;

/// Target-chain blocks after which a live commitment may be redeemed.
pub const DEFAULT_COMMITMENT_TIMEOUT_CONFIRMATION: u64 = 720;

/// Target-chain blocks a queued transaction may stay unconfirmed before it
/// is abandoned.
pub const DEFAULT_TRANSACTION_TIMEOUT: u64 = 15;

// ── Pagination ───────────────────────────────────────────────────────────────

/// Page size used when fetching boxes from the chain client.
pub const DEFAULT_API_LIMIT: u64 = 20;
pub const MAX_API_LIMIT: u64 = 100;

// ── Scanner ──────────────────────────────────────────────────────────────────

/// Name under which the observation scanner records its progress.
pub const OBSERVATION_SCANNER_NAME: &str = "watcher-observation-scanner";
