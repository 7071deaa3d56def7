pub mod jobs;
pub mod network;
pub mod sync;
pub mod tracker;
pub mod tx_queue;

#[cfg(test)]
mod mock;

pub use jobs::Watcher;
pub use network::{all_unspent, ChainBoxSource, ChainClient, ScanBatch, ScannerFeed, TriggerEvent};
pub use sync::ScanSync;
pub use tracker::{ChainTips, CommitmentSet, ObservationTracker};
pub use tx_queue::TxQueue;
