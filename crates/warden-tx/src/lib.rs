pub mod change;
pub mod commitment;
pub mod quorum;
pub mod selection;
pub mod trigger;

pub use change::compute_change_box;
pub use commitment::{decode_commitment, decode_event_id, encode_commitment_box, CommitmentTxBuilder};
pub use quorum::{required_commitment_count, RwtRepo};
pub use selection::{select_from_source, select_inputs, BoxSource, Excluding, VecBoxSource};
pub use trigger::{BuilderState, TriggerTxBuilder};
