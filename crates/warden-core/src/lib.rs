pub mod boxes;
pub mod config;
pub mod constants;
pub mod error;
pub mod observation;
pub mod records;
pub mod transaction;
pub mod types;

pub use boxes::*;
pub use config::WatcherParams;
pub use constants::*;
pub use error::{ErrorKind, WardenError};
pub use observation::*;
pub use records::*;
pub use transaction::*;
pub use types::*;
