//! A bidirectional file synchronizer that tracks moves, not just diffs.

pub mod apply;
pub mod classify;
pub mod config;
pub mod driver;
pub mod hash;
pub mod index;
pub mod io;
pub mod log;
pub mod reconcile;
pub mod record;
pub mod similarity;
pub mod snapshot;
pub mod walk;

pub use config::Config;
pub use driver::{Mode, RunOptions, RunReport};
pub use hash::{hash_bytes, hash_file, ContentHash, Hasher};
pub use index::FileIndex;
pub use record::FileRecord;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
