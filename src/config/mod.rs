//! Configuration ingestion: routes Set/Delete/CommitStart/CommitEnd deltas
//! from the config source to the managers that own each config kind.
pub mod channel;
pub mod delta;
pub mod ingest;

pub use channel::{ConfigChannel, ConfigOp, ConfigRequest};
pub use delta::{ConfigDelta, ConfigKind};
pub use ingest::ConfigIngest;
