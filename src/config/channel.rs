//! Config-ingestion channel: `ConfigChannel`/`ConfigOp`/`ConfigRequest`
//! carry delta-stream objects from the config source to each manager's
//! event loop.
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::delta::ConfigDelta;

/// `CommitStart`/`CommitEnd` bracket a batch of `Set`/`Delete` deltas so a
/// subscriber can stage the whole batch before draining its cache into live
/// config in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOp {
    Set,
    Delete,
    CommitStart,
    CommitEnd,
}

#[derive(Debug, Clone)]
pub struct ConfigRequest {
    pub delta: Option<ConfigDelta>,
    pub op: ConfigOp,
}

impl ConfigRequest {
    pub fn new(delta: Option<ConfigDelta>, op: ConfigOp) -> Self {
        ConfigRequest { delta, op }
    }
}

#[derive(Debug)]
pub struct ConfigChannel {
    pub tx: UnboundedSender<ConfigRequest>,
    pub rx: UnboundedReceiver<ConfigRequest>,
}

impl ConfigChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        ConfigChannel { tx, rx }
    }
}

impl Default for ConfigChannel {
    fn default() -> Self {
        Self::new()
    }
}
