//! Top-level configuration dispatch.
//!
//! Each in-core manager (the policy evaluator, the routing-instance
//! registry) owns its own two-phase stage/commit cache, the same shape as
//! this codebase's `policy::PolicyConfig`. `ConfigIngest` is the thin
//! routing layer in front of them: one registered channel per
//! `ConfigKind`, `Set`/`Delete` forwarded to whichever manager owns that
//! kind, `CommitStart`/`CommitEnd` fanned out to all of them so every
//! manager drains its cache in the same commit.
use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::channel::{ConfigOp, ConfigRequest};
use super::delta::ConfigKind;

#[derive(Default)]
pub struct ConfigIngest {
    routes: HashMap<ConfigKind, UnboundedSender<ConfigRequest>>,
}

impl ConfigIngest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the manager responsible for `kind`'s deltas. Builder-style
    /// so startup wiring in `main` reads as a flat list, mirroring the
    /// fluent `ConfigBuilder` this layer generalizes.
    pub fn register(mut self, kind: ConfigKind, tx: UnboundedSender<ConfigRequest>) -> Self {
        self.routes.insert(kind, tx);
        self
    }

    pub fn dispatch(&self, req: ConfigRequest) {
        match req.op {
            ConfigOp::CommitStart | ConfigOp::CommitEnd => {
                for tx in self.routes.values() {
                    let _ = tx.send(ConfigRequest::new(None, req.op));
                }
            }
            ConfigOp::Set | ConfigOp::Delete => {
                let Some(delta) = &req.delta else { return };
                match self.routes.get(&delta.kind) {
                    Some(tx) => {
                        let _ = tx.send(req.clone());
                    }
                    None => {
                        warn!(kind = %delta.kind, name = %delta.name, "no manager registered for config kind, delta dropped");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::delta::ConfigDelta;
    use tokio::sync::mpsc;

    #[test]
    fn unknown_kind_is_dropped_not_fatal() {
        let ingest = ConfigIngest::new();
        let delta = ConfigDelta::set(ConfigKind::BgpRouter, "default", serde_json::json!({}));
        ingest.dispatch(ConfigRequest::new(Some(delta), ConfigOp::Set));
    }

    #[test]
    fn registered_kind_receives_delta() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ingest = ConfigIngest::new().register(ConfigKind::RoutingPolicy, tx);
        let delta = ConfigDelta::set(ConfigKind::RoutingPolicy, "import-policy", serde_json::json!({}));
        ingest.dispatch(ConfigRequest::new(Some(delta), ConfigOp::Set));
        assert!(rx.try_recv().is_ok());
    }
}
