//! Error types shared across the control-plane core.
use thiserror::Error;

use crate::rib::prefix::Prefix;

/// Errors surfaced while applying a route update to a table or while
/// a replication/aggregation pass walks one.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("routing instance {0} not found")]
    InstanceNotFound(String),

    #[error("table for family {0:?} not found in instance {1}")]
    TableNotFound(crate::rib::prefix::Family, String),

    #[error("route-target group {0} not found")]
    RtGroupNotFound(String),

    #[error("prefix {0} already withdrawn")]
    AlreadyWithdrawn(Prefix),

    #[error("static route resolve failed for {0}: no reachable nexthop")]
    NexthopUnresolved(Prefix),

    #[error("policy {0} not found")]
    PolicyNotFound(String),

    #[error("partition worker for {0} is gone")]
    PartitionGone(String),
}

/// Errors raised while applying a configuration delta.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration path: {0}")]
    UnknownPath(String),

    #[error("malformed value for {path}: {reason}")]
    MalformedValue { path: String, reason: String },

    #[error("delete of unknown object {kind}/{name}")]
    UnknownObject { kind: String, name: String },
}

/// Errors raised by the XMPP agent-channel layer (above the wire framing,
/// which is out of scope for this crate).
#[derive(Debug, Error)]
pub enum AgentChannelError {
    #[error("agent {0} has no open channel")]
    NoChannel(String),

    #[error("subscribe for instance {0} received while channel is down")]
    SubscribeWhileDown(String),

    #[error("duplicate subscribe for instance {0} on agent {1}")]
    DuplicateSubscribe(String, String),
}
