//! Configuration delta schema ingested by the core.
use strum_macros::{Display, EnumString};

/// Object kinds the core consumes out of the configuration stream. Every
/// other kind (anything the outer configuration system carries that this
/// core has no business touching) never reaches `ConfigDelta` in the first
/// place -- the boundary producing deltas is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum ConfigKind {
    #[strum(serialize = "routing-instance")]
    RoutingInstance,
    #[strum(serialize = "bgp-router")]
    BgpRouter,
    #[strum(serialize = "bgp-peering")]
    BgpPeering,
    #[strum(serialize = "routing-policy")]
    RoutingPolicy,
    #[strum(serialize = "route-aggregate")]
    RouteAggregate,
    #[strum(serialize = "static-route-entries")]
    StaticRouteEntries,
    #[strum(serialize = "global-system-config")]
    GlobalSystemConfig,
    #[strum(serialize = "virtual-network")]
    VirtualNetwork,
}

/// One entry in the configuration delta stream. Absence of `content`
/// signals deletion of the named object.
#[derive(Debug, Clone)]
pub struct ConfigDelta {
    pub kind: ConfigKind,
    pub name: String,
    pub content: Option<serde_json::Value>,
}

impl ConfigDelta {
    pub fn set(kind: ConfigKind, name: impl Into<String>, content: serde_json::Value) -> Self {
        ConfigDelta {
            kind,
            name: name.into(),
            content: Some(content),
        }
    }

    pub fn delete(kind: ConfigKind, name: impl Into<String>) -> Self {
        ConfigDelta {
            kind,
            name: name.into(),
            content: None,
        }
    }
}
