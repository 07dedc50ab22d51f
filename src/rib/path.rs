//! A single route advertisement.
use std::net::IpAddr;
use std::sync::Arc;

use bitflags::bitflags;

use super::attr::PathAttr;

/// Where a path came from. Distinguishing `source_tag` keeps synthesized
/// routes (Aggregate/Static/ResolvedRoute) from re-triggering the condition
/// listeners that produced them -- see `rib::condition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSource {
    Bgp,
    Xmpp,
    Aggregate,
    ServiceChain,
    Static,
    ResolvedRoute,
    Local,
}

bitflags! {
    /// Per-path flags. Unlike `AttrParamFlags` on `PathAttr`, these are not
    /// interned -- they vary independently of attribute content (two paths
    /// with identical attributes can differ in staleness or reject state).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PathFlags: u16 {
        /// Retained during a graceful-restart window; ineligible as best
        /// until refreshed.
        const STALE = 0b0000_0001;
        const NO_TUNNEL_ENCAP = 0b0000_0010;
        /// Set by the policy evaluator's `reject` action (4.8); makes the
        /// path infeasible without discarding it.
        const POLICY_REJECT = 0b0000_0100;
        /// Nexthop has not yet resolved to a reachable route.
        const RESOLVE_NEXTHOP = 0b0000_1000;
        const AS_PATH_LOOPED = 0b0001_0000;
    }
}

impl PathFlags {
    /// A path is feasible iff none of the infeasibility-causing flags are
    /// set.
    pub fn is_feasible(&self) -> bool {
        !self.intersects(
            PathFlags::RESOLVE_NEXTHOP | PathFlags::POLICY_REJECT | PathFlags::AS_PATH_LOOPED,
        )
    }
}

/// Identifies the peer (or channel, or internal producer) that owns a
/// path. `router_id`/`address` are used by the best-path comparator's
/// router-id and peer-address tie-breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId {
    pub router_id: u32,
    pub address: IpAddr,
    pub is_ebgp: bool,
    pub peer_as: u32,
}

/// `(peer_id, source_tag, path_id, attr, label, flags)`.
#[derive(Debug, Clone)]
pub struct Path {
    pub peer: PeerId,
    pub source: PathSource,
    /// Distinguishes multiple paths from the same peer for the same
    /// prefix (ECMP / add-path).
    pub path_id: u32,
    pub attr: Arc<PathAttr>,
    /// Attributes as received, before policy rewrote them; retained so
    /// telemetry can report the pre-policy view even after a `reject`.
    pub original_attr: Option<Arc<PathAttr>>,
    pub label: u32,
    pub flags: PathFlags,
}

impl Path {
    pub fn new(peer: PeerId, source: PathSource, path_id: u32, attr: Arc<PathAttr>) -> Self {
        Path {
            peer,
            source,
            path_id,
            attr,
            original_attr: None,
            label: 0,
            flags: PathFlags::empty(),
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.flags.is_feasible()
    }

    pub fn key(&self) -> (IpAddr, u32) {
        (self.peer.address, self.path_id)
    }

    pub fn local_pref(&self) -> u32 {
        self.attr
            .bgp
            .local_pref
            .as_ref()
            .map(|lp| lp.local_pref)
            .unwrap_or(100)
    }

    pub fn as_path_len(&self) -> usize {
        self.attr
            .bgp
            .aspath
            .as_ref()
            .map(|p| p.segs.iter().map(|s| s.asn.len()).sum())
            .unwrap_or(0)
    }

    /// Numeric origin code (IGP=0 < EGP=1 < Incomplete=2), defaulting to
    /// Incomplete when no origin attribute is present.
    pub fn origin_code(&self) -> u8 {
        self.attr.bgp.origin.map(u8::from).unwrap_or(2)
    }

    pub fn med(&self) -> u32 {
        self.attr.bgp.med.as_ref().map(|m| m.med).unwrap_or(0)
    }

    pub fn cluster_list_len(&self) -> usize {
        self.attr
            .bgp
            .cluster_list
            .as_ref()
            .map(|c| c.list.len())
            .unwrap_or(0)
    }
}
