//! Interned, immutable path-attribute bundles.
//!
//! `bgp_attr::BgpAttr` already carries the wire-level attribute vocabulary
//! (origin, AS path, nexthop, communities, ...). This core generalizes it
//! with the fields the table/replication/aggregation layer also needs to
//! carry per path but that are not themselves BGP wire attributes: an MPLS
//! label, the route-distinguisher of the table the path was replicated
//! from, and a small parameter-flags bitset. `PathAttr` bundles are
//! content-hashed and interned the same way `bgp::store::BgpAttrStore`
//! interns `BgpAttr` -- except the interner here hands out `Arc` rather
//! than `Rc` handles, because partitions run as independent tokio tasks
//! (see `rib::partition`) and an interned bundle must be `Send`/`Sync` to
//! cross their channels.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use bgp_packet::{BgpAttr, RouteDistinguisher};
use bitflags::bitflags;

bitflags! {
    /// Parameter flags carried on the attribute bundle itself (as opposed
    /// to the per-path `PathFlags` in `rib::path`, which are path-local and
    /// not interned).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttrParamFlags: u8 {
        /// Attached via `no-tunnel-encap` policy or configuration.
        const NO_TUNNEL_ENCAP = 0b0000_0001;
        /// Carries the synthetic "accept-own-nexthop" community.
        const ACCEPT_OWN_NEXTHOP = 0b0000_0010;
    }
}

/// An interned, immutable path-attribute bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathAttr {
    pub bgp: BgpAttr,
    pub label: u32,
    pub source_rd: Option<RouteDistinguisher>,
    pub flags: AttrParamFlags,
}

impl PathAttr {
    pub fn new(bgp: BgpAttr) -> Self {
        PathAttr {
            bgp,
            label: 0,
            source_rd: None,
            flags: AttrParamFlags::empty(),
        }
    }
}

/// The single owner of interned `PathAttr` bundles. Two bundles with equal
/// content share one `Arc`; the interner only holds a `Weak` reference, so
/// a bundle is reclaimed the instant the last path referencing it is
/// dropped (no explicit `gc()` pass is required, but one is provided to
/// compact the backing map after a burst of churn).
#[derive(Debug, Default)]
pub struct AttrStore {
    inner: Mutex<HashMap<PathAttr, Weak<PathAttr>>>,
}

impl AttrStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, attr: PathAttr) -> Arc<PathAttr> {
        let mut store = self.inner.lock().expect("attr store poisoned");
        if let Some(weak) = store.get(&attr)
            && let Some(arc) = weak.upgrade()
        {
            return arc;
        }
        let arc = Arc::new(attr.clone());
        store.insert(attr, Arc::downgrade(&arc));
        arc
    }

    /// Drop entries whose last strong reference is already gone. Safe to
    /// call at any time; it never evicts a bundle still referenced by a
    /// live path because `intern` always re-checks via `upgrade()`.
    pub fn gc(&self) {
        let mut store = self.inner.lock().expect("attr store poisoned");
        store.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("attr store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refcnt(&self, attr: &PathAttr) -> usize {
        self.inner
            .lock()
            .expect("attr store poisoned")
            .get(attr)
            .map(Weak::strong_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_shares_one_instance() {
        let store = AttrStore::new();
        let a = store.intern(PathAttr::new(BgpAttr::new()));
        let b = store.intern(PathAttr::new(BgpAttr::new()));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.refcnt(&a), 2);
    }

    #[test]
    fn bundle_reclaimed_when_last_path_drops() {
        let store = AttrStore::new();
        let attr = PathAttr::new(BgpAttr::new());
        let handle = store.intern(attr.clone());
        assert_eq!(store.len(), 1);
        drop(handle);
        store.gc();
        assert_eq!(store.len(), 0);
        // distinct content still interns as a fresh bundle after gc.
        let _ = store.intern(attr);
        assert_eq!(store.len(), 1);
    }
}
