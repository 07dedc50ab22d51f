//! Route entry and listener-registry types shared by every table partition.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use super::bestpath;
use super::path::Path;
use super::prefix::Prefix;

/// What changed about a route entry as a result of processing one request,
/// reported to listeners as a new/changed/deleted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Changed,
    Deleted,
}

/// A route entry owns the path set for one prefix.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub prefix: Prefix,
    /// Ordered by the best-path comparator; index 0 is the best path when
    /// non-empty.
    pub paths: Vec<Path>,
    /// Indices into `paths` that tie the best path on steps (1)-(6) of the
    /// comparator -- the multipath set.
    pub multipath: Vec<usize>,
    /// Logical deletion: true for exactly one notification cycle after the
    /// last path is removed, before the entry is physically dropped.
    pub deleted: bool,
}

impl RouteEntry {
    pub fn new(prefix: Prefix) -> Self {
        RouteEntry {
            prefix,
            paths: Vec::new(),
            multipath: Vec::new(),
            deleted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn best_path(&self) -> Option<&Path> {
        self.paths.first()
    }

    pub fn best_path_index(&self) -> Option<usize> {
        if self.paths.is_empty() { None } else { Some(0) }
    }

    /// Replaces the path identified by `(peer, path_id)` (or allocates a
    /// new one), then recomputes order.
    /// Returns whether the route was new or merely changed.
    pub fn upsert_path(&mut self, new_path: Path) -> ChangeKind {
        let was_empty = self.paths.is_empty();
        let key = new_path.key();
        if let Some(existing) = self.paths.iter_mut().find(|p| p.key() == key) {
            *existing = new_path;
        } else {
            self.paths.push(new_path);
        }
        self.deleted = false;
        self.recompute_best();
        if was_empty { ChangeKind::New } else { ChangeKind::Changed }
    }

    /// Removes the path identified by `(peer, path_id)`. If the route is
    /// now empty it is marked deleted
    /// but not physically dropped -- the caller (the partition task) keeps
    /// it one more cycle so listeners observe `is_delete=true`.
    pub fn remove_path(&mut self, peer_addr: std::net::IpAddr, path_id: u32) -> Option<ChangeKind> {
        let before = self.paths.len();
        self.paths.retain(|p| p.key() != (peer_addr, path_id));
        if self.paths.len() == before {
            return None;
        }
        self.recompute_best();
        if self.paths.is_empty() {
            self.deleted = true;
            Some(ChangeKind::Deleted)
        } else {
            Some(ChangeKind::Changed)
        }
    }

    fn recompute_best(&mut self) {
        self.paths.sort_by(bestpath::compare);
        self.multipath.clear();
        if let Some(best) = self.paths.first().cloned() {
            for (idx, p) in self.paths.iter().enumerate().skip(1) {
                if bestpath::is_multipath_sibling(&best, p) {
                    self.multipath.push(idx);
                }
            }
        }
    }

    pub fn feasible_paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().filter(|p| p.is_feasible())
    }
}

/// Read-only view handed to listeners, matching the listener callback
/// contract: `fn(partition_id, route_snapshot, is_delete)`.
#[derive(Debug, Clone)]
pub struct RouteSnapshot {
    pub prefix: Prefix,
    pub paths: Vec<Path>,
    pub best_path_index: Option<usize>,
    pub is_deleted: bool,
}

impl From<&RouteEntry> for RouteSnapshot {
    fn from(entry: &RouteEntry) -> Self {
        RouteSnapshot {
            prefix: entry.prefix.clone(),
            paths: entry.paths.clone(),
            best_path_index: entry.best_path_index(),
            is_deleted: entry.deleted,
        }
    }
}

pub type ListenerId = u64;
pub type ListenerFn = dyn Fn(usize, &RouteSnapshot, bool) + Send + Sync;

/// A table's listener registry (`register_listener`/`unregister_listener`).
/// Shared across every partition task so a listener sees every partition's
/// commits; each partition task only ever invokes it from its own task, so
/// two invocations for the *same* partition never overlap. Invocations for
/// *different* partitions can and do run concurrently.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, Arc<ListenerFn>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, f: Arc<ListenerFn>) -> ListenerId {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        self.listeners.lock().expect("listener registry poisoned").insert(id, f);
        id
    }

    pub fn unregister(&self, id: ListenerId) {
        self.listeners.lock().expect("listener registry poisoned").remove(&id);
    }

    pub fn notify(&self, partition: usize, snapshot: &RouteSnapshot, is_delete: bool) {
        let listeners: Vec<Arc<ListenerFn>> = self
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            (listener)(partition, snapshot, is_delete);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().expect("listener registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::attr::PathAttr;
    use crate::rib::path::{PeerId, PathSource};
    use bgp_packet::BgpAttr;
    use std::net::IpAddr;
    use std::sync::Arc as StdArc;

    fn peer(addr: &str) -> PeerId {
        PeerId {
            router_id: 1,
            address: addr.parse::<IpAddr>().unwrap(),
            is_ebgp: false,
            peer_as: 1,
        }
    }

    #[test]
    fn add_then_delete_marks_deleted_once() {
        let mut entry = RouteEntry::new(Prefix::Inet4("1.1.1.1/32".parse().unwrap()));
        let attr = StdArc::new(PathAttr::new(BgpAttr::new()));
        let path = Path::new(peer("10.0.0.1"), PathSource::Bgp, 0, attr);
        assert_eq!(entry.upsert_path(path), ChangeKind::New);
        assert!(!entry.deleted);

        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        let outcome = entry.remove_path(addr, 0);
        assert_eq!(outcome, Some(ChangeKind::Deleted));
        assert!(entry.deleted);
        assert!(entry.is_empty());
    }
}
