//! Route-target group manager.
//!
//! Keyed by route-target extended-community value, a group tracks the set
//! of instances that import and export it. The replication engine
//! (`rib::replication`) consults `importers` on every VPN-table
//! notification; this module only owns the membership bookkeeping and the
//! rescan signal that fires on a non-empty<->empty transition.
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bgp_packet::ExtCommunityValue;

/// A route-target, represented as the raw 6-byte extended-community value
/// (type/subtype octets are stripped by the caller before lookup, since a
/// group is keyed purely by the target value).
pub type RouteTarget = ExtCommunityValue;

#[derive(Default)]
struct Group {
    importers: HashSet<String>,
    exporters: HashSet<String>,
}

/// Describes which non-empty<->empty transition just happened, so the
/// caller knows whether a rescan of the shared VPN table is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    BecameNonEmpty,
    BecameEmpty,
}

/// Process-wide route-target membership map. Writes are serialized
/// by a single mutex; `importers` takes the same lock for the short read.
#[derive(Default)]
pub struct RtGroupManager {
    groups: Mutex<HashMap<RouteTarget, Group>>,
}

impl RtGroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn importer_transition(group: &Group, was_empty: bool) -> Transition {
        match (was_empty, group.importers.is_empty()) {
            (true, false) => Transition::BecameNonEmpty,
            (false, true) => Transition::BecameEmpty,
            _ => Transition::None,
        }
    }

    /// `locate(rt) -> group`: idempotent create-if-absent. Exposed mainly
    /// so callers can pre-warm a group before the first join.
    pub fn locate(&self, rt: RouteTarget) {
        self.groups.lock().expect("rt-group map poisoned").entry(rt).or_default();
    }

    /// Returns the importer-set transition caused by this join, so the
    /// caller can decide whether to enqueue a VPN-table rescan.
    pub fn join_import(&self, rt: RouteTarget, instance: &str) -> Transition {
        let mut groups = self.groups.lock().expect("rt-group map poisoned");
        let group = groups.entry(rt).or_default();
        let was_empty = group.importers.is_empty();
        group.importers.insert(instance.to_string());
        Self::importer_transition(group, was_empty)
    }

    pub fn leave_import(&self, rt: RouteTarget, instance: &str) -> Transition {
        let mut groups = self.groups.lock().expect("rt-group map poisoned");
        let Some(group) = groups.get_mut(&rt) else {
            return Transition::None;
        };
        let was_empty = group.importers.is_empty();
        group.importers.remove(instance);
        let transition = Self::importer_transition(group, was_empty);
        if group.importers.is_empty() && group.exporters.is_empty() {
            groups.remove(&rt);
        }
        transition
    }

    pub fn join_export(&self, rt: RouteTarget, instance: &str) {
        let mut groups = self.groups.lock().expect("rt-group map poisoned");
        groups.entry(rt).or_default().exporters.insert(instance.to_string());
    }

    pub fn leave_export(&self, rt: RouteTarget, instance: &str) {
        let mut groups = self.groups.lock().expect("rt-group map poisoned");
        let Some(group) = groups.get_mut(&rt) else {
            return;
        };
        group.exporters.remove(instance);
        if group.importers.is_empty() && group.exporters.is_empty() {
            groups.remove(&rt);
        }
    }

    pub fn importers(&self, rt: &RouteTarget) -> HashSet<String> {
        self.groups
            .lock()
            .expect("rt-group map poisoned")
            .get(rt)
            .map(|g| g.importers.clone())
            .unwrap_or_default()
    }

    pub fn exporters(&self, rt: &RouteTarget) -> HashSet<String> {
        self.groups
            .lock()
            .expect("rt-group map poisoned")
            .get(rt)
            .map(|g| g.exporters.clone())
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().expect("rt-group map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt(low: u8) -> RouteTarget {
        ExtCommunityValue {
            high_type: 0x00,
            low_type: 0x02,
            val: [0, 0, 0, 0, 0, low],
        }
    }

    #[test]
    fn join_then_leave_tracks_transitions() {
        let mgr = RtGroupManager::new();
        let target = rt(1);
        assert_eq!(mgr.join_import(target, "vrf-a"), Transition::BecameNonEmpty);
        assert_eq!(mgr.join_import(target, "vrf-b"), Transition::None);
        assert_eq!(mgr.importers(&target).len(), 2);

        assert_eq!(mgr.leave_import(target, "vrf-a"), Transition::None);
        assert_eq!(mgr.leave_import(target, "vrf-b"), Transition::BecameEmpty);
        assert!(mgr.importers(&target).is_empty());
    }

    #[test]
    fn group_with_only_exporters_survives_until_both_sides_empty() {
        let mgr = RtGroupManager::new();
        let target = rt(2);
        mgr.join_export(target, "vrf-a");
        assert_eq!(mgr.group_count(), 1);
        mgr.leave_export(target, "vrf-a");
        assert_eq!(mgr.group_count(), 0);
    }

    #[test]
    fn importers_unaffected_by_exporter_changes() {
        let mgr = RtGroupManager::new();
        let target = rt(3);
        mgr.join_import(target, "vrf-a");
        mgr.join_export(target, "vrf-b");
        assert_eq!(mgr.importers(&target).len(), 1);
        assert_eq!(mgr.exporters(&target).len(), 1);
    }
}
