//! VRF <-> shared-VPN-table replication engine.
//!
//! Registered as a table listener in both directions: on every VRF table to
//! replicate outward into the shared VPN table, and once on the shared VPN
//! table to replicate inward into every importing VRF. Both directions run
//! inside the notifying partition task (see `rib::partition`), so the
//! engine itself holds no lock beyond the short-lived `RtGroupManager`
//! critical sections it calls into.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bgp_packet::{BgpAttr, ExtCommunity, ExtCommunitySubType, RouteDistinguisher};
use tracing::{debug, trace, warn};

use super::attr::{AttrStore, PathAttr};
use super::partition::{PartitionedTable, PathUpdate, TableRequest};
use super::path::{Path, PathSource};
use super::prefix::Prefix;
use super::rtgroup::{RouteTarget, RtGroupManager};
use super::table::RouteSnapshot;

struct InstanceEntry {
    rd: RouteDistinguisher,
    export_rts: HashSet<RouteTarget>,
    table: Arc<PartitionedTable>,
}

#[derive(Default)]
struct Shared {
    instances: Mutex<std::collections::HashMap<String, InstanceEntry>>,
}

/// The replication engine for one shared VPN table plus however many VRF
/// instances register against it.
pub struct ReplicationEngine {
    shared: Arc<Shared>,
    vpn_table: Arc<PartitionedTable>,
    rtgroups: Arc<RtGroupManager>,
    attrs: Arc<AttrStore>,
}

fn route_targets(attr: &PathAttr) -> Vec<RouteTarget> {
    attr.bgp
        .ecom
        .as_ref()
        .map(|ecom| {
            ecom.0
                .iter()
                .filter(|v| v.low_type == ExtCommunitySubType::RouteTarget as u8)
                .copied()
                .collect()
        })
        .unwrap_or_default()
}

/// Replace the route-target communities on `ecom` with `rts`, keeping every
/// other extended-community value untouched.
fn with_export_rts(ecom: Option<&ExtCommunity>, rts: &HashSet<RouteTarget>) -> ExtCommunity {
    let mut values: Vec<_> = ecom
        .map(|e| e.0.iter().filter(|v| v.low_type != ExtCommunitySubType::RouteTarget as u8).copied().collect())
        .unwrap_or_default();
    values.extend(rts.iter().copied());
    ExtCommunity(values)
}

impl ReplicationEngine {
    pub fn new(vpn_table: Arc<PartitionedTable>, rtgroups: Arc<RtGroupManager>, attrs: Arc<AttrStore>) -> Self {
        let shared = Arc::new(Shared::default());
        let engine = ReplicationEngine {
            shared: shared.clone(),
            vpn_table: vpn_table.clone(),
            rtgroups: rtgroups.clone(),
            attrs: attrs.clone(),
        };
        engine.install_vpn_listener();
        engine
    }

    fn install_vpn_listener(&self) {
        let shared = self.shared.clone();
        let rtgroups = self.rtgroups.clone();
        self.vpn_table.register_listener(move |_partition, snapshot, is_delete| {
            Self::replicate_vpn_to_vrf(&shared, &rtgroups, snapshot, is_delete);
        });
    }

    /// Register a VRF instance: its table starts replicating outward
    /// immediately, and becomes a replication target inward as soon as its
    /// import route-targets are joined in the RT-group manager.
    pub fn register_instance(&self, id: &str, rd: RouteDistinguisher, export_rts: HashSet<RouteTarget>, table: Arc<PartitionedTable>) {
        {
            let mut instances = self.shared.instances.lock().expect("replication map poisoned");
            instances.insert(
                id.to_string(),
                InstanceEntry {
                    rd,
                    export_rts,
                    table: table.clone(),
                },
            );
        }
        self.install_vrf_listener(id.to_string(), rd, table);
    }

    /// Instance deletion withdraws its replicated routes before its tables
    /// are destroyed.
    pub fn unregister_instance(&self, id: &str) {
        self.shared.instances.lock().expect("replication map poisoned").remove(id);
    }

    pub fn set_export_rts(&self, id: &str, export_rts: HashSet<RouteTarget>) {
        if let Some(entry) = self.shared.instances.lock().expect("replication map poisoned").get_mut(id) {
            entry.export_rts = export_rts;
        }
    }

    fn install_vrf_listener(&self, instance_id: String, rd: RouteDistinguisher, table: Arc<PartitionedTable>) {
        let shared = self.shared.clone();
        let vpn_table = self.vpn_table.clone();
        let attrs = self.attrs.clone();
        table.register_listener(move |_partition, snapshot, is_delete| {
            Self::replicate_vrf_to_vpn(&shared, &vpn_table, &attrs, &instance_id, rd, snapshot, is_delete);
        });
    }

    fn replicate_vrf_to_vpn(
        shared: &Shared,
        vpn_table: &PartitionedTable,
        attrs: &AttrStore,
        instance_id: &str,
        rd: RouteDistinguisher,
        snapshot: &RouteSnapshot,
        is_delete: bool,
    ) {
        let Some(vpn_prefix) = snapshot.prefix.with_rd(rd) else {
            // RouteTarget / already-VPN prefixes are not re-replicated.
            return;
        };

        if is_delete {
            trace!(prefix=%snapshot.prefix, instance=instance_id, "replicating withdraw into vpn table");
            vpn_table.enqueue(TableRequest::Delete {
                key: vpn_prefix,
                peer: snapshot.best_path().map(|p| p.peer.address).unwrap_or(std::net::IpAddr::from([0, 0, 0, 0])),
                path_id: snapshot.best_path().map(|p| p.path_id).unwrap_or(0),
            });
            return;
        }

        let Some(best) = snapshot.best_path() else { return };
        // A path already replicated from the VPN table carries this
        // instance's own RD as its source marker once it loops back; that
        // can only happen for a bug elsewhere, but guard anyway.
        if best.attr.source_rd == Some(rd) {
            return;
        }

        let export_rts = match shared.instances.lock().expect("replication map poisoned").get(instance_id) {
            Some(entry) => entry.export_rts.clone(),
            None => return,
        };

        let mut bgp: BgpAttr = best.attr.bgp.clone();
        bgp.ecom = Some(with_export_rts(bgp.ecom.as_ref(), &export_rts));
        let mut replicated = PathAttr::new(bgp);
        replicated.label = best.attr.label;
        replicated.source_rd = Some(rd);
        replicated.flags = best.attr.flags;
        let interned = attrs.intern(replicated);

        let mut path = Path::new(best.peer, PathSource::Bgp, best.path_id, interned);
        path.label = best.label;
        path.flags = best.flags;

        debug!(vrf=%instance_id, prefix=%vpn_prefix, "replicating vrf route into shared vpn table");
        vpn_table.enqueue(TableRequest::Add {
            key: vpn_prefix,
            update: PathUpdate {
                peer: path.peer,
                source: path.source,
                path_id: path.path_id,
                attr: path.attr,
                label: path.label,
                flags: path.flags,
            },
        });
    }

    fn replicate_vpn_to_vrf(shared: &Shared, rtgroups: &RtGroupManager, snapshot: &RouteSnapshot, is_delete: bool) {
        let Some(vrf_prefix) = snapshot.prefix.strip_rd() else { return };

        let rts = if is_delete {
            // Withdrawals may arrive with paths already cleared; fall back
            // to re-deriving targets from the deleted entry's last best
            // path if present, otherwise withdraw from every instance that
            // currently imports anything (best effort).
            snapshot.best_path().map(route_targets).unwrap_or_default()
        } else {
            match snapshot.best_path() {
                Some(p) => route_targets(&p.attr),
                None => return,
            }
        };

        let source_rd = snapshot.best_path().and_then(|p| p.attr.source_rd);

        let mut notified = HashSet::new();
        for rt in rts {
            for instance_id in rtgroups.importers(&rt) {
                if !notified.insert(instance_id.clone()) {
                    continue;
                }
                let instances = shared.instances.lock().expect("replication map poisoned");
                let Some(entry) = instances.get(&instance_id) else { continue };
                if Some(entry.rd) == source_rd {
                    continue;
                }
                let table = entry.table.clone();
                drop(instances);

                if is_delete {
                    table.enqueue(TableRequest::Delete {
                        key: vrf_prefix.clone(),
                        peer: snapshot.best_path().map(|p| p.peer.address).unwrap_or(std::net::IpAddr::from([0, 0, 0, 0])),
                        path_id: snapshot.best_path().map(|p| p.path_id).unwrap_or(0),
                    });
                } else if let Some(best) = snapshot.best_path() {
                    table.enqueue(TableRequest::Add {
                        key: vrf_prefix.clone(),
                        update: PathUpdate {
                            peer: best.peer,
                            source: PathSource::Bgp,
                            path_id: best.path_id,
                            attr: best.attr.clone(),
                            label: best.label,
                            flags: best.flags,
                        },
                    });
                }
            }
        }
        if notified.is_empty() {
            warn!(prefix=%snapshot.prefix, "vpn route carries no importable route-target, nothing replicated");
        }
    }
}

trait SnapshotExt {
    fn best_path(&self) -> Option<&Path>;
}

impl SnapshotExt for RouteSnapshot {
    fn best_path(&self) -> Option<&Path> {
        self.best_path_index.and_then(|i| self.paths.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_targets_filters_non_rt_extended_communities() {
        let mut bgp = BgpAttr::new();
        bgp.ecom = Some(ExtCommunity(vec![
            bgp_packet::ExtCommunityValue { high_type: 0x00, low_type: 0x02, val: [0, 0, 0, 0, 0, 1] },
            bgp_packet::ExtCommunityValue { high_type: 0x00, low_type: 0x03, val: [0, 0, 0, 0, 0, 2] },
        ]));
        let attr = PathAttr::new(bgp);
        let rts = route_targets(&attr);
        assert_eq!(rts.len(), 1);
        assert_eq!(rts[0].low_type, 0x02);
    }

    #[test]
    fn with_export_rts_replaces_old_targets_only() {
        let existing = ExtCommunity(vec![
            bgp_packet::ExtCommunityValue { high_type: 0x00, low_type: 0x02, val: [0, 0, 0, 0, 0, 9] },
            bgp_packet::ExtCommunityValue { high_type: 0x00, low_type: 0x03, val: [0, 0, 0, 0, 0, 2] },
        ]);
        let mut new_rts = HashSet::new();
        new_rts.insert(bgp_packet::ExtCommunityValue { high_type: 0x00, low_type: 0x02, val: [0, 0, 0, 0, 0, 42] });
        let result = with_export_rts(Some(&existing), &new_rts);
        assert_eq!(result.0.len(), 2);
        assert!(result.0.iter().any(|v| v.val[5] == 42));
        assert!(result.0.iter().any(|v| v.low_type == 0x03));
        assert!(!result.0.iter().any(|v| v.val[5] == 9));
    }
}
