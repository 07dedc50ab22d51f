//! Routing instance registry.
//!
//! A `RoutingInstance` is this core's unit of isolation: one per VRF, plus
//! one distinguished "master" instance that hosts the shared VPN table and
//! the process-wide route-target table used by (D)'s membership rescans
//! and by (J)'s RT advertisements. Each instance owns one `PartitionedTable`
//! per address family it carries routes for, plus whatever aggregator and
//! static-route managers are configured against it.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use bgp_packet::RouteDistinguisher;
use tracing::debug;

use super::aggregate::RouteAggregator;
use super::partition::PartitionedTable;
use super::prefix::Family;
use super::replication::ReplicationEngine;
use super::rtgroup::{RouteTarget, RtGroupManager};
use super::static_route::StaticRouteManager;

pub const MASTER_INSTANCE: &str = "master";

/// Number of per-prefix-hash partitions each table is split into. Fixed at
/// construction time; see `rib::partition` for why a table is sharded this
/// way instead of behind one lock.
const DEFAULT_PARTITIONS: usize = 8;

pub struct RoutingInstance {
    pub name: String,
    pub rd: Option<RouteDistinguisher>,
    pub import_rts: HashSet<RouteTarget>,
    pub export_rts: HashSet<RouteTarget>,
    pub virtual_network_index: Option<u32>,
    /// Attached policy names, in configured order, separately for import
    /// and export binding points.
    pub import_policies: Vec<String>,
    pub export_policies: Vec<String>,
    tables: HashMap<Family, Arc<PartitionedTable>>,
    pub aggregators: HashMap<Family, Arc<RouteAggregator>>,
    pub statics: HashMap<Family, Arc<StaticRouteManager>>,
}

impl RoutingInstance {
    pub fn new(name: impl Into<String>, rd: Option<RouteDistinguisher>) -> Self {
        RoutingInstance {
            name: name.into(),
            rd,
            import_rts: HashSet::new(),
            export_rts: HashSet::new(),
            virtual_network_index: None,
            import_policies: Vec::new(),
            export_policies: Vec::new(),
            tables: HashMap::new(),
            aggregators: HashMap::new(),
            statics: HashMap::new(),
        }
    }

    pub fn table(&self, family: Family) -> Option<Arc<PartitionedTable>> {
        self.tables.get(&family).cloned()
    }

    pub fn ensure_table(&mut self, family: Family) -> Arc<PartitionedTable> {
        self.tables
            .entry(family)
            .or_insert_with(|| Arc::new(PartitionedTable::new(DEFAULT_PARTITIONS)))
            .clone()
    }

    pub fn families(&self) -> impl Iterator<Item = Family> + '_ {
        self.tables.keys().copied()
    }
}

/// A read-only view of one instance, the shape XMPP's agent channel (a
/// separate task per connection) and the BGP peer boundary need without
/// taking a critical section on the registry itself.
#[derive(Clone)]
pub struct InstanceSnapshot {
    pub name: String,
    pub rd: Option<RouteDistinguisher>,
    pub import_rts: HashSet<RouteTarget>,
    pub tables: HashMap<Family, Arc<PartitionedTable>>,
}

impl From<&RoutingInstance> for InstanceSnapshot {
    fn from(instance: &RoutingInstance) -> Self {
        InstanceSnapshot {
            name: instance.name.clone(),
            rd: instance.rd,
            import_rts: instance.import_rts.clone(),
            tables: instance.tables.clone(),
        }
    }
}

/// Read-mostly directory of instance snapshots, read-mostly after
/// startup. `InstanceRegistry` is the only
/// writer; readers never block a config-driven registry update for longer
/// than copying a handful of `Arc` clones.
pub type InstanceDirectory = Arc<RwLock<HashMap<String, InstanceSnapshot>>>;

/// Registry of every configured routing instance, including the
/// distinguished master. Owns the process-wide `RtGroupManager` and the
/// `ReplicationEngine` bound to the master's VPN table, since
/// both are shared infrastructure rather than per-instance state.
pub struct InstanceRegistry {
    instances: HashMap<String, RoutingInstance>,
    pub rtgroups: Arc<RtGroupManager>,
    pub replication: HashMap<Family, Arc<ReplicationEngine>>,
    pub attrs: Arc<super::attr::AttrStore>,
    directory: InstanceDirectory,
}

impl InstanceRegistry {
    pub fn new(attrs: Arc<super::attr::AttrStore>) -> Self {
        let mut instances = HashMap::new();
        instances.insert(MASTER_INSTANCE.to_string(), RoutingInstance::new(MASTER_INSTANCE, None));
        let registry = InstanceRegistry {
            instances,
            rtgroups: Arc::new(RtGroupManager::new()),
            replication: HashMap::new(),
            attrs,
            directory: Arc::new(RwLock::new(HashMap::new())),
        };
        registry.sync_directory(MASTER_INSTANCE);
        registry
    }

    /// Re-publishes `name`'s current state into the shared directory.
    /// Called after every structural change to an instance this registry
    /// owns; a no-op read-side cost for XMPP/BGP's far more frequent reads.
    fn sync_directory(&self, name: &str) {
        let mut directory = self.directory.write().expect("instance directory poisoned");
        match self.instances.get(name) {
            Some(instance) => {
                directory.insert(name.to_string(), InstanceSnapshot::from(instance));
            }
            None => {
                directory.remove(name);
            }
        }
    }

    pub fn directory(&self) -> InstanceDirectory {
        self.directory.clone()
    }

    pub fn get(&self, name: &str) -> Option<&RoutingInstance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RoutingInstance> {
        self.instances.get_mut(name)
    }

    pub fn master(&self) -> &RoutingInstance {
        self.instances.get(MASTER_INSTANCE).expect("master instance always present")
    }

    /// Ensures a shared VPN-family table exists on the master instance and
    /// a `ReplicationEngine` is bound to it, creating both on first use for
    /// that family.
    pub fn ensure_replication(&mut self, vpn_family: Family) -> Arc<ReplicationEngine> {
        if let Some(engine) = self.replication.get(&vpn_family) {
            return engine.clone();
        }
        let master = self.instances.get_mut(MASTER_INSTANCE).expect("master instance always present");
        let vpn_table = master.ensure_table(vpn_family);
        let engine = Arc::new(ReplicationEngine::new(vpn_table, self.rtgroups.clone(), self.attrs.clone()));
        self.replication.insert(vpn_family, engine.clone());
        self.sync_directory(MASTER_INSTANCE);
        engine
    }

    /// Ensures the master instance carries a `RouteTarget`-family table,
    /// used for RT-route advertisement/withdrawal on subscribe and ASN
    /// change. Exposed separately from `ensure_replication` since the RT
    /// table is not itself a replication target.
    pub fn ensure_rtarget_table(&mut self) -> Arc<PartitionedTable> {
        let master = self.instances.get_mut(MASTER_INSTANCE).expect("master instance always present");
        let table = master.ensure_table(Family::RouteTarget);
        self.sync_directory(MASTER_INSTANCE);
        table
    }

    /// Creates (or replaces) a VRF instance, wiring its table for `family`
    /// into the shared replication engine and joining its route-targets in
    /// the RT-group manager.
    pub fn create_vrf(
        &mut self,
        name: &str,
        rd: RouteDistinguisher,
        family: Family,
        vpn_family: Family,
        import_rts: HashSet<RouteTarget>,
        export_rts: HashSet<RouteTarget>,
    ) {
        let mut instance = RoutingInstance::new(name, Some(rd));
        let table = instance.ensure_table(family);
        instance.import_rts = import_rts.clone();
        instance.export_rts = export_rts.clone();
        self.instances.insert(name.to_string(), instance);

        for rt in &import_rts {
            self.rtgroups.join_import(*rt, name);
        }
        for rt in &export_rts {
            self.rtgroups.join_export(*rt, name);
        }

        let engine = self.ensure_replication(vpn_family);
        engine.register_instance(name, rd, export_rts, table);
        self.sync_directory(name);
        debug!(instance = name, "vrf instance created");
    }

    /// Tears down a VRF instance: withdraws its replicated routes first
    ///, then leaves its route-target groups,
    /// then drops the instance itself.
    pub fn delete_vrf(&mut self, name: &str) {
        if let Some(instance) = self.instances.remove(name) {
            for engine in self.replication.values() {
                engine.unregister_instance(name);
            }
            for rt in &instance.import_rts {
                self.rtgroups.leave_import(*rt, name);
            }
            for rt in &instance.export_rts {
                self.rtgroups.leave_export(*rt, name);
            }
            self.sync_directory(name);
            debug!(instance = name, "vrf instance deleted");
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.instances.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt(low: u8) -> RouteTarget {
        bgp_packet::ExtCommunityValue {
            high_type: 0x00,
            low_type: 0x02,
            val: [0, 0, 0, 0, 0, low],
        }
    }

    #[test]
    fn create_then_delete_vrf_leaves_rt_groups_clean() {
        let attrs = Arc::new(super::super::attr::AttrStore::new());
        let mut registry = InstanceRegistry::new(attrs);
        let rd = RouteDistinguisher::new_asn(65000, 1);
        let mut import = HashSet::new();
        import.insert(rt(1));

        registry.create_vrf("vrf-a", rd, Family::Inet4, Family::L3Vpn4, import.clone(), HashSet::new());
        assert_eq!(registry.rtgroups.importers(&rt(1)).len(), 1);

        registry.delete_vrf("vrf-a");
        assert!(registry.rtgroups.importers(&rt(1)).is_empty());
        assert!(registry.get("vrf-a").is_none());
    }
}
