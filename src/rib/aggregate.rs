//! Route aggregator.
//!
//! Each configured `{aggregate_prefix, nexthop_ip}` entry drives two
//! condition-listener matches against the owning instance's table: one for
//! contributing routes, one for the nexthop host route. Both matches push
//! the entry's id onto a single coalescing channel drained by one
//! dedicated consumer task per aggregator, so that a burst of contributing
//! routes collapses into one recompute instead of one per route.
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use super::attr::{AttrStore, PathAttr};
use super::condition::{ConditionListener, MatchHandle};
use super::partition::{PartitionedTable, PathUpdate, TableRequest};
use super::path::{Path, PathFlags, PathSource, PeerId};
use super::prefix::Prefix;

pub type AggregateId = u64;

#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub aggregate_prefix: Prefix,
    pub nexthop_ip: IpAddr,
}

struct Entry {
    config: Mutex<AggregateConfig>,
    table: Arc<PartitionedTable>,
    contributing: Mutex<HashSet<Prefix>>,
    nexthop_path: Mutex<Option<Path>>,
    contributing_match: Mutex<Option<MatchHandle>>,
    nexthop_match: Mutex<Option<MatchHandle>>,
    published: Mutex<bool>,
    publish_peer: PeerId,
}

/// This aggregator instance's "virtual peer" identity, used as the
/// synthesized path's `PeerId` since an aggregate route has no originating
/// BGP neighbor.
fn local_peer() -> PeerId {
    PeerId {
        router_id: 0,
        address: IpAddr::from([0, 0, 0, 0]),
        is_ebgp: false,
        peer_as: 0,
    }
}

pub struct RouteAggregator {
    condition: Arc<ConditionListener>,
    attrs: Arc<AttrStore>,
    entries: Mutex<std::collections::HashMap<AggregateId, Arc<Entry>>>,
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<AggregateId>,
}

impl RouteAggregator {
    pub fn new(table: Arc<PartitionedTable>, attrs: Arc<AttrStore>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(RouteAggregator {
            condition: Arc::new(ConditionListener::new(table)),
            attrs,
            entries: Mutex::new(std::collections::HashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
        });
        aggregator.clone().spawn_consumer(rx);
        aggregator
    }

    fn spawn_consumer(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<AggregateId>) {
        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                let mut batch = HashSet::new();
                batch.insert(id);
                while let Ok(next) = rx.try_recv() {
                    batch.insert(next);
                }
                for id in batch {
                    self.recompute(id);
                }
            }
        });
    }

    /// Registers a new aggregate entry and returns its id.
    pub fn add_entry(&self, table: Arc<PartitionedTable>, config: AggregateConfig) -> AggregateId {
        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let entry = Arc::new(Entry {
            config: Mutex::new(config),
            table,
            contributing: Mutex::new(HashSet::new()),
            nexthop_path: Mutex::new(None),
            contributing_match: Mutex::new(None),
            nexthop_match: Mutex::new(None),
            published: Mutex::new(false),
            publish_peer: local_peer(),
        });
        self.install_matches(id, &entry);
        self.entries.lock().expect("aggregate entry map poisoned").insert(id, entry);
        id
    }

    fn install_matches(&self, id: AggregateId, entry: &Arc<Entry>) {
        let config = entry.config.lock().expect("aggregate entry poisoned").clone();
        let aggregate_prefix = config.aggregate_prefix.clone();
        let nexthop_ip = config.nexthop_ip;

        let contrib_on_match_entry = entry.clone();
        let contrib_on_match_tx = self.tx.clone();
        let contrib_on_unmatch_entry = entry.clone();
        let contrib_on_unmatch_tx = self.tx.clone();
        let contributing_handle = self.condition.register(
            move |snap| {
                snap.prefix.strictly_more_specific_than(&aggregate_prefix)
                    && !snap.prefix.is_host_route_for(nexthop_ip)
                    && snap
                        .paths
                        .get(snap.best_path_index.unwrap_or(usize::MAX))
                        .map(|p| p.source != PathSource::Aggregate)
                        .unwrap_or(true)
            },
            move |snap| {
                contrib_on_match_entry
                    .contributing
                    .lock()
                    .expect("contributing set poisoned")
                    .insert(snap.prefix.clone());
                let _ = contrib_on_match_tx.send(id);
            },
            move |snap| {
                contrib_on_unmatch_entry
                    .contributing
                    .lock()
                    .expect("contributing set poisoned")
                    .remove(&snap.prefix);
                let _ = contrib_on_unmatch_tx.send(id);
            },
        );
        *entry.contributing_match.lock().expect("match handle poisoned") = Some(contributing_handle);

        let nexthop_on_match_entry = entry.clone();
        let nexthop_on_match_tx = self.tx.clone();
        let nexthop_on_unmatch_entry = entry.clone();
        let nexthop_on_unmatch_tx = self.tx.clone();
        let nexthop_handle = self.condition.register(
            move |snap| snap.prefix.is_host_route_for(nexthop_ip),
            move |snap| {
                // An infeasible best path (policy-rejected, looped, itself
                // still unresolved) is treated the same as no host route at
                // all, so the aggregate's feasibility tracks the nexthop's.
                let best = snap
                    .best_path_index
                    .and_then(|i| snap.paths.get(i))
                    .filter(|p| p.is_feasible())
                    .cloned();
                *nexthop_on_match_entry.nexthop_path.lock().expect("nexthop path poisoned") = best;
                let _ = nexthop_on_match_tx.send(id);
            },
            move |_snap| {
                *nexthop_on_unmatch_entry.nexthop_path.lock().expect("nexthop path poisoned") = None;
                let _ = nexthop_on_unmatch_tx.send(id);
            },
        );
        *entry.nexthop_match.lock().expect("match handle poisoned") = Some(nexthop_handle);
    }

    fn recompute(&self, id: AggregateId) {
        let entry = match self.entries.lock().expect("aggregate entry map poisoned").get(&id) {
            Some(e) => e.clone(),
            None => return,
        };
        let config = entry.config.lock().expect("aggregate entry poisoned").clone();
        let contributing_count = entry.contributing.lock().expect("contributing set poisoned").len();
        let nexthop_path = entry.nexthop_path.lock().expect("nexthop path poisoned").clone();
        let mut published = entry.published.lock().expect("published flag poisoned");

        if contributing_count == 0 {
            if *published {
                self.withdraw(&entry, &config);
                *published = false;
            }
            return;
        }

        match nexthop_path {
            None => {
                debug!(prefix=%config.aggregate_prefix, "publishing aggregate with unresolved nexthop");
                self.publish_unresolved(&entry, &config);
            }
            Some(nh) => {
                debug!(prefix=%config.aggregate_prefix, "publishing aggregate with resolved nexthop");
                self.publish_resolved(&entry, &config, &nh);
            }
        }
        *published = true;
    }

    fn withdraw(&self, entry: &Entry, config: &AggregateConfig) {
        entry.table.enqueue(TableRequest::Delete {
            key: config.aggregate_prefix.clone(),
            peer: entry.publish_peer.address,
            path_id: 0,
        });
    }

    fn publish_unresolved(&self, entry: &Entry, config: &AggregateConfig) {
        let attr = self.attrs.intern(PathAttr::new(bgp_packet::BgpAttr::new()));
        entry.table.enqueue(TableRequest::Add {
            key: config.aggregate_prefix.clone(),
            update: PathUpdate {
                peer: entry.publish_peer,
                source: PathSource::Aggregate,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::RESOLVE_NEXTHOP,
            },
        });
    }

    fn publish_resolved(&self, entry: &Entry, config: &AggregateConfig, nexthop: &Path) {
        let mut bgp = nexthop.attr.bgp.clone();
        bgp.local_pref = None;
        bgp.med = None;
        let mut attr = PathAttr::new(bgp);
        attr.label = nexthop.attr.label;
        attr.flags = nexthop.attr.flags;
        let interned = self.attrs.intern(attr);
        entry.table.enqueue(TableRequest::Add {
            key: config.aggregate_prefix.clone(),
            update: PathUpdate {
                peer: entry.publish_peer,
                source: PathSource::Aggregate,
                path_id: 0,
                attr: interned,
                label: nexthop.label,
                flags: PathFlags::empty(),
            },
        });
    }

    /// Config update: prefix change swaps the predicate (old match
    /// unregisters asynchronously, new one installs); nexthop change only
    /// needs a recompute since the existing nexthop match already tracks
    /// the new address once re-registered.
    pub async fn update_entry(&self, id: AggregateId, config: AggregateConfig) {
        let entry = match self.entries.lock().expect("aggregate entry map poisoned").get(&id) {
            Some(e) => e.clone(),
            None => return,
        };
        let old_config = entry.config.lock().expect("aggregate entry poisoned").clone();
        let mut published = entry.published.lock().expect("published flag poisoned");
        if *published {
            self.withdraw(&entry, &old_config);
            *published = false;
        }
        drop(published);
        *entry.config.lock().expect("aggregate entry poisoned") = config;
        entry.contributing.lock().expect("contributing set poisoned").clear();
        self.remove_matches(&entry).await;
        self.install_matches(id, &entry);
    }

    pub async fn remove_entry(&self, id: AggregateId) {
        let entry = self.entries.lock().expect("aggregate entry map poisoned").remove(&id);
        if let Some(entry) = entry {
            self.remove_matches(&entry).await;
            let published = *entry.published.lock().expect("published flag poisoned");
            if published {
                let config = entry.config.lock().expect("aggregate entry poisoned").clone();
                self.withdraw(&entry, &config);
            }
        }
    }

    async fn remove_matches(&self, entry: &Entry) {
        if let Some(handle) = entry.contributing_match.lock().expect("match handle poisoned").take() {
            self.condition.notify_match_deletion(&handle).await;
            self.condition.unregister(handle).await;
        }
        if let Some(handle) = entry.nexthop_match.lock().expect("match handle poisoned").take() {
            self.condition.notify_match_deletion(&handle).await;
            self.condition.unregister(handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_packet::{BgpAttr, BgpNexthop};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn peer(addr: &str) -> PeerId {
        PeerId {
            router_id: 1,
            address: addr.parse().unwrap(),
            is_ebgp: true,
            peer_as: 64497,
        }
    }

    fn add_host(table: &PartitionedTable, attrs: &AttrStore, addr: &str, nexthop: &str) {
        let mut bgp = BgpAttr::new();
        bgp.nexthop = Some(BgpNexthop::Ipv4(nexthop.parse::<Ipv4Addr>().unwrap()));
        let attr = attrs.intern(PathAttr::new(bgp));
        table.enqueue(TableRequest::Add {
            key: Prefix::host4(addr.parse::<Ipv4Addr>().unwrap()),
            update: PathUpdate {
                peer: peer("192.0.2.1"),
                source: PathSource::Bgp,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::empty(),
            },
        });
    }

    fn delete_host(table: &PartitionedTable, addr: &str) {
        table.enqueue(TableRequest::Delete {
            key: Prefix::host4(addr.parse::<Ipv4Addr>().unwrap()),
            peer: peer("192.0.2.1").address,
            path_id: 0,
        });
    }

    #[tokio::test]
    async fn aggregate_published_once_contributor_and_nexthop_present_then_withdrawn() {
        let table = Arc::new(PartitionedTable::new(2));
        let attrs = Arc::new(AttrStore::new());
        let aggregator = RouteAggregator::new(table.clone(), attrs.clone());

        let aggregate_prefix = Prefix::Inet4("192.168.1.0/24".parse().unwrap());
        let nexthop_ip: IpAddr = "192.168.1.254".parse().unwrap();
        aggregator.add_entry(
            table.clone(),
            AggregateConfig {
                aggregate_prefix: aggregate_prefix.clone(),
                nexthop_ip,
            },
        );

        // Nexthop host route resolves first; no contributor yet, so nothing
        // should be published.
        add_host(&table, &attrs, "192.168.1.254", "2.3.4.5");
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(table.find(&aggregate_prefix).await.is_none());

        // A route outside the aggregate range never contributes.
        add_host(&table, &attrs, "192.168.2.1", "10.0.0.1");
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(table.find(&aggregate_prefix).await.is_none());

        // A contributing route inside the aggregate range publishes it.
        add_host(&table, &attrs, "192.168.1.10", "10.0.0.2");
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let route = table.find(&aggregate_prefix).await.expect("aggregate published");
        let best = route.paths.first().expect("has a path");
        assert_eq!(best.source, PathSource::Aggregate);
        match &best.attr.bgp.nexthop {
            Some(BgpNexthop::Ipv4(addr)) => assert_eq!(*addr, "2.3.4.5".parse::<Ipv4Addr>().unwrap()),
            other => panic!("unexpected nexthop: {other:?}"),
        }

        // Removing the only contributor withdraws the aggregate.
        delete_host(&table, "192.168.1.10");
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(table.find(&aggregate_prefix).await.is_none());
    }

    /// An infeasible nexthop best path must publish the same as an
    /// unresolved nexthop -- a `ResolveNexthop`, infeasible aggregate --
    /// not a feasible one copying the infeasible path's attributes.
    #[tokio::test]
    async fn aggregate_with_infeasible_nexthop_best_path_is_unresolved() {
        let table = Arc::new(PartitionedTable::new(2));
        let attrs = Arc::new(AttrStore::new());
        let aggregator = RouteAggregator::new(table.clone(), attrs.clone());

        let aggregate_prefix = Prefix::Inet4("192.168.1.0/24".parse().unwrap());
        let nexthop_ip: IpAddr = "192.168.1.254".parse().unwrap();
        aggregator.add_entry(
            table.clone(),
            AggregateConfig {
                aggregate_prefix: aggregate_prefix.clone(),
                nexthop_ip,
            },
        );

        add_host(&table, &attrs, "192.168.1.10", "10.0.0.2");
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(table.find(&aggregate_prefix).await.is_none());

        let mut bgp = BgpAttr::new();
        bgp.nexthop = Some(BgpNexthop::Ipv4("2.3.4.5".parse::<Ipv4Addr>().unwrap()));
        let attr = attrs.intern(PathAttr::new(bgp));
        table.enqueue(TableRequest::Add {
            key: Prefix::host4("192.168.1.254".parse().unwrap()),
            update: PathUpdate {
                peer: peer("192.0.2.1"),
                source: PathSource::Bgp,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::POLICY_REJECT,
            },
        });
        table.barrier().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let route = table.find(&aggregate_prefix).await.expect("aggregate published unresolved");
        let best = route.paths.first().expect("has a path");
        assert_eq!(best.source, PathSource::Aggregate);
        assert!(!best.is_feasible(), "aggregate must be infeasible when the nexthop best path is infeasible");
        assert!(best.flags.contains(PathFlags::RESOLVE_NEXTHOP));
    }
}
