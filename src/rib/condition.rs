//! Condition listener framework.
//!
//! Lets the aggregator (G) and static-route manager (H) register a
//! predicate against a table and be told about false→true and true→false
//! transitions, without either of them having to track per-prefix state of
//! their own. Built directly on `PartitionedTable`'s listener registry; a
//! match's "currently matching" set is the only state this module owns.
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::partition::PartitionedTable;
use super::prefix::Prefix;
use super::table::{ListenerId, RouteSnapshot};

pub type Predicate = dyn Fn(&RouteSnapshot) -> bool + Send + Sync;
pub type MatchCallback = dyn Fn(&RouteSnapshot) + Send + Sync;

struct Match {
    predicate: Arc<Predicate>,
    on_match: Arc<MatchCallback>,
    on_unmatch: Arc<MatchCallback>,
    matching: Mutex<HashSet<Prefix>>,
}

/// A registered predicate's handle. Dropping this handle does not
/// unregister it -- callers must explicitly `unregister` so they can await
/// the completion callback.
pub struct MatchHandle {
    listener_id: ListenerId,
    state: Arc<Match>,
}

/// Binds the condition-listener framework to one table.
pub struct ConditionListener {
    table: Arc<PartitionedTable>,
}

impl ConditionListener {
    pub fn new(table: Arc<PartitionedTable>) -> Self {
        ConditionListener { table }
    }

    /// Registers `predicate` against the table. `on_match`/`on_unmatch` fire
    /// on the predicate's false→true / true→false transitions,
    /// respectively, evaluated once per route-change notification.
    pub fn register(
        &self,
        predicate: impl Fn(&RouteSnapshot) -> bool + Send + Sync + 'static,
        on_match: impl Fn(&RouteSnapshot) + Send + Sync + 'static,
        on_unmatch: impl Fn(&RouteSnapshot) + Send + Sync + 'static,
    ) -> MatchHandle {
        let state = Arc::new(Match {
            predicate: Arc::new(predicate),
            on_match: Arc::new(on_match),
            on_unmatch: Arc::new(on_unmatch),
            matching: Mutex::new(HashSet::new()),
        });
        let state_for_listener = state.clone();
        let listener_id = self.table.register_listener(move |_partition, snapshot, is_delete| {
            Self::evaluate(&state_for_listener, snapshot, is_delete);
        });
        MatchHandle { listener_id, state }
    }

    fn evaluate(state: &Match, snapshot: &RouteSnapshot, is_delete: bool) {
        let matches_now = !is_delete && (state.predicate)(snapshot);
        let mut matching = state.matching.lock().expect("match set poisoned");
        let was_matching = matching.contains(&snapshot.prefix);
        match (was_matching, matches_now) {
            (false, true) => {
                matching.insert(snapshot.prefix.clone());
                drop(matching);
                (state.on_match)(snapshot);
            }
            (true, false) => {
                matching.remove(&snapshot.prefix);
                drop(matching);
                (state.on_unmatch)(snapshot);
            }
            _ => {}
        }
    }

    /// Walks the table once and calls `on_unmatch` for every route still
    /// in the match's currently-matching set, used when a predicate is
    /// about to be withdrawn.
    pub async fn notify_match_deletion(&self, handle: &MatchHandle) {
        let state = handle.state.clone();
        let listener: Arc<super::table::ListenerFn> = Arc::new(move |_partition, snapshot, _is_delete| {
            let still_matching = state.matching.lock().expect("match set poisoned").contains(&snapshot.prefix);
            if still_matching {
                (state.on_unmatch)(snapshot);
            }
        });
        self.table.rescan(listener).await;
        handle.state.matching.lock().expect("match set poisoned").clear();
    }

    /// Removes a match's listener and waits for every partition task to
    /// have observed the removal before returning, so a caller can
    /// immediately destroy the table afterward.
    pub async fn unregister(&self, handle: MatchHandle) {
        self.table.unregister_listener(handle.listener_id);
        self.table.barrier().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::attr::{AttrStore, PathAttr};
    use crate::rib::partition::{PathUpdate, TableRequest};
    use crate::rib::path::{PathFlags, PathSource, PeerId};
    use bgp_packet::BgpAttr;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer() -> PeerId {
        PeerId {
            router_id: 1,
            address: "10.0.0.1".parse::<IpAddr>().unwrap(),
            is_ebgp: false,
            peer_as: 1,
        }
    }

    #[tokio::test]
    async fn match_and_unmatch_fire_on_transition() {
        let table = Arc::new(PartitionedTable::new(2));
        let listener = ConditionListener::new(table.clone());
        let matches = Arc::new(AtomicUsize::new(0));
        let unmatches = Arc::new(AtomicUsize::new(0));
        let m2 = matches.clone();
        let u2 = unmatches.clone();

        let handle = listener.register(
            |snap| snap.prefix == Prefix::Inet4("10.9.9.9/32".parse().unwrap()),
            move |_| {
                m2.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                u2.fetch_add(1, Ordering::SeqCst);
            },
        );

        let attrs = AttrStore::new();
        let key = Prefix::Inet4("10.9.9.9/32".parse().unwrap());
        let attr = attrs.intern(PathAttr::new(BgpAttr::new()));
        table.enqueue(TableRequest::Add {
            key: key.clone(),
            update: PathUpdate {
                peer: peer(),
                source: PathSource::Bgp,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::empty(),
            },
        });
        table.barrier().await;
        assert_eq!(matches.load(Ordering::SeqCst), 1);

        table.enqueue(TableRequest::Delete {
            key,
            peer: peer().address,
            path_id: 0,
        });
        table.barrier().await;
        assert_eq!(unmatches.load(Ordering::SeqCst), 1);

        listener.unregister(handle).await;
    }
}
