//! Partitioned table.
//!
//! A table is sharded into `N` partitions, each owned by its own tokio
//! task -- the same "one task per shard, communicate over a channel"
//! pattern this codebase's `rib::inst::Rib` and `bgp::inst::Bgp` use for
//! their own event loops, generalized from one task per subsystem to one
//! task per partition so that unrelated prefixes never serialize behind
//! each other.
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::attr::PathAttr;
use super::path::{Path, PathFlags, PeerId, PathSource};
use super::prefix::{partition_of, Prefix};
use super::table::{ChangeKind, ListenerFn, ListenerId, ListenerRegistry, RouteEntry, RouteSnapshot};

/// A path producer as it arrives at the table boundary.
#[derive(Debug, Clone)]
pub struct PathUpdate {
    pub peer: PeerId,
    pub source: PathSource,
    pub path_id: u32,
    pub attr: Arc<PathAttr>,
    pub label: u32,
    pub flags: PathFlags,
}

/// A table request: `{op: Add|Delete, key, peer_id, path_id, attrs, label, flags}`.
#[derive(Debug)]
pub enum TableRequest {
    Add { key: Prefix, update: PathUpdate },
    Delete { key: Prefix, peer: IpAddr, path_id: u32 },
}

enum PartitionMsg {
    Request(TableRequest),
    Find(Prefix, oneshot::Sender<Option<RouteSnapshot>>),
    /// Walk every route in this partition once and report it via
    /// `notify_match_deletion`-style full-table callback, used when a
    /// predicate match is withdrawn or an RT-group transitions
    /// empty<->non-empty and the shared VPN table needs a full rescan
    ///.
    Rescan(Arc<ListenerFn>),
    /// Synchronization barrier: the partition acknowledges after draining
    /// every message enqueued before this one, used by match unregister
    /// to know "every partition task has observed the removal".
    Barrier(oneshot::Sender<()>),
}

struct PartitionWorker {
    routes: HashMap<Prefix, RouteEntry>,
    listeners: Arc<ListenerRegistry>,
    partition_id: usize,
}

impl PartitionWorker {
    fn handle_request(&mut self, req: TableRequest) {
        let (key, outcome) = match req {
            TableRequest::Add { key, update } => {
                let entry = self
                    .routes
                    .entry(key.clone())
                    .or_insert_with(|| RouteEntry::new(key.clone()));
                let mut path = Path::new(update.peer, update.source, update.path_id, update.attr);
                path.label = update.label;
                path.flags = update.flags;
                (key, entry.upsert_path(path))
            }
            TableRequest::Delete { key, peer, path_id } => {
                let Some(entry) = self.routes.get_mut(&key) else {
                    trace!(%key, "delete for unknown route, ignored");
                    return;
                };
                match entry.remove_path(peer, path_id) {
                    Some(outcome) => (key, outcome),
                    None => return,
                }
            }
        };

        let is_delete = outcome == ChangeKind::Deleted;
        if let Some(entry) = self.routes.get(&key) {
            let snapshot = RouteSnapshot::from(entry);
            self.listeners.notify(self.partition_id, &snapshot, is_delete);
        }
        if is_delete {
            // Physically remove now that the delete notification has been
            // delivered to listeners.
            self.routes.remove(&key);
        }
    }

    fn handle_rescan(&self, listener: Arc<ListenerFn>) {
        for entry in self.routes.values() {
            let snapshot = RouteSnapshot::from(entry);
            (listener)(self.partition_id, &snapshot, false);
        }
    }
}

/// A table's N-way sharded route map plus its shared listener registry.
pub struct PartitionedTable {
    senders: Vec<mpsc::UnboundedSender<PartitionMsg>>,
    listeners: Arc<ListenerRegistry>,
}

impl PartitionedTable {
    pub fn new(n_partitions: usize) -> Self {
        assert!(n_partitions > 0, "a table must have at least one partition");
        let listeners = Arc::new(ListenerRegistry::new());
        let mut senders = Vec::with_capacity(n_partitions);
        for partition_id in 0..n_partitions {
            let (tx, mut rx) = mpsc::unbounded_channel::<PartitionMsg>();
            let mut worker = PartitionWorker {
                routes: HashMap::new(),
                listeners: listeners.clone(),
                partition_id,
            };
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    match msg {
                        PartitionMsg::Request(req) => worker.handle_request(req),
                        PartitionMsg::Find(key, reply) => {
                            let snapshot = worker.routes.get(&key).map(RouteSnapshot::from);
                            let _ = reply.send(snapshot);
                        }
                        PartitionMsg::Rescan(listener) => worker.handle_rescan(listener),
                        PartitionMsg::Barrier(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            });
            senders.push(tx);
        }
        PartitionedTable { senders, listeners }
    }

    pub fn n_partitions(&self) -> usize {
        self.senders.len()
    }

    /// Never blocks and never fails from the caller's perspective; the
    /// effect is observed only via a registered listener.
    pub fn enqueue(&self, request: TableRequest) {
        let key = match &request {
            TableRequest::Add { key, .. } => key,
            TableRequest::Delete { key, .. } => key,
        };
        let partition = partition_of(key, self.senders.len());
        // An unbounded sender only fails if the worker task panicked; the
        // table interface promises enqueue always succeeds, so a failure
        // here is a programming bug elsewhere, not a caller-visible error.
        let _ = self.senders[partition].send(PartitionMsg::Request(request));
    }

    /// Looks up one route by key.
    pub async fn find(&self, key: &Prefix) -> Option<RouteSnapshot> {
        let partition = partition_of(key, self.senders.len());
        let (tx, rx) = oneshot::channel();
        self.senders[partition].send(PartitionMsg::Find(key.clone(), tx)).ok()?;
        rx.await.ok().flatten()
    }

    pub fn register_listener(&self, f: impl Fn(usize, &RouteSnapshot, bool) + Send + Sync + 'static) -> ListenerId {
        self.listeners.register(Arc::new(f))
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        self.listeners.unregister(id);
    }

    /// Ask every partition to walk its routes once and invoke `listener`
    /// directly (bypassing the registry), used for RT-group rescans and
    /// match-deletion final sweeps.
    pub async fn rescan(&self, listener: Arc<ListenerFn>) {
        let mut acks = Vec::with_capacity(self.senders.len());
        for sender in &self.senders {
            let _ = sender.send(PartitionMsg::Rescan(listener.clone()));
            let (tx, rx) = oneshot::channel();
            let _ = sender.send(PartitionMsg::Barrier(tx));
            acks.push(rx);
        }
        for ack in acks {
            let _ = ack.await;
        }
    }

    /// Blocks until every partition task has drained messages enqueued
    /// before this call -- used by `unregister_match` to know the
    /// removal has been observed everywhere before firing its completion
    /// callback.
    pub async fn barrier(&self) {
        let mut acks = Vec::with_capacity(self.senders.len());
        for sender in &self.senders {
            let (tx, rx) = oneshot::channel();
            let _ = sender.send(PartitionMsg::Barrier(tx));
            acks.push(rx);
        }
        for ack in acks {
            let _ = ack.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::attr::PathAttr;
    use bgp_packet::BgpAttr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer(addr: &str) -> PeerId {
        PeerId {
            router_id: 1,
            address: addr.parse::<IpAddr>().unwrap(),
            is_ebgp: false,
            peer_as: 1,
        }
    }

    #[tokio::test]
    async fn add_then_find() {
        let table = PartitionedTable::new(4);
        let key = Prefix::Inet4("10.1.1.1/32".parse().unwrap());
        let attr = Arc::new(PathAttr::new(BgpAttr::new()));
        table.enqueue(TableRequest::Add {
            key: key.clone(),
            update: PathUpdate {
                peer: peer("192.0.2.1"),
                source: PathSource::Bgp,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::empty(),
            },
        });
        table.barrier().await;
        let found = table.find(&key).await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().paths.len(), 1);
    }

    #[tokio::test]
    async fn listener_sees_add_and_delete() {
        let table = PartitionedTable::new(2);
        let adds = Arc::new(AtomicUsize::new(0));
        let deletes = Arc::new(AtomicUsize::new(0));
        let adds2 = adds.clone();
        let deletes2 = deletes.clone();
        table.register_listener(move |_part, _snap, is_delete| {
            if is_delete {
                deletes2.fetch_add(1, Ordering::SeqCst);
            } else {
                adds2.fetch_add(1, Ordering::SeqCst);
            }
        });

        let key = Prefix::Inet4("10.2.2.2/32".parse().unwrap());
        let attr = Arc::new(PathAttr::new(BgpAttr::new()));
        let p = peer("192.0.2.9");
        table.enqueue(TableRequest::Add {
            key: key.clone(),
            update: PathUpdate {
                peer: p,
                source: PathSource::Bgp,
                path_id: 0,
                attr,
                label: 0,
                flags: PathFlags::empty(),
            },
        });
        table.enqueue(TableRequest::Delete {
            key: key.clone(),
            peer: p.address,
            path_id: 0,
        });
        table.barrier().await;

        assert_eq!(adds.load(Ordering::SeqCst), 1);
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
        assert!(table.find(&key).await.is_none());
    }
}
