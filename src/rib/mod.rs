//! Routing-core entry point: the routing-instance registry, its
//! configuration ingestion, and the channel external producers (BGP peer
//! decode, the XMPP agent channel) push table requests through.
pub mod aggregate;
pub mod attr;
pub mod bestpath;
pub mod condition;
pub mod ingest;
pub mod instance;
pub mod partition;
pub mod path;
pub mod prefix;
pub mod replication;
pub mod rtgroup;
pub mod static_route;
pub mod table;

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::config::{ConfigChannel, ConfigOp, ConfigRequest};
use crate::policy::PolicyConfig;

use self::attr::AttrStore;
use self::ingest::RibConfig;
use self::instance::{InstanceDirectory, InstanceRegistry};
use self::partition::TableRequest;
use self::prefix::Family;
use self::rtgroup::RtGroupManager;

/// A table request tagged with the routing instance and family it targets,
/// the shape inbound BGP-decoded and XMPP-decoded updates take once they
/// cross into this core.
#[derive(Debug)]
pub struct RibRequest {
    pub instance: String,
    pub family: Family,
    pub request: TableRequest,
}

pub struct RibApiChannel {
    pub tx: UnboundedSender<RibRequest>,
    pub rx: UnboundedReceiver<RibRequest>,
}

impl RibApiChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        RibApiChannel { tx, rx }
    }
}

impl Default for RibApiChannel {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Rib {
    pub cm: ConfigChannel,
    pub api: RibApiChannel,
    pub registry: InstanceRegistry,
    pub policy: Arc<std::sync::Mutex<PolicyConfig>>,
    config: RibConfig,
}

impl Rib {
    /// `policy` is the shared, committed policy table the import chain
    /// reads from; it is owned by `policy::Policy` and handed in here so
    /// both tasks see the same committed state.
    pub fn new(policy: Arc<std::sync::Mutex<PolicyConfig>>) -> anyhow::Result<Self> {
        let attrs = Arc::new(AttrStore::new());
        let mut registry = InstanceRegistry::new(attrs);
        registry.ensure_rtarget_table();
        Ok(Rib {
            cm: ConfigChannel::new(),
            api: RibApiChannel::new(),
            registry,
            policy,
            config: RibConfig::new(),
        })
    }

    async fn process_cm_msg(&mut self, msg: ConfigRequest) {
        match msg.op {
            ConfigOp::Set | ConfigOp::Delete => {
                if let Some(delta) = &msg.delta {
                    self.config.stage(delta);
                }
            }
            ConfigOp::CommitStart => {}
            ConfigOp::CommitEnd => {
                self.config.commit(&mut self.registry);
            }
        }
    }

    /// Applies the destination instance's import policy chain and
    /// enqueues onto its partitioned table for `request.family`. An unknown
    /// instance or a family the instance carries no table for is a
    /// protocol-policy error: drop, counter via the log line, continue --
    /// it never becomes a `Result` crossing this boundary.
    fn process_api_msg(&mut self, msg: RibRequest) {
        let Some(instance) = self.registry.get(&msg.instance) else {
            warn!(instance = %msg.instance, "table request for unknown instance, dropped");
            return;
        };
        let Some(table) = instance.table(msg.family) else {
            warn!(instance = %msg.instance, family = ?msg.family, "table request for family instance does not carry, dropped");
            return;
        };

        let request = match msg.request {
            TableRequest::Add { key, update } => {
                let (prefix_addr, prefix_len) = key.match_key();
                let mut path = path::Path::new(update.peer, update.source, update.path_id, update.attr);
                path.label = update.label;
                path.flags = update.flags;
                let evaluated = crate::policy::apply_chain(
                    &self.policy,
                    &instance.import_policies,
                    &path,
                    &prefix_addr,
                    prefix_len,
                    &self.registry.attrs,
                );
                TableRequest::Add {
                    key,
                    update: partition::PathUpdate {
                        peer: evaluated.peer,
                        source: evaluated.source,
                        path_id: evaluated.path_id,
                        attr: evaluated.attr,
                        label: evaluated.label,
                        flags: evaluated.flags,
                    },
                }
            }
            other @ TableRequest::Delete { .. } => other,
        };
        table.enqueue(request);
    }

    pub async fn event_loop(&mut self) {
        loop {
            tokio::select! {
                Some(msg) = self.cm.rx.recv() => {
                    self.process_cm_msg(msg).await;
                }
                Some(msg) = self.api.rx.recv() => {
                    self.process_api_msg(msg);
                }
            }
        }
    }

    /// A read-mostly handle onto instance state, for XMPP's per-connection
    /// channels and the BGP boundary to consult without routing through the
    /// core's own event loop.
    pub fn directory(&self) -> InstanceDirectory {
        self.registry.directory()
    }

    pub fn rtgroups(&self) -> Arc<RtGroupManager> {
        self.registry.rtgroups.clone()
    }

    pub fn attrs(&self) -> Arc<AttrStore> {
        self.registry.attrs.clone()
    }

    /// A sender peer/agent boundaries (BGP, XMPP) submit already-decoded
    /// table requests through.
    pub fn request_tx(&self) -> UnboundedSender<RibRequest> {
        self.api.tx.clone()
    }
}

pub fn serve(mut rib: Rib) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        rib.event_loop().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDelta, ConfigKind, ConfigOp, ConfigRequest};
    use crate::rib::attr::PathAttr;
    use crate::rib::path::{PathFlags, PathSource, PeerId};
    use bgp_packet::BgpAttr;
    use std::net::IpAddr;

    fn peer(addr: &str) -> PeerId {
        PeerId {
            router_id: 1,
            address: addr.parse::<IpAddr>().unwrap(),
            is_ebgp: true,
            peer_as: 65001,
        }
    }

    #[tokio::test]
    async fn unknown_instance_request_is_dropped_not_fatal() {
        let mut rib = Rib::new(Arc::new(std::sync::Mutex::new(PolicyConfig::new()))).unwrap();
        let attr = rib.registry.attrs.intern(PathAttr::new(BgpAttr::new()));
        rib.process_api_msg(RibRequest {
            instance: "does-not-exist".into(),
            family: Family::Inet4,
            request: TableRequest::Add {
                key: prefix::Prefix::Inet4("10.0.0.0/24".parse().unwrap()),
                update: partition::PathUpdate {
                    peer: peer("192.0.2.1"),
                    source: PathSource::Bgp,
                    path_id: 0,
                    attr,
                    label: 0,
                    flags: PathFlags::empty(),
                },
            },
        });
    }

    #[tokio::test]
    async fn commit_creates_vrf_then_add_request_lands_in_its_table() {
        let mut rib = Rib::new(Arc::new(std::sync::Mutex::new(PolicyConfig::new()))).unwrap();
        let content = serde_json::json!({
            "rd": "65001:1",
            "family": "inet4",
            "import_rts": [],
            "export_rts": [],
        });
        rib.process_cm_msg(ConfigRequest::new(Some(ConfigDelta::set(ConfigKind::RoutingInstance, "vrf-a", content)), ConfigOp::Set)).await;
        rib.process_cm_msg(ConfigRequest::new(None, ConfigOp::CommitEnd)).await;
        assert!(rib.registry.get("vrf-a").is_some());

        let attr = rib.registry.attrs.intern(PathAttr::new(BgpAttr::new()));
        let key = prefix::Prefix::Inet4("10.1.1.0/24".parse().unwrap());
        rib.process_api_msg(RibRequest {
            instance: "vrf-a".into(),
            family: Family::Inet4,
            request: TableRequest::Add {
                key: key.clone(),
                update: partition::PathUpdate {
                    peer: peer("192.0.2.1"),
                    source: PathSource::Bgp,
                    path_id: 0,
                    attr,
                    label: 0,
                    flags: PathFlags::empty(),
                },
            },
        });

        let table = rib.registry.get("vrf-a").unwrap().table(Family::Inet4).unwrap();
        table.barrier().await;
        assert!(table.find(&key).await.is_some());
    }
}
