//! One XMPP agent channel: per-connection state, the defer queue, and
//! route-target advertisement bookkeeping. Wire framing
//! and the transport itself are out of scope; `AgentMsg` is the
//! decoded event stream a transport layer feeds in.
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use bgp_packet::{BgpAttr, BgpNexthop};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::rib::attr::{AttrStore, PathAttr};
use crate::rib::instance::{InstanceDirectory, MASTER_INSTANCE};
use crate::rib::partition::{PathUpdate, TableRequest};
use crate::rib::path::{PathFlags, PathSource, PeerId};
use crate::rib::prefix::{Family, Prefix};
use crate::rib::rtgroup::RouteTarget;
use crate::rib::{RibRequest, instance::InstanceSnapshot};

use super::message::{ItemBody, ItemKey, PublishMsg, SubscribeMsg, UnsubscribeMsg, WithdrawMsg};
use super::state::{Action, TableSubscription};

/// A pending VRF-level request the channel hasn't been able to act on yet
/// because the instance doesn't exist.
#[derive(Debug, Clone)]
enum PendingVrf {
    Subscribe(i32),
    Unsubscribe,
}

/// A deferred table request, queued FIFO per `(vrf, family)` while that
/// table's subscription is still `Registering` or the instance itself
/// doesn't exist yet.
#[derive(Debug, Clone)]
enum Deferred {
    Add { key: Prefix, body: DeferredBody },
    Delete { key: Prefix },
}

#[derive(Debug, Clone)]
struct DeferredBody {
    nexthop: IpAddr,
    label: u32,
}

/// Events a transport layer (out of scope) feeds into one agent channel.
#[derive(Debug, Clone)]
pub enum AgentMsg {
    Subscribe(SubscribeMsg),
    Unsubscribe(UnsubscribeMsg),
    Publish(PublishMsg),
    Withdraw(WithdrawMsg),
    /// Routing-instance lifecycle callback: an instance this channel has a
    /// pending subscribe for was just created.
    InstanceCreated(String),
    /// An instance's import route-target list changed; re-diff and
    /// re-advertise for any VRF this channel is subscribed to.
    ImportRtsChanged(String, HashSet<RouteTarget>),
    AsnChanged(u32),
    Close { graceful_restart: bool },
}

pub struct AgentChannelHandle {
    pub tx: UnboundedSender<AgentMsg>,
}

/// Per-agent channel state. One of these exists per connected compute-node
/// agent; `peer` is this agent's stable identity across every table it
/// touches.
pub struct AgentChannel {
    peer: PeerId,
    local_asn: u32,
    directory: InstanceDirectory,
    attrs: Arc<AttrStore>,
    request_tx: UnboundedSender<RibRequest>,
    tables: HashMap<(String, Family), TableSubscription>,
    vrf_pending: HashMap<String, PendingVrf>,
    defer_q: HashMap<(String, Family), VecDeque<Deferred>>,
    advertised_rts: HashMap<String, HashSet<RouteTarget>>,
    /// Prefixes this agent has successfully installed, per `(vrf, family)`,
    /// so `close` can withdraw exactly what it added without a table scan.
    published: HashMap<(String, Family), HashSet<Prefix>>,
    closing: bool,
}

impl AgentChannel {
    pub fn new(
        peer: PeerId,
        local_asn: u32,
        directory: InstanceDirectory,
        attrs: Arc<AttrStore>,
        request_tx: UnboundedSender<RibRequest>,
    ) -> Self {
        AgentChannel {
            peer,
            local_asn,
            directory,
            attrs,
            request_tx,
            tables: HashMap::new(),
            vrf_pending: HashMap::new(),
            defer_q: HashMap::new(),
            advertised_rts: HashMap::new(),
            published: HashMap::new(),
            closing: false,
        }
    }

    fn snapshot(&self, vrf: &str) -> Option<InstanceSnapshot> {
        self.directory.read().expect("instance directory poisoned").get(vrf).cloned()
    }

    fn non_replication_families(snapshot: &InstanceSnapshot) -> impl Iterator<Item = Family> + '_ {
        snapshot
            .tables
            .keys()
            .copied()
            .filter(|f| !matches!(f, Family::L3Vpn4 | Family::L3Vpn6 | Family::RouteTarget))
    }

    pub fn handle_subscribe(&mut self, msg: SubscribeMsg) {
        let SubscribeMsg { vrf, instance_id } = msg;
        let Some(snapshot) = self.snapshot(&vrf) else {
            debug!(%vrf, "subscribe for unknown instance, deferred");
            self.vrf_pending.insert(vrf, PendingVrf::Subscribe(instance_id));
            return;
        };
        self.vrf_pending.remove(&vrf);

        let families: Vec<Family> = Self::non_replication_families(&snapshot).collect();
        for family in families {
            self.begin_subscribe(&vrf, family);
        }
        self.advertise_rts(&vrf, &snapshot.import_rts);
    }

    fn begin_subscribe(&mut self, vrf: &str, family: Family) {
        let key = (vrf.to_string(), family);
        let sub = self.tables.entry(key.clone()).or_default();
        match sub.subscribe() {
            Action::BeginRegister => self.complete_register(&key),
            _ => {}
        }
    }

    /// The membership manager's registration is synchronous in this
    /// implementation (there is no external registration RPC to await);
    /// the state machine still runs through `Registering` so the
    /// chained-subscribe/unsubscribe discipline is exercised uniformly,
    /// not special-cased for the fast path.
    fn complete_register(&mut self, key: &(String, Family)) {
        let Some(sub) = self.tables.get_mut(key) else { return };
        match sub.register_done() {
            Action::BeginUnregister => self.complete_unregister(key),
            Action::Noop => self.drain_defer_queue(key),
            Action::Unreachable => warn!(vrf = %key.0, family = ?key.1, "register-done in an unexpected state"),
            _ => {}
        }
    }

    fn complete_unregister(&mut self, key: &(String, Family)) {
        let Some(sub) = self.tables.get_mut(key) else { return };
        match sub.unregister_done() {
            Action::BeginRegister => self.complete_register(key),
            Action::SettledIdle => {
                self.defer_q.remove(key);
                self.tables.remove(key);
            }
            Action::Unreachable => warn!(vrf = %key.0, family = ?key.1, "unregister-done in an unexpected state"),
            _ => {}
        }
    }

    pub fn handle_unsubscribe(&mut self, msg: UnsubscribeMsg) {
        let UnsubscribeMsg { vrf } = msg;
        if self.vrf_pending.remove(&vrf).is_some() {
            self.defer_q.retain(|(v, _), _| v != &vrf);
        }

        let keys: Vec<(String, Family)> = self.tables.keys().filter(|(v, _)| v == &vrf).cloned().collect();
        for key in keys {
            if let Some(sub) = self.tables.get_mut(&key) {
                match sub.unsubscribe() {
                    Action::BeginUnregister => self.complete_unregister(&key),
                    _ => {}
                }
            }
        }

        self.advertised_rts.remove(&vrf);
        self.withdraw_rts_for(&vrf);
        self.published.retain(|(v, _), _| v != &vrf);
    }

    fn drain_defer_queue(&mut self, key: &(String, Family)) {
        let Some(queue) = self.defer_q.remove(key) else { return };
        for item in queue {
            self.apply(&key.0, key.1, item);
        }
    }

    pub fn handle_publish(&mut self, msg: PublishMsg) {
        let PublishMsg { vrf, body } = msg;
        let family = body.family();
        let key = body.key();
        self.route(vrf, family, Deferred::Add { key, body: DeferredBody { nexthop: body.nexthop(), label: body.label() } });
    }

    pub fn handle_withdraw(&mut self, msg: WithdrawMsg) {
        let WithdrawMsg { vrf, key } = msg;
        let family = key.family();
        let prefix = key.prefix();
        self.route(vrf, family, Deferred::Delete { key: prefix });
    }

    /// Common gating for publish/withdraw: unknown vrf defers on the
    /// vrf-pending path (piggybacked here onto the per-table defer queue,
    /// flushed the same way once registration completes); a known vrf with
    /// no subscription for this table is a membership mismatch and is
    /// dropped; `Registering` defers; `Unregistering` drops as a protocol
    /// policy error; `Registered` applies immediately.
    fn route(&mut self, vrf: String, family: Family, item: Deferred) {
        if self.snapshot(&vrf).is_none() {
            debug!(%vrf, ?family, "publish/withdraw for unknown vrf, deferred");
            self.defer_q.entry((vrf, family)).or_default().push_back(item);
            return;
        }

        let key = (vrf.clone(), family);
        match self.tables.get(&key).map(|s| s.state()) {
            Some(super::state::TableState::Registered) => self.apply(&vrf, family, item),
            Some(super::state::TableState::Registering) => {
                self.defer_q.entry(key).or_default().push_back(item);
            }
            Some(super::state::TableState::Unregistering) => {
                warn!(%vrf, ?family, "route update for a table under unregister, dropped");
            }
            Some(super::state::TableState::Idle) | None => {
                warn!(%vrf, ?family, "route update for a table the agent is not subscribed to, dropped");
            }
        }
    }

    fn apply(&mut self, vrf: &str, family: Family, item: Deferred) {
        match item {
            Deferred::Add { key, body } => {
                let mut bgp = BgpAttr::new();
                bgp.nexthop = Some(match body.nexthop {
                    IpAddr::V4(v4) => BgpNexthop::Ipv4(v4),
                    IpAddr::V6(_) => BgpNexthop::Evpn(body.nexthop),
                });
                let attr = self.attrs.intern(PathAttr::new(bgp));
                let _ = self.request_tx.send(RibRequest {
                    instance: vrf.to_string(),
                    family,
                    request: TableRequest::Add {
                        key: key.clone(),
                        update: PathUpdate {
                            peer: self.peer,
                            source: PathSource::Xmpp,
                            path_id: 0,
                            attr,
                            label: body.label,
                            flags: PathFlags::empty(),
                        },
                    },
                });
                self.published.entry((vrf.to_string(), family)).or_default().insert(key);
            }
            Deferred::Delete { key } => {
                let _ = self.request_tx.send(RibRequest {
                    instance: vrf.to_string(),
                    family,
                    request: TableRequest::Delete {
                        key: key.clone(),
                        peer: self.peer.address,
                        path_id: 0,
                    },
                });
                if let Some(set) = self.published.get_mut(&(vrf.to_string(), family)) {
                    set.remove(&key);
                }
            }
        }
    }

    fn enqueue_rt(&self, rt: RouteTarget, add: bool) {
        let prefix = Prefix::RouteTarget { origin_as: self.local_asn, rt: rt.val };
        let request = if add {
            let attr = self.attrs.intern(PathAttr::new(BgpAttr::new()));
            TableRequest::Add {
                key: prefix,
                update: PathUpdate {
                    peer: self.peer,
                    source: PathSource::Xmpp,
                    path_id: 0,
                    attr,
                    label: 0,
                    flags: PathFlags::empty(),
                },
            }
        } else {
            TableRequest::Delete { key: prefix, peer: self.peer.address, path_id: 0 }
        };
        let _ = self.request_tx.send(RibRequest {
            instance: MASTER_INSTANCE.to_string(),
            family: Family::RouteTarget,
            request,
        });
    }

    fn advertise_rts(&mut self, vrf: &str, import_rts: &HashSet<RouteTarget>) {
        let previous = self.advertised_rts.get(vrf).cloned().unwrap_or_default();
        for rt in import_rts.difference(&previous) {
            self.enqueue_rt(*rt, true);
        }
        for rt in previous.difference(import_rts) {
            self.enqueue_rt(*rt, false);
        }
        self.advertised_rts.insert(vrf.to_string(), import_rts.clone());
    }

    fn withdraw_rts_for(&mut self, vrf: &str) {
        if let Some(rts) = self.advertised_rts.remove(vrf) {
            for rt in rts {
                self.enqueue_rt(rt, false);
            }
        }
    }

    /// Routing-instance lifecycle callback: a vrf this channel had a
    /// pending subscribe for now exists.
    pub fn on_instance_created(&mut self, vrf: &str) {
        if let Some(PendingVrf::Subscribe(instance_id)) = self.vrf_pending.remove(vrf) {
            self.handle_subscribe(SubscribeMsg { vrf: vrf.to_string(), instance_id });
        }
    }

    /// An instance's import route-target list changed; re-diff and issue
    /// the delta if this channel is currently advertising for that vrf.
    pub fn on_import_rts_changed(&mut self, vrf: &str, import_rts: HashSet<RouteTarget>) {
        if self.advertised_rts.contains_key(vrf) {
            self.advertise_rts(vrf, &import_rts);
        }
    }

    /// On an ASN change, withdraw every advertised RT route under the old
    /// AS, then re-advertise all of them under the new one.
    pub fn change_local_asn(&mut self, new_asn: u32) {
        if new_asn == self.local_asn {
            return;
        }
        for rts in self.advertised_rts.values() {
            for rt in rts {
                let prefix = Prefix::RouteTarget { origin_as: self.local_asn, rt: rt.val };
                let _ = self.request_tx.send(RibRequest {
                    instance: MASTER_INSTANCE.to_string(),
                    family: Family::RouteTarget,
                    request: TableRequest::Delete { key: prefix, peer: self.peer.address, path_id: 0 },
                });
            }
        }
        self.local_asn = new_asn;
        let advertised = self.advertised_rts.clone();
        for rts in advertised.values() {
            for rt in rts {
                self.enqueue_rt(*rt, true);
            }
        }
    }

    /// Close semantics. Graceful restart retention of the peer's
    /// routes as Stale is the responsibility of the (out-of-scope)
    /// peer-close manager; this channel's contribution is to stop issuing
    /// new requests and, when restart isn't in effect, withdraw what it
    /// installed.
    /// Idempotent: a second close arriving while the channel is already
    /// in the closing/stale state is dropped rather than re-clearing
    /// already-withdrawn state or re-sending withdrawals.
    pub fn close(&mut self, graceful_restart: bool) {
        if self.closing {
            warn!(peer = %self.peer.address, "duplicate channel close ignored");
            return;
        }
        self.closing = true;
        self.vrf_pending.clear();
        self.defer_q.clear();

        if graceful_restart {
            debug!(peer = %self.peer.address, "graceful restart: retaining installed routes as stale");
        } else {
            for ((vrf, family), prefixes) in self.published.drain() {
                for key in prefixes {
                    let _ = self.request_tx.send(RibRequest {
                        instance: vrf.clone(),
                        family,
                        request: TableRequest::Delete { key, peer: self.peer.address, path_id: 0 },
                    });
                }
            }
        }

        let vrfs: Vec<String> = self.advertised_rts.keys().cloned().collect();
        for vrf in vrfs {
            self.withdraw_rts_for(&vrf);
        }
        self.tables.clear();
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

pub fn channel() -> (UnboundedSender<AgentMsg>, UnboundedReceiver<AgentMsg>) {
    mpsc::unbounded_channel()
}

pub async fn event_loop(mut channel: AgentChannel, mut rx: UnboundedReceiver<AgentMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            AgentMsg::Subscribe(msg) => channel.handle_subscribe(msg),
            AgentMsg::Unsubscribe(msg) => channel.handle_unsubscribe(msg),
            AgentMsg::Publish(msg) => channel.handle_publish(msg),
            AgentMsg::Withdraw(msg) => channel.handle_withdraw(msg),
            AgentMsg::InstanceCreated(vrf) => channel.on_instance_created(&vrf),
            AgentMsg::ImportRtsChanged(vrf, rts) => channel.on_import_rts_changed(&vrf, rts),
            AgentMsg::AsnChanged(asn) => channel.change_local_asn(asn),
            AgentMsg::Close { graceful_restart } => {
                channel.close(graceful_restart);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::instance::InstanceRegistry;
    use bgp_packet::ExtCommunityValue;
    use std::sync::RwLock;

    fn peer(addr: &str) -> PeerId {
        PeerId {
            router_id: 1,
            address: addr.parse::<IpAddr>().unwrap(),
            is_ebgp: false,
            peer_as: 65001,
        }
    }

    fn test_directory_with_vrf(name: &str) -> (InstanceDirectory, UnboundedReceiver<RibRequest>) {
        let attrs = Arc::new(AttrStore::new());
        let mut registry = InstanceRegistry::new(attrs);
        let rd = bgp_packet::RouteDistinguisher::new_asn(65000, 1);
        registry.create_vrf(name, rd, Family::Inet4, Family::L3Vpn4, HashSet::new(), HashSet::new());
        let directory = registry.directory();
        let (_tx, rx) = mpsc::unbounded_channel();
        (directory, rx)
    }

    #[test]
    fn subscribe_to_unknown_vrf_is_deferred() {
        let attrs = Arc::new(AttrStore::new());
        let directory: InstanceDirectory = Arc::new(RwLock::new(HashMap::new()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut channel = AgentChannel::new(peer("10.0.0.1"), 65001, directory, attrs, tx);
        channel.handle_subscribe(SubscribeMsg { vrf: "blue".into(), instance_id: 1 });
        assert!(matches!(channel.vrf_pending.get("blue"), Some(PendingVrf::Subscribe(1))));
    }

    #[tokio::test]
    async fn subscribe_to_known_vrf_registers_and_advertises_rt() {
        let attrs = Arc::new(AttrStore::new());
        let mut registry = InstanceRegistry::new(attrs.clone());
        let rd = bgp_packet::RouteDistinguisher::new_asn(65000, 1);
        let import_rt = ExtCommunityValue { high_type: 0x00, low_type: 0x02, val: [0, 0, 0, 0, 0, 9] };
        registry.create_vrf(
            "blue",
            rd,
            Family::Inet4,
            Family::L3Vpn4,
            HashSet::from([import_rt]),
            HashSet::new(),
        );
        let directory = registry.directory();
        let (tx, mut rib_rx) = mpsc::unbounded_channel();
        let mut channel = AgentChannel::new(peer("10.0.0.1"), 65001, directory, attrs, tx);
        channel.handle_subscribe(SubscribeMsg { vrf: "blue".into(), instance_id: 7 });
        assert!(channel.vrf_pending.is_empty());
        assert_eq!(channel.tables.get(&("blue".to_string(), Family::Inet4)).map(|s| s.state()), Some(super::super::state::TableState::Registered));

        let mut saw_rt_advertisement = false;
        while let Ok(req) = rib_rx.try_recv() {
            if req.instance == MASTER_INSTANCE
                && req.family == Family::RouteTarget
                && matches!(&req.request, TableRequest::Add { key: Prefix::RouteTarget { rt, .. }, .. } if *rt == import_rt.val)
            {
                saw_rt_advertisement = true;
            }
        }
        assert!(saw_rt_advertisement, "expected a route-target advertisement for the vrf's import rt");
    }

    #[test]
    fn publish_for_unsubscribed_table_is_dropped_not_deferred() {
        let (directory, _rx) = test_directory_with_vrf("blue");
        let attrs = Arc::new(AttrStore::new());
        let (tx, mut rib_rx) = mpsc::unbounded_channel();
        let mut channel = AgentChannel::new(peer("10.0.0.1"), 65001, directory, attrs, tx);

        channel.handle_publish(PublishMsg {
            vrf: "blue".into(),
            body: ItemBody::Unicast(super::super::message::ItemType {
                prefix: "10.2.1.3/32".parse().unwrap(),
                nexthop: "192.0.2.9".parse().unwrap(),
                label: 100,
                communities: vec![],
                ext_communities: vec![],
            }),
        });
        assert!(rib_rx.try_recv().is_err());
    }

    #[test]
    fn publish_before_instance_exists_then_created_flushes_defer_queue() {
        let attrs = Arc::new(AttrStore::new());
        let mut registry = InstanceRegistry::new(attrs.clone());
        let directory = registry.directory();
        let (tx, mut rib_rx) = mpsc::unbounded_channel();
        let mut channel = AgentChannel::new(peer("10.0.0.1"), 65001, directory, attrs, tx);

        channel.handle_subscribe(SubscribeMsg { vrf: "blue".into(), instance_id: 1 });
        channel.handle_publish(PublishMsg {
            vrf: "blue".into(),
            body: ItemBody::Unicast(super::super::message::ItemType {
                prefix: "10.2.1.3/32".parse().unwrap(),
                nexthop: "192.0.2.9".parse().unwrap(),
                label: 0,
                communities: vec![],
                ext_communities: vec![],
            }),
        });
        assert!(rib_rx.try_recv().is_err());

        let rd = bgp_packet::RouteDistinguisher::new_asn(65000, 1);
        registry.create_vrf("blue", rd, Family::Inet4, Family::L3Vpn4, HashSet::new(), HashSet::new());
        channel.on_instance_created("blue");

        let mut found = false;
        while let Ok(req) = rib_rx.try_recv() {
            if req.instance == "blue" && matches!(req.request, TableRequest::Add { .. }) {
                found = true;
            }
        }
        assert!(found);
    }
}
