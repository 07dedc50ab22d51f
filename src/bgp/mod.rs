//! BGP-facing boundary of the routing core.
//!
//! Peer I/O and the BGP finite-state machine live outside this crate;
//! what crosses into here is already-decoded peer updates, handed
//! to `submit` and forwarded as table requests into the instance they
//! target. `bgp-router`/`bgp-peering`/`global-system-config` deltas are
//! consumed by that external peer layer, not by the routing core itself,
//! so this module's only job with them is to observe and log.

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::config::{ConfigChannel, ConfigOp, ConfigRequest};
use crate::rib::partition::TableRequest;
use crate::rib::prefix::Family;
use crate::rib::{RibApiChannel, RibRequest};

pub struct Bgp {
    pub cm: ConfigChannel,
    tx: UnboundedSender<RibRequest>,
}

impl Bgp {
    pub fn new(tx: UnboundedSender<RibRequest>) -> Self {
        Bgp { cm: ConfigChannel::new(), tx }
    }

    /// Wires this `Bgp` instance directly off a `RibApiChannel`'s sender,
    /// the shape `main` constructs it with.
    pub fn attached_to(api: &RibApiChannel) -> Self {
        Self::new(api.tx.clone())
    }

    /// Forwards one decoded peer update for `instance`/`family` into the
    /// routing core. Never blocks and never surfaces a failure to the
    /// caller: the only way the send fails is the routing core task
    /// having already shut down.
    pub fn submit(&self, instance: impl Into<String>, family: Family, request: TableRequest) {
        let _ = self.tx.send(RibRequest {
            instance: instance.into(),
            family,
            request,
        });
    }

    async fn process_cm_msg(&mut self, msg: ConfigRequest) {
        if let ConfigOp::Set | ConfigOp::Delete = msg.op {
            if let Some(delta) = &msg.delta {
                debug!(kind = %delta.kind, name = %delta.name, "bgp-scoped config delta recorded for the peer layer");
            }
        }
    }

    pub async fn event_loop(&mut self) {
        loop {
            tokio::select! {
                Some(msg) = self.cm.rx.recv() => {
                    self.process_cm_msg(msg).await;
                }
            }
        }
    }
}

pub fn serve(mut bgp: Bgp) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        bgp.event_loop().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::attr::{AttrStore, PathAttr};
    use crate::rib::partition::PathUpdate;
    use crate::rib::path::{PathFlags, PathSource, PeerId};
    use crate::rib::prefix::Prefix;
    use bgp_packet::BgpAttr;
    use std::net::IpAddr;

    #[tokio::test]
    async fn submit_forwards_onto_rib_api_channel() {
        let api = RibApiChannel::new();
        let bgp = Bgp::attached_to(&api);
        let mut api = api;

        let attrs = AttrStore::new();
        let attr = attrs.intern(PathAttr::new(BgpAttr::new()));
        bgp.submit(
            "vrf-a",
            Family::Inet4,
            TableRequest::Add {
                key: Prefix::Inet4("10.0.0.0/24".parse().unwrap()),
                update: PathUpdate {
                    peer: PeerId {
                        router_id: 1,
                        address: "192.0.2.1".parse::<IpAddr>().unwrap(),
                        is_ebgp: true,
                        peer_as: 65001,
                    },
                    source: PathSource::Bgp,
                    path_id: 0,
                    attr,
                    label: 0,
                    flags: PathFlags::empty(),
                },
            },
        );

        let received = api.rx.recv().await.expect("bgp submission forwarded");
        assert_eq!(received.instance, "vrf-a");
        assert_eq!(received.family, Family::Inet4);
    }
}
