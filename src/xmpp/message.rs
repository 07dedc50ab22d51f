//! Semantic XMPP message schema. Wire framing
//! (the actual IQ/XML envelope) is out of scope; these types are the
//! decoded shape a transport layer hands to `xmpp::Channel`.
use std::net::IpAddr;

use bgp_packet::ExtCommunityValue;
use ipnet::IpNet;

use crate::rib::prefix::{EvpnKey, Family, Prefix};

#[derive(Debug, Clone)]
pub struct SubscribeMsg {
    pub vrf: String,
    pub instance_id: i32,
}

#[derive(Debug, Clone)]
pub struct UnsubscribeMsg {
    pub vrf: String,
}

/// `ItemType`: a unicast inet/inet6 route advertisement.
#[derive(Debug, Clone)]
pub struct ItemType {
    pub prefix: IpNet,
    pub nexthop: IpAddr,
    pub label: u32,
    pub communities: Vec<u32>,
    pub ext_communities: Vec<ExtCommunityValue>,
}

/// `McastItemType`: an inclusive-multicast (ERMVPN) advertisement.
#[derive(Debug, Clone)]
pub struct McastItemType {
    pub ether_tag: u32,
    pub source: IpAddr,
    pub nexthop: IpAddr,
    pub label: u32,
}

/// `EnetItemType`: an EVPN MAC/IP advertisement.
#[derive(Debug, Clone)]
pub struct EnetItemType {
    pub ether_tag: u32,
    pub mac: [u8; 6],
    pub ip: Option<IpAddr>,
    pub nexthop: IpAddr,
    pub label: u32,
}

#[derive(Debug, Clone)]
pub enum ItemBody {
    Unicast(ItemType),
    Multicast(McastItemType),
    Evpn(EnetItemType),
}

#[derive(Debug, Clone)]
pub struct PublishMsg {
    pub vrf: String,
    pub body: ItemBody,
}

/// A withdraw carries item keys only: enough to identify the route,
/// none of its attributes.
#[derive(Debug, Clone)]
pub enum ItemKey {
    Unicast(IpNet),
    Multicast { ether_tag: u32, source: IpAddr },
    Evpn { ether_tag: u32, mac: [u8; 6], ip: Option<IpAddr> },
}

#[derive(Debug, Clone)]
pub struct WithdrawMsg {
    pub vrf: String,
    pub key: ItemKey,
}

impl ItemBody {
    pub fn family(&self) -> Family {
        match self {
            ItemBody::Unicast(item) => match item.prefix {
                IpNet::V4(_) => Family::Inet4,
                IpNet::V6(_) => Family::Inet6,
            },
            ItemBody::Multicast(_) => Family::Ermvpn,
            ItemBody::Evpn(_) => Family::Evpn,
        }
    }

    /// The VRF-local table key this item addresses, with a placeholder
    /// route-distinguisher (VRF-local tables carry no RD of their own;
    /// one is attached only once the replication engine promotes the
    /// path into the shared VPN table).
    pub fn key(&self) -> Prefix {
        match self {
            ItemBody::Unicast(item) => match item.prefix {
                IpNet::V4(net) => Prefix::Inet4(net),
                IpNet::V6(net) => Prefix::Inet6(net),
            },
            ItemBody::Multicast(item) => Prefix::Ermvpn {
                rd: Default::default(),
                key: EvpnKey::InclusiveMulticast {
                    ether_tag: item.ether_tag,
                    originator: item.source,
                },
            },
            ItemBody::Evpn(item) => Prefix::Evpn {
                rd: Default::default(),
                key: EvpnKey::MacIp {
                    ether_tag: item.ether_tag,
                    mac: item.mac,
                    ip: item.ip,
                },
            },
        }
    }

    pub fn nexthop(&self) -> IpAddr {
        match self {
            ItemBody::Unicast(item) => item.nexthop,
            ItemBody::Multicast(item) => item.nexthop,
            ItemBody::Evpn(item) => item.nexthop,
        }
    }

    pub fn label(&self) -> u32 {
        match self {
            ItemBody::Unicast(item) => item.label,
            ItemBody::Multicast(item) => item.label,
            ItemBody::Evpn(item) => item.label,
        }
    }
}

impl ItemKey {
    pub fn family(&self) -> Family {
        match self {
            ItemKey::Unicast(net) => match net {
                IpNet::V4(_) => Family::Inet4,
                IpNet::V6(_) => Family::Inet6,
            },
            ItemKey::Multicast { .. } => Family::Ermvpn,
            ItemKey::Evpn { .. } => Family::Evpn,
        }
    }

    pub fn prefix(&self) -> Prefix {
        match self {
            ItemKey::Unicast(net) => match net {
                IpNet::V4(net) => Prefix::Inet4(*net),
                IpNet::V6(net) => Prefix::Inet6(*net),
            },
            ItemKey::Multicast { ether_tag, source } => Prefix::Ermvpn {
                rd: Default::default(),
                key: EvpnKey::InclusiveMulticast {
                    ether_tag: *ether_tag,
                    originator: *source,
                },
            },
            ItemKey::Evpn { ether_tag, mac, ip } => Prefix::Evpn {
                rd: Default::default(),
                key: EvpnKey::MacIp {
                    ether_tag: *ether_tag,
                    mac: *mac,
                    ip: *ip,
                },
            },
        }
    }
}
