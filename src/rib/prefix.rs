//! Prefix value types.
//!
//! A prefix is a tagged union over address families. Every variant carries
//! enough bytes to total-order within its family; the enum discriminant
//! orders across families. Address family is immutable once constructed.
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bgp_packet::RouteDistinguisher;
use ipnet::{Ipv4Net, Ipv6Net};

/// Address family tag, used as a table/partition key dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Inet4,
    Inet6,
    L3Vpn4,
    L3Vpn6,
    Evpn,
    Ermvpn,
    RouteTarget,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Family::Inet4 => "inet",
            Family::Inet6 => "inet6",
            Family::L3Vpn4 => "inetvpn",
            Family::L3Vpn6 => "inet6vpn",
            Family::Evpn => "evpn",
            Family::Ermvpn => "ermvpn",
            Family::RouteTarget => "rtarget",
        };
        write!(f, "{s}")
    }
}

/// An EVPN route key: type 2 (MAC/IP) keyed by ethernet tag + MAC, or type 3
/// (inclusive multicast) keyed by ethernet tag + originator address. Other
/// EVPN route types are out of scope for this crate's synthesized-route
/// producers and are represented opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvpnKey {
    MacIp {
        ether_tag: u32,
        mac: [u8; 6],
        ip: Option<std::net::IpAddr>,
    },
    InclusiveMulticast {
        ether_tag: u32,
        originator: std::net::IpAddr,
    },
}

/// Tagged-union prefix, the universal table key across every family this
/// core handles. `Ord` gives tables a deterministic partition/iteration key;
/// it orders first by family, then by family-specific content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prefix {
    Inet4(Ipv4Net),
    Inet6(Ipv6Net),
    L3Vpn4 { rd: RouteDistinguisher, net: Ipv4Net },
    L3Vpn6 { rd: RouteDistinguisher, net: Ipv6Net },
    Evpn { rd: RouteDistinguisher, key: EvpnKey },
    Ermvpn { rd: RouteDistinguisher, key: EvpnKey },
    RouteTarget { origin_as: u32, rt: [u8; 6] },
}

impl Prefix {
    pub fn family(&self) -> Family {
        match self {
            Prefix::Inet4(_) => Family::Inet4,
            Prefix::Inet6(_) => Family::Inet6,
            Prefix::L3Vpn4 { .. } => Family::L3Vpn4,
            Prefix::L3Vpn6 { .. } => Family::L3Vpn6,
            Prefix::Evpn { .. } => Family::Evpn,
            Prefix::Ermvpn { .. } => Family::Ermvpn,
            Prefix::RouteTarget { .. } => Family::RouteTarget,
        }
    }

    /// Strip a VPN prefix's route-distinguisher, recovering the VRF-local
    /// prefix it carries. Used by the replication engine's VPN→VRF path.
    pub fn strip_rd(&self) -> Option<Prefix> {
        match self {
            Prefix::L3Vpn4 { net, .. } => Some(Prefix::Inet4(*net)),
            Prefix::L3Vpn6 { net, .. } => Some(Prefix::Inet6(*net)),
            Prefix::Evpn { key, .. } => Some(Prefix::Evpn {
                rd: RouteDistinguisher::default(),
                key: key.clone(),
            }),
            _ => None,
        }
    }

    /// Prefix this VRF-local prefix with `rd`, producing the shared-VPN-table
    /// key. Used by the replication engine's VRF→VPN path.
    pub fn with_rd(&self, rd: RouteDistinguisher) -> Option<Prefix> {
        match self {
            Prefix::Inet4(net) => Some(Prefix::L3Vpn4 { rd, net: *net }),
            Prefix::Inet6(net) => Some(Prefix::L3Vpn6 { rd, net: *net }),
            Prefix::Evpn { key, .. } => Some(Prefix::Evpn {
                rd,
                key: key.clone(),
            }),
            _ => None,
        }
    }

    /// True iff `self` is strictly more specific than `other` (same family,
    /// `self`'s mask is longer, and `other` contains `self`). Used by the
    /// route aggregator's contributing-route predicate.
    pub fn strictly_more_specific_than(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::Inet4(a), Prefix::Inet4(b)) => {
                a.prefix_len() > b.prefix_len() && b.contains(a) && a != b
            }
            (Prefix::Inet6(a), Prefix::Inet6(b)) => {
                a.prefix_len() > b.prefix_len() && b.contains(a) && a != b
            }
            _ => false,
        }
    }

    /// True iff this prefix is the host route (/32 or /128) for `addr`.
    pub fn is_host_route_for(&self, addr: std::net::IpAddr) -> bool {
        match (self, addr) {
            (Prefix::Inet4(net), std::net::IpAddr::V4(v4)) => {
                net.prefix_len() == 32 && net.addr() == v4
            }
            (Prefix::Inet6(net), std::net::IpAddr::V6(v6)) => {
                net.prefix_len() == 128 && net.addr() == v6
            }
            _ => false,
        }
    }

    pub fn host4(addr: Ipv4Addr) -> Prefix {
        Prefix::Inet4(Ipv4Net::new(addr, 32).expect("host mask always valid"))
    }

    pub fn host6(addr: Ipv6Addr) -> Prefix {
        Prefix::Inet6(Ipv6Net::new(addr, 128).expect("host mask always valid"))
    }

    /// The `(address, prefix_len)` pair policy prefix-list match clauses
    /// key on. Route-target and EVPN keys have no natural
    /// IP-prefix view; they key on the unspecified /0 so a bare
    /// protocol/community clause still fires while a prefix-list clause
    /// simply never matches them.
    pub fn match_key(&self) -> (IpAddr, u8) {
        match self {
            Prefix::Inet4(net) => (IpAddr::V4(net.addr()), net.prefix_len()),
            Prefix::Inet6(net) => (IpAddr::V6(net.addr()), net.prefix_len()),
            Prefix::L3Vpn4 { net, .. } => (IpAddr::V4(net.addr()), net.prefix_len()),
            Prefix::L3Vpn6 { net, .. } => (IpAddr::V6(net.addr()), net.prefix_len()),
            _ => (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }
}

impl PartialOrd for Prefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prefix {
    fn cmp(&self, other: &Self) -> Ordering {
        self.family().cmp(&other.family()).then_with(|| match (self, other) {
            (Prefix::Inet4(a), Prefix::Inet4(b)) => cmp_ipv4net(a, b),
            (Prefix::Inet6(a), Prefix::Inet6(b)) => cmp_ipv6net(a, b),
            (
                Prefix::L3Vpn4 { rd: rd_a, net: a },
                Prefix::L3Vpn4 { rd: rd_b, net: b },
            ) => cmp_rd(rd_a, rd_b).then_with(|| cmp_ipv4net(a, b)),
            (
                Prefix::L3Vpn6 { rd: rd_a, net: a },
                Prefix::L3Vpn6 { rd: rd_b, net: b },
            ) => cmp_rd(rd_a, rd_b).then_with(|| cmp_ipv6net(a, b)),
            (
                Prefix::Evpn { rd: rd_a, key: a },
                Prefix::Evpn { rd: rd_b, key: b },
            ) => cmp_rd(rd_a, rd_b).then_with(|| a.cmp(b)),
            (
                Prefix::Ermvpn { rd: rd_a, key: a },
                Prefix::Ermvpn { rd: rd_b, key: b },
            ) => cmp_rd(rd_a, rd_b).then_with(|| a.cmp(b)),
            (
                Prefix::RouteTarget { origin_as: oa, rt: ra },
                Prefix::RouteTarget { origin_as: ob, rt: rb },
            ) => oa.cmp(ob).then_with(|| ra.cmp(rb)),
            _ => Ordering::Equal,
        })
    }
}

fn cmp_rd(a: &RouteDistinguisher, b: &RouteDistinguisher) -> Ordering {
    a.val.cmp(&b.val).then_with(|| (a.typ as u16).cmp(&(b.typ as u16)))
}

fn cmp_ipv4net(a: &Ipv4Net, b: &Ipv4Net) -> Ordering {
    a.addr()
        .cmp(&b.addr())
        .then_with(|| a.prefix_len().cmp(&b.prefix_len()))
}

fn cmp_ipv6net(a: &Ipv6Net, b: &Ipv6Net) -> Ordering {
    a.addr()
        .cmp(&b.addr())
        .then_with(|| a.prefix_len().cmp(&b.prefix_len()))
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Inet4(net) => write!(f, "{net}"),
            Prefix::Inet6(net) => write!(f, "{net}"),
            Prefix::L3Vpn4 { rd, net } => write!(f, "{rd}:{net}"),
            Prefix::L3Vpn6 { rd, net } => write!(f, "{rd}:{net}"),
            Prefix::Evpn { rd, key } => write!(f, "{rd}:{key:?}"),
            Prefix::Ermvpn { rd, key } => write!(f, "{rd}:{key:?}"),
            Prefix::RouteTarget { origin_as, rt } => {
                write!(f, "{origin_as}:{}", u32::from_be_bytes([0, rt[3], rt[4], rt[5]]))
            }
        }
    }
}

/// Hash-based partition assignment: `hash(prefix) mod n_partitions`.
pub fn partition_of(prefix: &Prefix, n_partitions: usize) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    prefix.hash(&mut hasher);
    (hasher.finish() as usize) % n_partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_specific() {
        let agg = Prefix::Inet4("192.168.1.0/24".parse().unwrap());
        let contrib = Prefix::Inet4("192.168.1.10/32".parse().unwrap());
        let not_contrib = Prefix::Inet4("192.168.2.1/32".parse().unwrap());
        assert!(contrib.strictly_more_specific_than(&agg));
        assert!(!not_contrib.strictly_more_specific_than(&agg));
        assert!(!agg.strictly_more_specific_than(&agg));
    }

    #[test]
    fn host_route_match() {
        let nh: Ipv4Addr = "192.168.1.254".parse().unwrap();
        let host = Prefix::host4(nh);
        assert!(host.is_host_route_for(nh.into()));
        let not_host = Prefix::Inet4("192.168.1.0/24".parse().unwrap());
        assert!(!not_host.is_host_route_for(nh.into()));
    }

    #[test]
    fn partition_assignment_stable() {
        let p = Prefix::Inet4("10.0.0.0/8".parse().unwrap());
        assert_eq!(partition_of(&p, 16), partition_of(&p, 16));
    }

    #[test]
    fn ordering_is_total_within_family() {
        let a = Prefix::Inet4("10.0.0.0/8".parse().unwrap());
        let b = Prefix::Inet4("10.0.0.0/16".parse().unwrap());
        assert!(a < b);
    }
}
