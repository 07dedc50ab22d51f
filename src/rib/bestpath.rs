//! Best-path comparator.
//!
//! `compare` is a total order over `Path`: the best path is whichever path
//! sorts first. Every step ties unless it says otherwise, in which case it
//! decides the comparison outright and later steps are never consulted --
//! this mirrors the `BgpLocalRib::compare_routes` cascade in this
//! codebase's existing BGP RIB, generalized from an IPv4-specific method
//! into a free function usable by any family's table.
use std::cmp::Ordering;

use super::path::Path;

pub fn compare(a: &Path, b: &Path) -> Ordering {
    // 1. Feasible before infeasible.
    match (a.is_feasible(), b.is_feasible()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    // 2. Higher local preference first.
    if a.local_pref() != b.local_pref() {
        return b.local_pref().cmp(&a.local_pref());
    }

    // 3. Shorter AS path first.
    if a.as_path_len() != b.as_path_len() {
        return a.as_path_len().cmp(&b.as_path_len());
    }

    // 4. Lower origin numeric code first (IGP < EGP < Incomplete).
    if a.origin_code() != b.origin_code() {
        return a.origin_code().cmp(&b.origin_code());
    }

    // 5. Lower MED first, only compared between paths from the same
    // neighboring AS -- otherwise this step ties and falls through.
    if a.peer.peer_as == b.peer.peer_as && a.med() != b.med() {
        return a.med().cmp(&b.med());
    }

    // 6. eBGP before iBGP.
    if a.peer.is_ebgp != b.peer.is_ebgp {
        return if a.peer.is_ebgp {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }

    // 7. Lower router-id of the originating peer first.
    if a.peer.router_id != b.peer.router_id {
        return a.peer.router_id.cmp(&b.peer.router_id);
    }

    // 8. Lower cluster-list length first.
    if a.cluster_list_len() != b.cluster_list_len() {
        return a.cluster_list_len().cmp(&b.cluster_list_len());
    }

    // 9. Lower peer address as final tie-breaker.
    a.peer.address.cmp(&b.peer.address)
}

/// Paths tying on steps (1)-(6) with the current best are ECMP siblings.
pub fn is_multipath_sibling(best: &Path, other: &Path) -> bool {
    if best.is_feasible() != other.is_feasible() {
        return false;
    }
    if !best.is_feasible() {
        return false;
    }
    best.local_pref() == other.local_pref()
        && best.as_path_len() == other.as_path_len()
        && best.origin_code() == other.origin_code()
        && (best.peer.peer_as != other.peer.peer_as || best.med() == other.med())
        && best.peer.is_ebgp == other.peer.is_ebgp
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;

    use bgp_packet::BgpAttr;

    use super::*;
    use crate::rib::attr::PathAttr;
    use crate::rib::path::{PeerId, PathSource};

    fn peer(addr: &str, router_id: u32) -> PeerId {
        PeerId {
            router_id,
            address: addr.parse::<IpAddr>().unwrap(),
            is_ebgp: false,
            peer_as: 65001,
        }
    }

    fn path_with_local_pref(addr: &str, router_id: u32, local_pref: u32) -> Path {
        let mut bgp = BgpAttr::new();
        bgp.local_pref = Some(bgp_packet::LocalPref::new(local_pref));
        let attr = Arc::new(PathAttr::new(bgp));
        Path::new(peer(addr, router_id), PathSource::Bgp, 0, attr)
    }

    #[test]
    fn local_pref_and_router_id_tiebreak() {
        let a = path_with_local_pref("10.0.0.1", 1, 100);
        let b = path_with_local_pref("10.0.0.2", 2, 200);
        let c = path_with_local_pref("10.0.0.3", 3, 200);

        let mut paths = vec![a.clone(), b.clone(), c.clone()];
        paths.sort_by(compare);

        assert_eq!(paths[0].peer.router_id, 2); // 200/B wins on router-id tiebreak
        assert!(is_multipath_sibling(&paths[0], &c));
        assert!(!is_multipath_sibling(&paths[0], &a));
    }

    #[test]
    fn feasible_before_infeasible() {
        use crate::rib::path::PathFlags;
        let mut infeasible = path_with_local_pref("10.0.0.9", 9, 500);
        infeasible.flags = PathFlags::POLICY_REJECT;
        let feasible = path_with_local_pref("10.0.0.1", 1, 50);

        let mut paths = vec![infeasible, feasible.clone()];
        paths.sort_by(compare);
        assert!(paths[0].is_feasible());
        assert_eq!(paths[0].peer.router_id, feasible.peer.router_id);
    }
}
