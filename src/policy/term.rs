//! Ordered term list applied by the policy evaluator.
use std::net::IpAddr;

use ipnet::IpNet;

use crate::policy::action::Action;
use crate::rib::attr::PathAttr;
use crate::rib::path::PathSource;

/// One clause of a term's match disjunction. A term matches a path if any
/// of its clauses matches (logical OR across the vector).
#[derive(Debug, Clone)]
pub enum MatchClause {
    /// Matches if the route's prefix falls within any network in the list.
    /// `exact` requires the prefix length to equal the list entry's; when
    /// false, any more-specific prefix also matches (a "longer" match).
    PrefixList { networks: Vec<IpNet>, exact: bool },
    /// Matches if the path's community attribute contains this value.
    CommunityMatch(u32),
    /// Matches if the path's source tag equals this one.
    ProtocolMatch(PathSource),
}

impl MatchClause {
    fn matches(&self, prefix: &IpAddr, prefix_len: u8, attr: &PathAttr, source: PathSource) -> bool {
        match self {
            MatchClause::PrefixList { networks, exact } => networks.iter().any(|net| {
                if !net.contains(prefix) {
                    return false;
                }
                if *exact {
                    net.prefix_len() == prefix_len
                } else {
                    net.prefix_len() <= prefix_len
                }
            }),
            MatchClause::CommunityMatch(value) => attr
                .bgp
                .com
                .as_ref()
                .map(|com| com.contains(value))
                .unwrap_or(false),
            MatchClause::ProtocolMatch(want) => source == *want,
        }
    }
}

/// One entry in a policy's ordered term list.
#[derive(Debug, Clone)]
pub struct Term {
    pub name: String,
    pub matches: Vec<MatchClause>,
    pub actions: Vec<Action>,
}

impl Term {
    pub fn new(name: impl Into<String>) -> Self {
        Term {
            name: name.into(),
            matches: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn matches(&self, prefix: &IpAddr, prefix_len: u8, attr: &PathAttr, source: PathSource) -> bool {
        // No match clauses at all means the term always fires (a bare
        // action-only term, e.g. a trailing default `reject`).
        self.matches.is_empty() || self.matches.iter().any(|m| m.matches(prefix, prefix_len, attr, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_packet::{BgpAttr, Community};

    #[test]
    fn prefix_list_respects_exactness() {
        let net: IpNet = "10.0.0.0/16".parse().unwrap();
        let clause = MatchClause::PrefixList {
            networks: vec![net],
            exact: true,
        };
        let attr = PathAttr::new(BgpAttr::new());
        let ip: IpAddr = "10.0.5.0".parse().unwrap();
        assert!(!clause.matches(&ip, 24, &attr, PathSource::Bgp));
        assert!(clause.matches(&ip, 16, &attr, PathSource::Bgp));
    }

    #[test]
    fn community_match_checks_membership() {
        let mut bgp = BgpAttr::new();
        bgp.com = Some(Community(vec![100]));
        let attr = PathAttr::new(bgp);
        let ip: IpAddr = "10.0.0.0".parse().unwrap();
        let clause = MatchClause::CommunityMatch(100);
        assert!(clause.matches(&ip, 8, &attr, PathSource::Bgp));
        let clause = MatchClause::CommunityMatch(200);
        assert!(!clause.matches(&ip, 8, &attr, PathSource::Bgp));
    }
}
