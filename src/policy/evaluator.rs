//! Ordered term evaluation.
use std::net::IpAddr;
use std::sync::Arc;

use super::term::Term;
use crate::rib::attr::{AttrStore, PathAttr};
use crate::rib::path::{Path, PathFlags, PathSource};

/// A single named, ordered policy. Instances attach these by name, in
/// instance-configured order, on import and/or export.
#[derive(Debug, Clone, Default)]
pub struct PolicyDef {
    pub name: String,
    pub terms: Vec<Term>,
}

impl PolicyDef {
    pub fn new(name: impl Into<String>) -> Self {
        PolicyDef {
            name: name.into(),
            terms: Vec::new(),
        }
    }

    /// Evaluates this policy's term list against `path`, returning the
    /// rewritten path. `accept`/`reject` stop evaluation; falling off the
    /// end of the term list with no terminal action leaves the path
    /// unmodified (implicit accept). A `reject` sets `PolicyReject` on the
    /// path's flags and preserves the path's pre-policy attributes in
    /// `path.original_attr` (already the case for every path since
    /// `rib::path::Path::new` stamps it once on arrival).
    fn apply(&self, path: &Path, prefix: &IpAddr, prefix_len: u8, attrs: &AttrStore) -> Path {
        let mut current: PathAttr = (*path.attr).clone();
        let mut out = path.clone();
        if out.original_attr.is_none() {
            out.original_attr = Some(path.attr.clone());
        }
        for term in &self.terms {
            if !term.matches(prefix, prefix_len, &current, path.source) {
                continue;
            }
            for action in &term.actions {
                if matches!(action, super::action::Action::Reject) {
                    out.flags |= PathFlags::POLICY_REJECT;
                    return out;
                }
                if matches!(action, super::action::Action::Accept) {
                    out.attr = attrs.intern(current);
                    return out;
                }
                current = action.apply(current);
            }
        }
        out.attr = attrs.intern(current);
        out
    }
}

/// Applies a sequence of named policies, in order, to one path. Each
/// policy can reject outright; a reject from any policy in the chain stops
/// evaluation of the remaining policies too.
pub fn evaluate(
    policies: &[Arc<PolicyDef>],
    path: &Path,
    prefix: &IpAddr,
    prefix_len: u8,
    attrs: &AttrStore,
) -> Path {
    let mut current = path.clone();
    for policy in policies {
        current = policy.apply(&current, prefix, prefix_len, attrs);
        if current.flags.contains(PathFlags::POLICY_REJECT) {
            break;
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::action::Action;
    use crate::policy::term::MatchClause;
    use crate::rib::path::PeerId;
    use bgp_packet::BgpAttr;

    fn peer() -> PeerId {
        PeerId {
            router_id: 1,
            address: "10.0.0.1".parse().unwrap(),
            is_ebgp: true,
            peer_as: 65001,
        }
    }

    #[test]
    fn set_local_pref_rewrites_attribute() {
        let attrs = AttrStore::new();
        let interned = attrs.intern(PathAttr::new(BgpAttr::new()));
        let path = Path::new(peer(), PathSource::Bgp, 0, interned);

        let mut term = Term::new("set-lp");
        term.actions.push(Action::SetLocalPref(200));
        let policy = Arc::new(PolicyDef {
            name: "p1".into(),
            terms: vec![term],
        });

        let prefix: IpAddr = "10.1.0.0".parse().unwrap();
        let result = evaluate(&[policy], &path, &prefix, 16, &attrs);
        assert_eq!(result.attr.bgp.local_pref.unwrap().local_pref, 200);
        assert!(!result.flags.contains(PathFlags::POLICY_REJECT));
    }

    #[test]
    fn reject_sets_flag_and_stops_chain() {
        let attrs = AttrStore::new();
        let interned = attrs.intern(PathAttr::new(BgpAttr::new()));
        let path = Path::new(peer(), PathSource::Bgp, 0, interned);

        let mut term = Term::new("reject-all");
        term.matches.push(MatchClause::ProtocolMatch(PathSource::Bgp));
        term.actions.push(Action::Reject);
        let policy = Arc::new(PolicyDef {
            name: "p1".into(),
            terms: vec![term],
        });

        let prefix: IpAddr = "10.1.0.0".parse().unwrap();
        let result = evaluate(&[policy], &path, &prefix, 16, &attrs);
        assert!(result.flags.contains(PathFlags::POLICY_REJECT));
        assert!(!result.is_feasible());
    }
}
