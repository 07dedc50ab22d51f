//! Transform actions a policy term's action clause can apply to a path.
use std::fmt;

use bgp_packet::{Community, ExtCommunity, ExtCommunitySubType, ExtCommunityValue};

use crate::rib::attr::PathAttr;

/// One transform in a term's ordered action sequence. `Accept`/`Reject` are
/// terminal: they end evaluation of the term list. Every other variant
/// rewrites one field of the attribute bundle and evaluation continues to
/// the next action, then the next term.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Accept,
    Reject,
    SetLocalPref(u32),
    SetMed(u32),
    AddCommunity(u32),
    RemoveCommunity(u32),
    SetCommunityList(Vec<u32>),
    AddExtCommunity(ExtCommunityValue),
    RemoveExtCommunity(ExtCommunityValue),
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Accept | Action::Reject)
    }

    /// Applies this transform to `attr`, returning the rewritten bundle.
    /// `Accept`/`Reject` carry no rewrite of their own; the evaluator deals
    /// with the reject flag separately, so they pass `attr` through.
    pub fn apply(&self, mut attr: PathAttr) -> PathAttr {
        match self {
            Action::SetLocalPref(v) => {
                attr.bgp.local_pref = Some(bgp_packet::LocalPref::new(*v));
            }
            Action::SetMed(v) => {
                attr.bgp.med = Some(bgp_packet::Med::new(*v));
            }
            Action::AddCommunity(v) => {
                let mut com = attr.bgp.com.clone().unwrap_or_else(Community::new);
                com.push(*v);
                com.sort_uniq();
                attr.bgp.com = Some(com);
            }
            Action::RemoveCommunity(v) => {
                if let Some(mut com) = attr.bgp.com.clone() {
                    com.0.retain(|c| c != v);
                    attr.bgp.com = Some(com);
                }
            }
            Action::SetCommunityList(values) => {
                let mut com = Community::new();
                for v in values {
                    com.push(*v);
                }
                com.sort_uniq();
                attr.bgp.com = Some(com);
            }
            Action::AddExtCommunity(v) => {
                let mut values: Vec<ExtCommunityValue> =
                    attr.bgp.ecom.as_ref().map(|e| e.0.clone()).unwrap_or_default();
                values.push(*v);
                attr.bgp.ecom = Some(ExtCommunity(values));
            }
            Action::RemoveExtCommunity(v) => {
                if let Some(mut ecom) = attr.bgp.ecom.clone() {
                    ecom.0.retain(|c| c != v);
                    attr.bgp.ecom = Some(ecom);
                }
            }
            Action::Accept | Action::Reject => {}
        }
        attr
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Accept => write!(f, "accept"),
            Action::Reject => write!(f, "reject"),
            Action::SetLocalPref(v) => write!(f, "set-local-pref {v}"),
            Action::SetMed(v) => write!(f, "set-med {v}"),
            Action::AddCommunity(v) => write!(f, "add-community {v}"),
            Action::RemoveCommunity(v) => write!(f, "remove-community {v}"),
            Action::SetCommunityList(v) => write!(f, "set-community-list {v:?}"),
            Action::AddExtCommunity(_) => write!(f, "add-ext-community"),
            Action::RemoveExtCommunity(_) => write!(f, "remove-ext-community"),
        }
    }
}

/// Convenience constructor for a route-target extended-community value,
/// used by term match clauses and by config ingestion.
pub fn route_target(asn: u16, local: u32) -> ExtCommunityValue {
    let mut val = [0u8; 6];
    val[0..2].copy_from_slice(&asn.to_be_bytes());
    val[2..6].copy_from_slice(&local.to_be_bytes());
    ExtCommunityValue {
        high_type: 0x00,
        low_type: ExtCommunitySubType::RouteTarget as u8,
        val,
    }
}
