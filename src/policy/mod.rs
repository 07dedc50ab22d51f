pub mod action;
pub use action::Action;

pub mod term;
pub use term::{MatchClause, Term};

pub mod evaluator;
pub use evaluator::{evaluate, PolicyDef};

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use ipnet::IpNet;
use tracing::{debug, warn};

use crate::config::{ConfigChannel, ConfigDelta, ConfigKind, ConfigOp, ConfigRequest};
use crate::error::ConfigError;
use crate::rib::path::PathSource;

fn parse_protocol(s: &str) -> Option<PathSource> {
    match s {
        "bgp" => Some(PathSource::Bgp),
        "xmpp" => Some(PathSource::Xmpp),
        "aggregate" => Some(PathSource::Aggregate),
        "service-chain" => Some(PathSource::ServiceChain),
        "static" => Some(PathSource::Static),
        "resolved-route" => Some(PathSource::ResolvedRoute),
        "local" => Some(PathSource::Local),
        _ => None,
    }
}

fn parse_match(v: &serde_json::Value) -> Result<MatchClause, ConfigError> {
    let err = |reason: &str| ConfigError::MalformedValue {
        path: "/routing-policy/term/match".to_string(),
        reason: reason.to_string(),
    };
    if let Some(networks) = v.get("prefix_list") {
        let exact = v.get("exact").and_then(|e| e.as_bool()).unwrap_or(false);
        let networks = networks
            .as_array()
            .ok_or_else(|| err("prefix_list must be an array"))?
            .iter()
            .map(|n| {
                n.as_str()
                    .and_then(|s| IpNet::from_str(s).ok())
                    .ok_or_else(|| err("invalid network in prefix_list"))
            })
            .collect::<Result<Vec<IpNet>, _>>()?;
        return Ok(MatchClause::PrefixList { networks, exact });
    }
    if let Some(community) = v.get("community") {
        let value = community.as_u64().ok_or_else(|| err("community must be a number"))?;
        return Ok(MatchClause::CommunityMatch(value as u32));
    }
    if let Some(protocol) = v.get("protocol") {
        let s = protocol.as_str().ok_or_else(|| err("protocol must be a string"))?;
        let source = parse_protocol(s).ok_or_else(|| err("unknown protocol value"))?;
        return Ok(MatchClause::ProtocolMatch(source));
    }
    Err(err("match clause has no recognized key"))
}

/// `"rt:65001:100"` / `"soo:1.2.3.4:200"` -> a single `ExtCommunityValue`,
/// reusing the ext-community token parser (`bgp_packet::ExtCommunity`
/// parses a whole space-separated list; we only ever want one here).
fn parse_ext_community_value(s: &str) -> Option<bgp_packet::ExtCommunityValue> {
    bgp_packet::ExtCommunity::from_str(s).ok().and_then(|ecom| ecom.0.into_iter().next())
}

fn parse_action(v: &serde_json::Value) -> Result<Action, ConfigError> {
    let err = |reason: &str| ConfigError::MalformedValue {
        path: "/routing-policy/term/action".to_string(),
        reason: reason.to_string(),
    };
    let kind = v.get("type").and_then(|t| t.as_str()).ok_or_else(|| err("action missing type"))?;
    match kind {
        "accept" => Ok(Action::Accept),
        "reject" => Ok(Action::Reject),
        "set-local-pref" => Ok(Action::SetLocalPref(
            v.get("value").and_then(|n| n.as_u64()).ok_or_else(|| err("missing value"))? as u32,
        )),
        "set-med" => Ok(Action::SetMed(
            v.get("value").and_then(|n| n.as_u64()).ok_or_else(|| err("missing value"))? as u32,
        )),
        "add-community" => Ok(Action::AddCommunity(
            v.get("value").and_then(|n| n.as_u64()).ok_or_else(|| err("missing value"))? as u32,
        )),
        "remove-community" => Ok(Action::RemoveCommunity(
            v.get("value").and_then(|n| n.as_u64()).ok_or_else(|| err("missing value"))? as u32,
        )),
        "set-community-list" => {
            let values = v
                .get("values")
                .and_then(|a| a.as_array())
                .ok_or_else(|| err("missing values"))?
                .iter()
                .map(|n| n.as_u64().map(|n| n as u32).ok_or_else(|| err("non-numeric community")))
                .collect::<Result<Vec<u32>, _>>()?;
            Ok(Action::SetCommunityList(values))
        }
        "add-ext-community" => {
            let s = v.get("value").and_then(|s| s.as_str()).ok_or_else(|| err("missing value"))?;
            let ext = parse_ext_community_value(s).ok_or_else(|| err("invalid ext-community"))?;
            Ok(Action::AddExtCommunity(ext))
        }
        "remove-ext-community" => {
            let s = v.get("value").and_then(|s| s.as_str()).ok_or_else(|| err("missing value"))?;
            let ext = parse_ext_community_value(s).ok_or_else(|| err("invalid ext-community"))?;
            Ok(Action::RemoveExtCommunity(ext))
        }
        other => Err(err(&format!("unknown action type {other}"))),
    }
}

fn parse_policy_def(name: &str, content: &serde_json::Value) -> Result<PolicyDef, ConfigError> {
    let mut policy = PolicyDef::new(name);
    let terms = content
        .get("terms")
        .and_then(|t| t.as_array())
        .ok_or_else(|| ConfigError::MalformedValue {
            path: "/routing-policy/terms".to_string(),
            reason: "missing terms array".to_string(),
        })?;
    for (i, t) in terms.iter().enumerate() {
        let term_name = t
            .get("name")
            .and_then(|n| n.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("term-{i}"));
        let mut term = Term::new(term_name);
        if let Some(matches) = t.get("match").and_then(|m| m.as_array()) {
            for m in matches {
                term.matches.push(parse_match(m)?);
            }
        }
        if let Some(actions) = t.get("actions").and_then(|a| a.as_array()) {
            for a in actions {
                term.actions.push(parse_action(a)?);
            }
        }
        policy.terms.push(term);
    }
    Ok(policy)
}

/// Two-phase stage/commit cache for `routing-policy` deltas, the same
/// shape as `PolicyConfig`/`PolicyList` in the rest of this codebase: a
/// `Set`/`Delete` stages into `cache` (`None` marks a pending delete),
/// `CommitEnd` drains `cache` into `policies`.
#[derive(Default)]
pub struct PolicyConfig {
    pub policies: BTreeMap<String, Arc<PolicyDef>>,
    cache: BTreeMap<String, Option<PolicyDef>>,
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(&mut self, delta: &ConfigDelta) {
        match &delta.content {
            Some(content) => match parse_policy_def(&delta.name, content) {
                Ok(def) => {
                    self.cache.insert(delta.name.clone(), Some(def));
                }
                Err(e) => warn!(policy = %delta.name, error = %e, "rejecting malformed routing-policy delta"),
            },
            None => {
                self.cache.insert(delta.name.clone(), None);
            }
        }
    }

    pub fn commit(&mut self) {
        while let Some((name, staged)) = self.cache.pop_first() {
            match staged {
                Some(def) => {
                    self.policies.insert(name, Arc::new(def));
                }
                None => {
                    self.policies.remove(&name);
                }
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<PolicyDef>> {
        self.policies.get(name).cloned()
    }

    /// Resolves an ordered list of policy names to their definitions,
    /// dropping (and logging) any name with no matching config. Instances
    /// may attach multiple policies; they apply in instance-configured
    /// order.
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<PolicyDef>> {
        names
            .iter()
            .filter_map(|name| match self.lookup(name) {
                Some(def) => Some(def),
                None => {
                    warn!(policy = %name, "attached policy has no configuration, skipping");
                    None
                }
            })
            .collect()
    }
}

/// Owns the config channel for routing-policy deltas and the committed
/// policy table every routing instance's import/export chain reads from.
/// `config` is shared behind a mutex rather than owned outright because the
/// rib core reads it (to apply a path's attached policy chain) from a
/// different task than the one draining `cm`.
pub struct Policy {
    pub cm: ConfigChannel,
    pub config: Arc<std::sync::Mutex<PolicyConfig>>,
}

impl Policy {
    pub fn new() -> Self {
        Policy {
            cm: ConfigChannel::new(),
            config: Arc::new(std::sync::Mutex::new(PolicyConfig::new())),
        }
    }

    async fn process_cm_msg(&mut self, msg: ConfigRequest) {
        match msg.op {
            ConfigOp::Set | ConfigOp::Delete => {
                if let Some(delta) = &msg.delta {
                    if delta.kind == ConfigKind::RoutingPolicy {
                        self.config.lock().expect("policy config poisoned").stage(delta);
                    }
                }
            }
            ConfigOp::CommitStart => {}
            ConfigOp::CommitEnd => {
                let mut config = self.config.lock().expect("policy config poisoned");
                config.commit();
                debug!(count = config.policies.len(), "routing-policy config committed");
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

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

pub fn serve(mut policy: Policy) {
    tokio::spawn(async move {
        policy.event_loop().await;
    });
}

/// Applies an instance's attached import or export policy chain to one
/// path. Thin wrapper so callers outside this module don't need to know
/// about `PolicyConfig`'s internals.
pub fn apply_chain(
    config: &std::sync::Mutex<PolicyConfig>,
    attached: &[String],
    path: &crate::rib::path::Path,
    prefix: &IpAddr,
    prefix_len: u8,
    attrs: &crate::rib::attr::AttrStore,
) -> crate::rib::path::Path {
    let policies = config.lock().expect("policy config poisoned").resolve(attached);
    evaluate(&policies, path, prefix, prefix_len, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_staged_set_then_delete() {
        let mut config = PolicyConfig::new();
        let content = serde_json::json!({
            "terms": [
                {"name": "t1", "match": [{"protocol": "bgp"}], "actions": [{"type": "set-local-pref", "value": 150}]}
            ]
        });
        config.stage(&ConfigDelta::set(ConfigKind::RoutingPolicy, "p1", content));
        config.commit();
        assert!(config.lookup("p1").is_some());

        config.stage(&ConfigDelta::delete(ConfigKind::RoutingPolicy, "p1"));
        config.commit();
        assert!(config.lookup("p1").is_none());
    }

    #[test]
    fn malformed_delta_is_rejected_not_staged() {
        let mut config = PolicyConfig::new();
        let content = serde_json::json!({"not_terms": []});
        config.stage(&ConfigDelta::set(ConfigKind::RoutingPolicy, "bad", content));
        config.commit();
        assert!(config.lookup("bad").is_none());
    }
}
