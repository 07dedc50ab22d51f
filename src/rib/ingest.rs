//! Routing-core configuration ingestion: `routing-instance`,
//! `route-aggregate`, `static-route-entries`, `virtual-network` deltas
//!. Same two-phase stage/commit shape as `policy::PolicyConfig`:
//! `Set`/`Delete` stages into a cache keyed by delta name, `CommitEnd`
//! drains it into effect.
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::str::FromStr;

use bgp_packet::RouteDistinguisher;
use ipnet::{Ipv4Net, Ipv6Net};
use tracing::warn;

use crate::config::{ConfigDelta, ConfigKind};
use crate::error::ConfigError;

use super::aggregate::AggregateConfig;
use super::instance::InstanceRegistry;
use super::prefix::{Family, Prefix};
use super::rtgroup::RouteTarget;
use super::static_route::StaticRouteConfig;

fn err(path: &str, reason: &str) -> ConfigError {
    ConfigError::MalformedValue {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_family(s: &str) -> Option<Family> {
    match s {
        "inet4" => Some(Family::Inet4),
        "inet6" => Some(Family::Inet6),
        "l3vpn4" => Some(Family::L3Vpn4),
        "l3vpn6" => Some(Family::L3Vpn6),
        "evpn" => Some(Family::Evpn),
        "ermvpn" => Some(Family::Ermvpn),
        "rtarget" => Some(Family::RouteTarget),
        _ => None,
    }
}

fn vpn_family_for(family: Family) -> Family {
    match family {
        Family::Inet6 => Family::L3Vpn6,
        _ => Family::L3Vpn4,
    }
}

fn parse_rt_list(v: &serde_json::Value, path: &str) -> Result<HashSet<RouteTarget>, ConfigError> {
    let mut out = HashSet::new();
    let Some(arr) = v.as_array() else { return Ok(out) };
    for entry in arr {
        let s = entry.as_str().ok_or_else(|| err(path, "route-target entry must be a string"))?;
        let ecom = bgp_packet::ExtCommunity::from_str(s).map_err(|_| err(path, "invalid route-target"))?;
        if let Some(rt) = ecom.0.into_iter().next() {
            out.insert(rt);
        }
    }
    Ok(out)
}

fn parse_prefix(s: &str, path: &str) -> Result<Prefix, ConfigError> {
    if let Ok(net) = Ipv4Net::from_str(s) {
        return Ok(Prefix::Inet4(net));
    }
    if let Ok(net) = Ipv6Net::from_str(s) {
        return Ok(Prefix::Inet6(net));
    }
    Err(err(path, "not a valid network"))
}

struct InstanceStage {
    rd: RouteDistinguisher,
    family: Family,
    import_rts: HashSet<RouteTarget>,
    export_rts: HashSet<RouteTarget>,
}

fn parse_instance_stage(content: &serde_json::Value) -> Result<InstanceStage, ConfigError> {
    const PATH: &str = "/routing-instance";
    let rd_str = content.get("rd").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing rd"))?;
    let rd = RouteDistinguisher::from_str(rd_str).map_err(|_| err(PATH, "invalid rd"))?;
    let family = content
        .get("family")
        .and_then(|v| v.as_str())
        .and_then(parse_family)
        .ok_or_else(|| err(PATH, "missing or unknown family"))?;
    let import_rts = content.get("import_rts").map(|v| parse_rt_list(v, PATH)).transpose()?.unwrap_or_default();
    let export_rts = content.get("export_rts").map(|v| parse_rt_list(v, PATH)).transpose()?.unwrap_or_default();
    Ok(InstanceStage { rd, family, import_rts, export_rts })
}

fn parse_aggregate(content: &serde_json::Value) -> Result<(String, Family, AggregateConfig), ConfigError> {
    const PATH: &str = "/route-aggregate";
    let instance = content.get("instance").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing instance"))?.to_string();
    let family = content.get("family").and_then(|v| v.as_str()).and_then(parse_family).ok_or_else(|| err(PATH, "missing family"))?;
    let prefix_str = content.get("aggregate_prefix").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing aggregate_prefix"))?;
    let aggregate_prefix = parse_prefix(prefix_str, PATH)?;
    let nexthop_str = content.get("nexthop_ip").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing nexthop_ip"))?;
    let nexthop_ip: IpAddr = nexthop_str.parse().map_err(|_| err(PATH, "invalid nexthop_ip"))?;
    Ok((instance, family, AggregateConfig { aggregate_prefix, nexthop_ip }))
}

fn parse_static(content: &serde_json::Value) -> Result<(String, Family, StaticRouteConfig), ConfigError> {
    const PATH: &str = "/static-route-entries";
    let instance = content.get("instance").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing instance"))?.to_string();
    let family = content.get("family").and_then(|v| v.as_str()).and_then(parse_family).ok_or_else(|| err(PATH, "missing family"))?;
    let prefix_str = content.get("static_prefix").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing static_prefix"))?;
    let static_prefix = parse_prefix(prefix_str, PATH)?;
    let nexthop_str = content.get("nexthop_ip").and_then(|v| v.as_str()).ok_or_else(|| err(PATH, "missing nexthop_ip"))?;
    let nexthop_ip: IpAddr = nexthop_str.parse().map_err(|_| err(PATH, "invalid nexthop_ip"))?;
    let rt_list = content.get("rt_list").map(|v| parse_rt_list(v, PATH)).transpose()?.unwrap_or_default().into_iter().collect();
    let community_list = content
        .get("community_list")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|n| n.as_u64().map(|n| n as u32)).collect())
        .unwrap_or_default();
    let virtual_network_index = content.get("virtual_network_index").and_then(|v| v.as_u64()).map(|n| n as u32);
    Ok((
        instance,
        family,
        StaticRouteConfig { static_prefix, nexthop_ip, rt_list, community_list, virtual_network_index },
    ))
}

/// Staged state for one `CommitEnd` batch. Kept flat (one cache per kind)
/// rather than a single generic map, since each kind's content shape and
/// commit action differ.
#[derive(Default)]
pub struct RibConfig {
    instance_cache: HashMap<String, Option<InstanceStage>>,
    aggregate_cache: HashMap<String, Option<(String, Family, AggregateConfig)>>,
    aggregate_ids: HashMap<String, (String, Family, u64)>,
    static_cache: HashMap<String, Option<(String, Family, StaticRouteConfig)>>,
    static_ids: HashMap<String, (String, Family, u64)>,
    vnet_cache: HashMap<String, Option<u32>>,
}

impl RibConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, delta: &ConfigDelta) {
        match delta.kind {
            ConfigKind::RoutingInstance => match &delta.content {
                Some(content) => match parse_instance_stage(content) {
                    Ok(stage) => {
                        self.instance_cache.insert(delta.name.clone(), Some(stage));
                    }
                    Err(e) => warn!(instance = %delta.name, error = %e, "rejecting malformed routing-instance delta"),
                },
                None => {
                    self.instance_cache.insert(delta.name.clone(), None);
                }
            },
            ConfigKind::RouteAggregate => match &delta.content {
                Some(content) => match parse_aggregate(content) {
                    Ok(parsed) => {
                        self.aggregate_cache.insert(delta.name.clone(), Some(parsed));
                    }
                    Err(e) => warn!(aggregate = %delta.name, error = %e, "rejecting malformed route-aggregate delta"),
                },
                None => {
                    self.aggregate_cache.insert(delta.name.clone(), None);
                }
            },
            ConfigKind::StaticRouteEntries => match &delta.content {
                Some(content) => match parse_static(content) {
                    Ok(parsed) => {
                        self.static_cache.insert(delta.name.clone(), Some(parsed));
                    }
                    Err(e) => warn!(entry = %delta.name, error = %e, "rejecting malformed static-route-entries delta"),
                },
                None => {
                    self.static_cache.insert(delta.name.clone(), None);
                }
            },
            ConfigKind::VirtualNetwork => match &delta.content {
                Some(content) => {
                    let index = content.get("virtual_network_properties").and_then(|v| v.get("network_id")).and_then(|v| v.as_u64());
                    self.vnet_cache.insert(delta.name.clone(), index.map(|n| n as u32));
                }
                None => {
                    self.vnet_cache.insert(delta.name.clone(), None);
                }
            },
            _ => {
                // bgp-router / bgp-peering / global-system-config: recorded
                // by the (out-of-scope) peer layer, not this core.
            }
        }
    }

    /// Drains every staged cache into live effect against `registry`. Order
    /// matters: instances must exist before aggregates/statics attach to
    /// their tables, and virtual-network index updates apply last since
    /// they only annotate an already-created instance.
    pub fn commit(&mut self, registry: &mut InstanceRegistry) {
        while let Some((name, staged)) = self.instance_cache_pop() {
            match staged {
                Some(stage) => {
                    let vpn_family = vpn_family_for(stage.family);
                    registry.create_vrf(&name, stage.rd, stage.family, vpn_family, stage.import_rts, stage.export_rts);
                }
                None => registry.delete_vrf(&name),
            }
        }

        while let Some((name, staged)) = self.aggregate_cache_pop() {
            self.commit_aggregate(registry, name, staged);
        }

        while let Some((name, staged)) = self.static_cache_pop() {
            self.commit_static(registry, name, staged);
        }

        while let Some((name, index)) = self.vnet_cache_pop() {
            if let Some(instance) = registry.get_mut(&name) {
                instance.virtual_network_index = index;
            } else {
                warn!(instance = %name, "virtual-network delta for unknown instance, ignored");
            }
        }
    }

    fn instance_cache_pop(&mut self) -> Option<(String, Option<InstanceStage>)> {
        let key = self.instance_cache.keys().next().cloned()?;
        self.instance_cache.remove(&key).map(|v| (key, v))
    }

    fn aggregate_cache_pop(&mut self) -> Option<(String, Option<(String, Family, AggregateConfig)>)> {
        let key = self.aggregate_cache.keys().next().cloned()?;
        self.aggregate_cache.remove(&key).map(|v| (key, v))
    }

    fn static_cache_pop(&mut self) -> Option<(String, Option<(String, Family, StaticRouteConfig)>)> {
        let key = self.static_cache.keys().next().cloned()?;
        self.static_cache.remove(&key).map(|v| (key, v))
    }

    fn vnet_cache_pop(&mut self) -> Option<(String, Option<u32>)> {
        let key = self.vnet_cache.keys().next().cloned()?;
        self.vnet_cache.remove(&key).map(|v| (key, v))
    }

    fn commit_aggregate(&mut self, registry: &mut InstanceRegistry, name: String, staged: Option<(String, Family, AggregateConfig)>) {
        if let Some((instance_name, family, id)) = self.aggregate_ids.get(&name).cloned() {
            let aggregator = registry.get(&instance_name).and_then(|instance| instance.aggregators.get(&family).cloned());
            if let Some(aggregator) = aggregator {
                match staged {
                    Some((_, _, config)) => {
                        tokio::spawn(async move { aggregator.update_entry(id, config).await });
                    }
                    None => {
                        tokio::spawn(async move { aggregator.remove_entry(id).await });
                        self.aggregate_ids.remove(&name);
                    }
                }
                return;
            }
        }
        let Some((instance_name, family, config)) = staged else { return };
        let Some(instance) = registry.get_mut(&instance_name) else {
            warn!(instance = %instance_name, "route-aggregate for unknown instance, ignored");
            return;
        };
        let table = instance.ensure_table(family);
        let aggregator = instance
            .aggregators
            .entry(family)
            .or_insert_with(|| super::aggregate::RouteAggregator::new(table.clone(), registry.attrs.clone()))
            .clone();
        let id = aggregator.add_entry(table, config);
        self.aggregate_ids.insert(name, (instance_name, family, id));
    }

    fn commit_static(&mut self, registry: &mut InstanceRegistry, name: String, staged: Option<(String, Family, StaticRouteConfig)>) {
        if let Some((instance_name, family, id)) = self.static_ids.get(&name).cloned() {
            let manager = registry.get(&instance_name).and_then(|instance| instance.statics.get(&family).cloned());
            if let Some(manager) = manager {
                match staged {
                    Some((_, _, config)) => {
                        tokio::spawn(async move { manager.update_entry(id, config).await });
                    }
                    None => {
                        tokio::spawn(async move { manager.remove_entry(id).await });
                        self.static_ids.remove(&name);
                    }
                }
                return;
            }
        }
        let Some((instance_name, family, config)) = staged else { return };
        let Some(instance) = registry.get_mut(&instance_name) else {
            warn!(instance = %instance_name, "static-route-entries for unknown instance, ignored");
            return;
        };
        let table = instance.ensure_table(family);
        let manager = instance
            .statics
            .entry(family)
            .or_insert_with(|| super::static_route::StaticRouteManager::new(table.clone(), registry.attrs.clone()))
            .clone();
        let id = manager.add_entry(table, config);
        self.static_ids.insert(name, (instance_name, family, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn commit_creates_then_deletes_routing_instance() {
        let mut config = RibConfig::new();
        let mut registry = InstanceRegistry::new(Arc::new(super::super::attr::AttrStore::new()));

        let content = serde_json::json!({
            "rd": "65001:1",
            "family": "inet4",
            "import_rts": ["rt:65001:100"],
            "export_rts": ["rt:65001:100"],
        });
        config.stage(&ConfigDelta::set(ConfigKind::RoutingInstance, "vrf-a", content));
        config.commit(&mut registry);
        assert!(registry.get("vrf-a").is_some());
        assert_eq!(registry.get("vrf-a").unwrap().families().count(), 1);

        config.stage(&ConfigDelta::delete(ConfigKind::RoutingInstance, "vrf-a"));
        config.commit(&mut registry);
        assert!(registry.get("vrf-a").is_none());
    }

    #[test]
    fn malformed_instance_delta_is_dropped() {
        let mut config = RibConfig::new();
        let mut registry = InstanceRegistry::new(Arc::new(super::super::attr::AttrStore::new()));
        let content = serde_json::json!({"family": "inet4"});
        config.stage(&ConfigDelta::set(ConfigKind::RoutingInstance, "bad", content));
        config.commit(&mut registry);
        assert!(registry.get("bad").is_none());
    }
}
