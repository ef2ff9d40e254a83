//! Aggregation of proxy records into one routing document

use std::collections::HashSet;

use proxyfleet_link::CanonicalProxyRecord;
use tracing::{debug, warn};

use crate::config::{GroupKind, ProxyGroup, RoutingConfig};
use crate::options::RoutingOptions;
use crate::proxy::ClashProxy;
use crate::rules::{DIRECT, RuleSet};

/// Build the routing document for `records`
///
/// Record order is kept. A record whose name is already taken, or collides
/// with a group or `DIRECT`, is dropped with a warning.
#[must_use]
pub fn aggregate(records: &[CanonicalProxyRecord], options: &RoutingOptions) -> RoutingConfig {
    let groups = &options.groups;
    let reserved: HashSet<&str> = groups.all().into_iter().chain([DIRECT]).collect();

    let mut seen = HashSet::new();
    let mut proxies = Vec::with_capacity(records.len());
    for record in records {
        if reserved.contains(record.name.as_str()) {
            warn!(name = %record.name, "proxy name collides with a group name, dropping");
            continue;
        }
        if !seen.insert(record.name.as_str()) {
            warn!(name = %record.name, server = %record.server, "duplicate proxy name, dropping");
            continue;
        }
        proxies.push(ClashProxy::from(record));
    }

    let names: Vec<String> = proxies.iter().map(|p| p.name.clone()).collect();
    debug!(proxies = names.len(), "aggregated routing config");

    let mut manual = Vec::with_capacity(names.len() + 2);
    manual.push(groups.auto.clone());
    manual.extend(names.iter().cloned());
    manual.push(DIRECT.to_string());

    let proxy_groups = vec![
        ProxyGroup::select(&groups.select, manual),
        ProxyGroup {
            name: groups.auto.clone(),
            kind: GroupKind::UrlTest,
            proxies: names,
            url: Some(options.health_check.url.clone()),
            interval: Some(options.health_check.interval),
            tolerance: Some(options.health_check.tolerance),
        },
        ProxyGroup::select(&groups.media, vec![groups.select.clone()]),
        ProxyGroup::select(
            &groups.fallback,
            vec![groups.select.clone(), DIRECT.to_string()],
        ),
    ];

    RoutingConfig {
        listen: options.listen.clone(),
        dns: options.dns.clone(),
        proxies,
        proxy_groups,
        rules: RuleSet::new(&options.domain_rules, &options.geoip_country, groups),
    }
}
