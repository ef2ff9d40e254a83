//! The routing configuration document

use serde::Serialize;

use crate::error::RoutingError;
use crate::options::{DnsSettings, ListenSettings};
use crate::proxy::ClashProxy;
use crate::rules::RuleSet;

/// Proxy group strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Select,
    UrlTest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub proxies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<u32>,
}

impl ProxyGroup {
    /// Manually selected group
    pub fn select(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: GroupKind::Select,
            proxies,
            url: None,
            interval: None,
            tolerance: None,
        }
    }
}

/// Clash Meta configuration for every provisioned node
///
/// Built by [`crate::aggregate`]. Field order is the document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingConfig {
    #[serde(flatten)]
    pub listen: ListenSettings,
    pub dns: DnsSettings,
    pub proxies: Vec<ClashProxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub rules: RuleSet,
}

impl RoutingConfig {
    /// Render as YAML
    ///
    /// # Errors
    /// Returns `RoutingError::Serialize` if serialization fails
    pub fn to_yaml(&self) -> Result<String, RoutingError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Proxy names in document order
    pub fn proxy_names(&self) -> impl Iterator<Item = &str> {
        self.proxies.iter().map(ClashProxy::name)
    }

    /// Look up a group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&ProxyGroup> {
        self.proxy_groups.iter().find(|g| g.name == name)
    }
}
