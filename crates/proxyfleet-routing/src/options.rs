//! Routing document options
//!
//! Loaded from the `[routing]` table of the config file. Every field has a
//! default, and the defaults reproduce the stock document.

use serde::{Deserialize, Serialize};

use crate::rules::{DomainRule, default_domain_rules};

/// Options for [`crate::aggregate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingOptions {
    pub listen: ListenSettings,
    pub dns: DnsSettings,
    pub groups: GroupNames,
    pub health_check: HealthCheck,
    /// Country routed directly by the GEOIP rule
    pub geoip_country: String,
    pub domain_rules: Vec<DomainRule>,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            listen: ListenSettings::default(),
            dns: DnsSettings::default(),
            groups: GroupNames::default(),
            health_check: HealthCheck::default(),
            geoip_country: "CN".to_string(),
            domain_rules: default_domain_rules(),
        }
    }
}

/// Local proxy listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListenSettings {
    /// Mixed HTTP proxy port
    pub port: u16,
    pub socks_port: u16,
    pub allow_lan: bool,
    pub mode: String,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_controller: Option<String>,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            port: 7890,
            socks_port: 7891,
            allow_lan: true,
            mode: "Rule".to_string(),
            log_level: "info".to_string(),
            external_controller: Some("127.0.0.1:9090".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DnsSettings {
    pub enable: bool,
    pub listen: String,
    pub ipv6: bool,
    pub enhanced_mode: String,
    pub fake_ip_range: String,
    pub nameserver: Vec<String>,
}

impl Default for DnsSettings {
    fn default() -> Self {
        Self {
            enable: true,
            listen: "0.0.0.0:53".to_string(),
            ipv6: false,
            enhanced_mode: "fake-ip".to_string(),
            fake_ip_range: "198.18.0.1/16".to_string(),
            nameserver: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "https://dns.google/dns-query".to_string(),
            ],
        }
    }
}

/// Proxy group names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupNames {
    /// Manual selection
    pub select: String,
    /// Latency based selection
    pub auto: String,
    pub media: String,
    /// Target of the final MATCH rule
    pub fallback: String,
}

impl GroupNames {
    /// All names, in document order
    #[must_use]
    pub fn all(&self) -> [&str; 4] {
        [
            self.select.as_str(),
            self.auto.as_str(),
            self.media.as_str(),
            self.fallback.as_str(),
        ]
    }
}

impl Default for GroupNames {
    fn default() -> Self {
        Self {
            select: "🚀 节点选择".to_string(),
            auto: "♻️ 自动选择".to_string(),
            media: "🌍 国外媒体".to_string(),
            fallback: "🐟 漏网之鱼".to_string(),
        }
    }
}

/// Health check used by the auto selection group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub url: String,
    /// Seconds between checks
    pub interval: u32,
    /// Latency difference in ms below which the current node is kept
    pub tolerance: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            url: "http://www.gstatic.com/generate_204".to_string(),
            interval: 300,
            tolerance: 50,
        }
    }
}
