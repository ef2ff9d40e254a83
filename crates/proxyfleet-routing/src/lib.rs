//! proxyfleet-routing: Client routing configuration
//!
//! Aggregates canonical proxy records into a single Clash Meta compatible
//! document with selection groups and ordered routing rules.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod options;
pub mod proxy;
pub mod rules;

pub use aggregate::aggregate;
pub use config::{GroupKind, ProxyGroup, RoutingConfig};
pub use error::RoutingError;
pub use options::{DnsSettings, GroupNames, HealthCheck, ListenSettings, RoutingOptions};
pub use proxy::{ClashProxy, ProxyProtocol};
pub use rules::{DIRECT, DomainMatch, DomainRule, RuleSet, RuleTarget, default_domain_rules};
