//! Configuration types for hosts and provisioning runs

use std::collections::HashSet;
use std::time::Duration;

use proxyfleet_exec::{ConnectionInfo, SshCredential};
use proxyfleet_link::ProtocolKind;

use crate::error::CoreError;

/// One host of the fleet inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Unique name, also used as the proxy name
    pub alias: String,
    /// IP address or hostname for SSH connection
    pub address: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub credential: SshCredential,
}

impl HostSpec {
    /// Host with the default user (`root`) and port (22)
    pub fn new(
        alias: impl Into<String>,
        address: impl Into<String>,
        credential: SshCredential,
    ) -> Self {
        Self {
            alias: alias.into(),
            address: address.into(),
            ssh_user: "root".to_string(),
            ssh_port: 22,
            credential,
        }
    }

    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(&self.address, &self.ssh_user, self.credential.clone())
            .with_port(self.ssh_port)
    }

    /// Address formatted for use in a URL authority
    #[must_use]
    pub fn url_host(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        }
    }
}

/// Check an inventory before a run
///
/// # Errors
/// Returns `CoreError::Inventory` for an empty inventory, a blank alias or
/// address, or an alias used twice
pub fn validate_hosts(hosts: &[HostSpec]) -> Result<(), CoreError> {
    if hosts.is_empty() {
        return Err(CoreError::Inventory("inventory contains no hosts".to_string()));
    }

    let mut seen = HashSet::new();
    for (index, host) in hosts.iter().enumerate() {
        if host.alias.trim().is_empty() {
            return Err(CoreError::Inventory(format!("host #{} has an empty alias", index + 1)));
        }
        if host.address.trim().is_empty() {
            return Err(CoreError::Inventory(format!("host `{}` has an empty address", host.alias)));
        }
        if !seen.insert(host.alias.as_str()) {
            return Err(CoreError::Inventory(format!("duplicate alias `{}`", host.alias)));
        }
    }

    Ok(())
}

/// Proxy backend installed on every node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// 233boy sing-box script (`sb`); the link is queried from the node
    SingBox {
        protocol: ProtocolKind,
        /// Camouflage domain for REALITY
        reality_server_name: String,
    },
    /// Standalone hysteria2 server with a config file written by us
    Hysteria(HysteriaSettings),
}

impl Backend {
    /// Protocol of the links this backend produces
    #[must_use]
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            Backend::SingBox { protocol, .. } => *protocol,
            Backend::Hysteria(_) => ProtocolKind::Hysteria2,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::SingBox { .. } => "sing-box",
            Backend::Hysteria(_) => "hysteria",
        }
    }
}

/// Shared credentials and tuning for the hysteria backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HysteriaSettings {
    pub auth_password: String,
    pub obfs_password: String,
    /// Common name of the self-signed certificate and client SNI
    pub sni: String,
    pub up_mbps: u32,
    pub down_mbps: u32,
}

/// Time limits for remote work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect and SSH handshake, per attempt
    pub connect: Duration,
    /// Any single command or upload
    pub command: Duration,
    /// Install procedures
    pub install: Duration,
    /// A whole host pipeline
    pub pipeline: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(20),
            command: Duration::from_secs(120),
            install: Duration::from_secs(600),
            pipeline: Duration::from_secs(900),
        }
    }
}

/// Everything a host pipeline needs besides the host itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionProfile {
    pub backend: Backend,
    /// Port the proxy listens on
    pub listen_port: u16,
    pub timeouts: Timeouts,
}

impl ProvisionProfile {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            listen_port: 443,
            timeouts: Timeouts::default(),
        }
    }
}
