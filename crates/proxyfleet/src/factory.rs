//! Wiring of SSH connectors, orchestrator and distributors from configuration

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use proxyfleet_core::{
    CoreError, Distributor, FleetOrchestrator, HostSpec, ProvisionProfile, SshDistributor,
};
use proxyfleet_exec::{ConnectionEstablisher, SshConnector};
use proxyfleet_routing::RoutingConfig;

use crate::config::Config;

/// Establisher backed by real SSH sessions
#[must_use]
pub fn establisher(config: &Config) -> ConnectionEstablisher {
    ConnectionEstablisher::new(Arc::new(SshConnector), config.ssh.retry_policy())
}

#[must_use]
pub fn orchestrator(config: &Config, profile: ProvisionProfile) -> FleetOrchestrator {
    FleetOrchestrator::new(establisher(config), profile, config.routing.clone())
        .with_parallelism(config.general.parallelism)
}

/// Distributor for this run
///
/// With distribution disabled the document is only written locally.
#[must_use]
pub fn distributor(config: &Config) -> Box<dyn Distributor> {
    if config.distribution.enabled {
        Box::new(SshDistributor::new(
            establisher(config),
            config.distribution.settings(),
            config.timeouts(),
        ))
    } else {
        Box::new(LocalDistributor {
            path: config.distribution.local_path.clone(),
        })
    }
}

/// Writes the document to disk and reports it as a `file://` URL
pub struct LocalDistributor {
    pub path: PathBuf,
}

#[async_trait]
impl Distributor for LocalDistributor {
    async fn publish(&self, config: &RoutingConfig, _target: &HostSpec) -> Result<String, CoreError> {
        let yaml = config
            .to_yaml()
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, yaml)
            .await
            .map_err(|e| CoreError::Distribution(format!("write {}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), "routing config written locally");
        let path = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use proxyfleet_exec::SshCredential;
    use proxyfleet_routing::{RoutingOptions, aggregate};

    use super::*;

    #[test]
    fn test_orchestrator_uses_configured_parallelism() {
        let mut config = Config::default();
        config.general.parallelism = 7;
        let profile = config.provision_profile().unwrap();
        assert_eq!(orchestrator(&config, profile).parallelism(), 7);
    }

    #[tokio::test]
    async fn test_local_distributor_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clash.yaml");
        let distributor = LocalDistributor { path: path.clone() };

        let routing = aggregate(&[], &RoutingOptions::default());
        let target = HostSpec::new("h", "198.51.100.1", SshCredential::Password("p".into()));
        let url = distributor.publish(&routing, &target).await.unwrap();

        assert_eq!(url, format!("file://{}", path.display()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), routing.to_yaml().unwrap());
    }
}
