//! Publishing the routing config as a subscription

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use proxyfleet_exec::{ConnectionEstablisher, RemoteExecutor, shell_quote};
use proxyfleet_routing::RoutingConfig;

use crate::config::{HostSpec, Timeouts};
use crate::error::CoreError;

/// Makes a routing config reachable by clients
#[async_trait]
pub trait Distributor: Send + Sync {
    /// Publish `config` on `target` and return the subscription URL
    async fn publish(&self, config: &RoutingConfig, target: &HostSpec) -> Result<String, CoreError>;
}

/// Where the document is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionSettings {
    /// Local copy of the document
    pub local_path: PathBuf,
    /// Directory served by nginx on the target
    pub web_root: String,
    /// File name under `web_root`, also the URL path
    pub file_name: String,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("clash_meta_config.yaml"),
            web_root: "/var/www/html".to_string(),
            file_name: "subscribe.yaml".to_string(),
        }
    }
}

impl DistributionSettings {
    #[must_use]
    pub fn remote_path(&self) -> String {
        format!("{}/{}", self.web_root.trim_end_matches('/'), self.file_name)
    }

    #[must_use]
    pub fn url_for(&self, target: &HostSpec) -> String {
        format!("http://{}/{}", target.url_host(), self.file_name)
    }
}

/// Serves the document from nginx on one of the provisioned hosts
pub struct SshDistributor {
    establisher: ConnectionEstablisher,
    settings: DistributionSettings,
    timeouts: Timeouts,
}

impl SshDistributor {
    pub fn new(establisher: ConnectionEstablisher, settings: DistributionSettings, timeouts: Timeouts) -> Self {
        Self {
            establisher,
            settings,
            timeouts,
        }
    }

    async fn required(&self, session: &dyn RemoteExecutor, cmd: &str) -> Result<(), CoreError> {
        self.required_for(session, cmd, self.timeouts.command).await
    }

    async fn required_for(
        &self,
        session: &dyn RemoteExecutor,
        cmd: &str,
        timeout: std::time::Duration,
    ) -> Result<(), CoreError> {
        let result = session
            .run_with_timeout(cmd, timeout)
            .await
            .map_err(|e| CoreError::Distribution(format!("`{cmd}`: {e}")))?;
        if result.success() {
            Ok(())
        } else {
            Err(CoreError::Distribution(format!(
                "`{cmd}` exited {}: {}",
                result.status,
                result.failure_detail()
            )))
        }
    }

    async fn lenient(&self, session: &dyn RemoteExecutor, cmd: &str) {
        if let Err(e) = self.required(session, cmd).await {
            warn!(error = %e, "continuing");
        }
    }

    async fn ensure_nginx(&self, session: &dyn RemoteExecutor) -> Result<(), CoreError> {
        let installed = session
            .run_with_timeout("command -v nginx", self.timeouts.command)
            .await
            .map(|r| r.success())
            .unwrap_or(false);

        if !installed {
            info!("installing nginx");
            self.required_for(
                session,
                "export DEBIAN_FRONTEND=noninteractive; apt-get update && apt-get install -y nginx",
                self.timeouts.install,
            )
            .await?;
        }

        self.required(session, "systemctl start nginx && systemctl enable nginx")
            .await?;
        self.required(session, &format!("mkdir -p {}", shell_quote(&self.settings.web_root)))
            .await?;
        self.lenient(session, "ufw allow 80/tcp").await;
        Ok(())
    }

    async fn publish_on(&self, session: &dyn RemoteExecutor, document: &str) -> Result<(), CoreError> {
        self.ensure_nginx(session).await?;

        let remote_path = self.settings.remote_path();
        session
            .upload_with_timeout(document.as_bytes(), &remote_path, self.timeouts.command)
            .await
            .map_err(|e| CoreError::Distribution(format!("upload {remote_path}: {e}")))?;
        self.lenient(session, &format!("chmod 644 {}", shell_quote(&remote_path)))
            .await;
        Ok(())
    }
}

#[async_trait]
impl Distributor for SshDistributor {
    async fn publish(&self, config: &RoutingConfig, target: &HostSpec) -> Result<String, CoreError> {
        let document = config
            .to_yaml()
            .map_err(|e| CoreError::Serialization(e.to_string()))?;

        tokio::fs::write(&self.settings.local_path, &document)
            .await
            .map_err(|e| {
                CoreError::Distribution(format!("write {}: {e}", self.settings.local_path.display()))
            })?;
        info!(path = %self.settings.local_path.display(), "wrote routing config");

        let session: Arc<dyn RemoteExecutor> = self
            .establisher
            .establish(&target.connection_info().with_connect_timeout(self.timeouts.connect))
            .await
            .map_err(|e| CoreError::Distribution(format!("connect to {}: {e}", target.alias)))?;

        let budget = self.timeouts.pipeline;
        let published = tokio::time::timeout(budget, self.publish_on(session.as_ref(), &document))
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::Distribution(format!("publishing timed out after {budget:?}")))
            });

        if let Err(e) = session.disconnect().await {
            warn!(host = %target.alias, error = %e, "disconnect failed");
        }
        published?;

        let url = self.settings.url_for(target);
        info!(host = %target.alias, url = %url, "subscription published");
        Ok(url)
    }
}
