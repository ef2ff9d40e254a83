//! Fleet-wide orchestration
//!
//! Runs one `HostActor` per host with bounded concurrency, then aggregates the
//! links of the hosts that succeeded and hands the result to a `Distributor`.

use std::sync::Arc;

use kameo::actor::Spawn;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use proxyfleet_exec::ConnectionEstablisher;
use proxyfleet_link::parse_link;
use proxyfleet_routing::{RoutingConfig, RoutingOptions, aggregate};

use crate::actor::host::{HostActor, HostActorArgs};
use crate::config::{HostSpec, ProvisionProfile};
use crate::distribute::Distributor;
use crate::error::{CoreError, ProvisionError};
use crate::message::{FleetEvent, Provision, ProvisioningResult};
use crate::state::NodeState;

/// Default number of hosts provisioned at once
pub const DEFAULT_PARALLELISM: usize = 3;

/// Per-host results of a run, each list in inventory order
#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    pub succeeded: Vec<ProvisioningResult>,
    pub failed: Vec<ProvisioningResult>,
}

impl FleetReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// `alias: link` lines for the succeeded hosts
    #[must_use]
    pub fn subscription_lines(&self) -> Vec<String> {
        self.succeeded
            .iter()
            .filter_map(|r| r.extracted_link().map(|link| format!("{}: {link}", r.host.alias)))
            .collect()
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct FleetOutcome {
    pub report: FleetReport,
    pub routing: RoutingConfig,
    /// Hosts whose link could not be parsed
    pub skipped_links: Vec<String>,
    /// `None` when publishing failed or no link was usable
    pub subscription_url: Option<String>,
}

/// Drives provisioning for a whole inventory
pub struct FleetOrchestrator {
    establisher: ConnectionEstablisher,
    profile: Arc<ProvisionProfile>,
    routing: RoutingOptions,
    parallelism: usize,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl FleetOrchestrator {
    pub fn new(establisher: ConnectionEstablisher, profile: ProvisionProfile, routing: RoutingOptions) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            establisher,
            profile: Arc::new(profile),
            routing,
            parallelism: DEFAULT_PARALLELISM,
            event_tx,
        }
    }

    /// Hosts provisioned at once, at least 1
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Get event receiver for progress reporting
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    fn spawn_host(&self, host: HostSpec, semaphore: &Arc<Semaphore>) -> JoinHandle<ProvisioningResult> {
        let semaphore = Arc::clone(semaphore);
        let args = HostActorArgs {
            host,
            profile: Arc::clone(&self.profile),
            establisher: self.establisher.clone(),
            event_tx: self.event_tx.clone(),
        };

        tokio::spawn(async move {
            let host = args.host.clone();
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return ProvisioningResult::failed(
                    host,
                    NodeState::Pending,
                    ProvisionError::Actor("scheduler closed".to_string()),
                );
            };

            let actor_ref = HostActor::spawn(args);
            let result = actor_ref
                .ask(Provision)
                .await
                .map_err(|e| ProvisionError::Actor(e.to_string()));
            actor_ref.stop_gracefully().await.ok();

            result.unwrap_or_else(|e| ProvisioningResult::failed(host, NodeState::Pending, e))
        })
    }

    /// Provision every host, at most `parallelism` at a time
    ///
    /// A failing or panicking host never affects the others.
    pub async fn provision_all(&self, hosts: &[HostSpec]) -> FleetReport {
        info!(hosts = hosts.len(), parallelism = self.parallelism, backend = self.profile.backend.name(), "starting fleet run");

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let handles: Vec<_> = hosts
            .iter()
            .map(|host| (host.clone(), self.spawn_host(host.clone(), &semaphore)))
            .collect();

        let mut report = FleetReport::default();
        for (host, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(host = %host.alias, error = %e, "host task panicked");
                    let _ = self.event_tx.send(FleetEvent::HostFinished {
                        host: host.alias.clone(),
                        success: false,
                    });
                    ProvisioningResult::failed(host, NodeState::Pending, ProvisionError::Actor(e.to_string()))
                }
            };

            if result.is_success() {
                report.succeeded.push(result);
            } else {
                report.failed.push(result);
            }
        }

        info!(
            total = report.total(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "fleet run finished"
        );
        report
    }

    /// Publish within the pipeline budget, logging failures
    async fn publish(
        &self,
        distributor: &dyn Distributor,
        routing: &RoutingConfig,
        target: &HostSpec,
    ) -> Option<String> {
        let budget = self.profile.timeouts.pipeline;
        match tokio::time::timeout(budget, distributor.publish(routing, target)).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(e)) => {
                warn!(host = %target.alias, error = %e, "could not publish routing config");
                None
            }
            Err(_) => {
                warn!(host = %target.alias, timeout = ?budget, "publishing routing config timed out");
                None
            }
        }
    }

    /// Provision, aggregate and publish
    ///
    /// # Errors
    /// Returns `CoreError::NoSuccessfulHosts` when every host failed; nothing is
    /// aggregated or published in that case. A document without proxies is
    /// never published.
    pub async fn run(&self, hosts: &[HostSpec], distributor: &dyn Distributor) -> Result<FleetOutcome, CoreError> {
        let report = self.provision_all(hosts).await;

        let Some(target) = report.succeeded.first().map(|r| r.host.clone()) else {
            error!(failed = report.failed.len(), "no host succeeded, skipping aggregation");
            return Err(CoreError::NoSuccessfulHosts {
                failed: report.failed.len(),
            });
        };

        let mut records = Vec::with_capacity(report.succeeded.len());
        let mut skipped_links = Vec::new();
        for result in &report.succeeded {
            let alias = &result.host.alias;
            match result.extracted_link().and_then(|link| parse_link(link, alias)) {
                Some(record) => records.push(record),
                None => skipped_links.push(alias.clone()),
            }
        }

        let routing = aggregate(&records, &self.routing);

        let subscription_url = if routing.proxies.is_empty() {
            warn!(
                skipped = skipped_links.len(),
                "no usable links, leaving the published subscription unchanged"
            );
            None
        } else {
            self.publish(distributor, &routing, &target).await
        };

        Ok(FleetOutcome {
            report,
            routing,
            skipped_links,
            subscription_url,
        })
    }
}
