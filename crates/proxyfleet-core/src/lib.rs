//! proxyfleet-core: Provisioning pipeline and fleet orchestration
//!
//! Implements the per-host `HostActor` using the kameo framework, the
//! `FleetOrchestrator` that fans it out over an inventory, and the
//! `Distributor` that publishes the aggregated routing config.

pub mod actor;
pub mod backend;
pub mod config;
pub mod distribute;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod state;

pub use actor::host::{HostActor, HostActorArgs};
pub use backend::{InstallCheck, ProtocolPresence};
pub use config::{Backend, HostSpec, HysteriaSettings, ProvisionProfile, Timeouts, validate_hosts};
pub use distribute::{DistributionSettings, Distributor, SshDistributor};
pub use error::{CoreError, ProvisionError};
pub use message::{FleetEvent, GetState, Outcome, Provision, ProvisioningResult};
pub use orchestrator::{DEFAULT_PARALLELISM, FleetOrchestrator, FleetOutcome, FleetReport};
pub use state::NodeState;
