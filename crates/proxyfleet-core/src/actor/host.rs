//! `HostActor`: Per-host provisioning
//!
//! Drives the pipeline for a single host: connect, clean up the competing
//! service, install the backend if needed, configure it and read back the
//! connection link.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use proxyfleet_exec::{CommandResult, ConnectionEstablisher, ExecError, RemoteExecutor};
use proxyfleet_link::{LinkMatch, ProtocolKind, find_link};

use crate::backend::{self, InstallCheck, ProtocolPresence};
use crate::config::{Backend, HostSpec, HysteriaSettings, ProvisionProfile};
use crate::error::ProvisionError;
use crate::message::{FleetEvent, GetState, Outcome, Provision, ProvisioningResult};
use crate::state::NodeState;

/// Arguments for spawning a `HostActor`
pub struct HostActorArgs {
    pub host: HostSpec,
    pub profile: Arc<ProvisionProfile>,
    pub establisher: ConnectionEstablisher,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<FleetEvent>,
}

/// Per-host actor running the provisioning state machine
pub struct HostActor {
    host: HostSpec,
    profile: Arc<ProvisionProfile>,
    establisher: ConnectionEstablisher,
    event_tx: broadcast::Sender<FleetEvent>,
    state: NodeState,
    /// Open session, released when the pipeline ends
    session: Option<Arc<dyn RemoteExecutor>>,
    warnings: Vec<String>,
    result: Option<ProvisioningResult>,
}

impl HostActor {
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.host.alias
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Transition to a new state and emit an event
    ///
    /// Transitions are driven by the pipeline itself, so an invalid one is a bug.
    fn transition_to(&mut self, new_state: NodeState) {
        debug_assert!(
            self.state.can_transition_to(new_state),
            "invalid transition {} -> {new_state}",
            self.state
        );

        let old_state = self.state;
        self.state = new_state;

        info!(host = %self.host.alias, from = %old_state, to = %new_state, "state transition");

        let _ = self.event_tx.send(FleetEvent::HostStateChanged {
            host: self.host.alias.clone(),
            from: old_state,
            to: new_state,
        });
    }

    /// Record a non-fatal problem
    fn warn_step(&mut self, step: &str, detail: impl std::fmt::Display) {
        warn!(host = %self.host.alias, step, detail = %detail, "step failed, continuing");
        self.warnings.push(format!("{step}: {detail}"));
    }

    fn session(&self) -> Result<Arc<dyn RemoteExecutor>, ProvisionError> {
        self.session
            .clone()
            .ok_or(ProvisionError::Connection(ExecError::NotConnected))
    }

    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.run_for(cmd, self.profile.timeouts.command).await
    }

    async fn run_for(&self, cmd: &str, timeout: Duration) -> Result<CommandResult, ExecError> {
        let session = self
            .session
            .as_ref()
            .ok_or(ExecError::NotConnected)?;
        debug!(host = %self.host.alias, cmd, "running command");
        session.run_with_timeout(cmd, timeout).await
    }

    /// Run a command whose failure is only recorded as a warning
    async fn run_lenient(&mut self, step: &str, cmd: &str) {
        match self.run(cmd).await {
            Ok(result) if result.success() => {}
            Ok(result) => {
                let detail = format!("`{cmd}` exited {}: {}", result.status, result.failure_detail());
                self.warn_step(step, detail);
            }
            Err(e) => self.warn_step(step, format!("`{cmd}`: {e}")),
        }
    }

    /// Run a command that must succeed, mapping failure with `fatal`
    async fn run_required(
        &self,
        cmd: &str,
        timeout: Duration,
        fatal: fn(String) -> ProvisionError,
    ) -> Result<CommandResult, ProvisionError> {
        match self.run_for(cmd, timeout).await {
            Ok(result) if result.success() => Ok(result),
            Ok(result) => Err(fatal(format!(
                "`{cmd}` exited {}: {}",
                result.status,
                result.failure_detail()
            ))),
            Err(e) => Err(fatal(format!("`{cmd}`: {e}"))),
        }
    }

    async fn connect(&mut self) -> Result<(), ProvisionError> {
        self.transition_to(NodeState::Connecting);

        let info = self
            .host
            .connection_info()
            .with_connect_timeout(self.profile.timeouts.connect);
        let session = self
            .establisher
            .establish(&info)
            .await
            .map_err(ProvisionError::Connection)?;
        self.session = Some(session);
        Ok(())
    }

    async fn cleanup(&mut self) {
        self.transition_to(NodeState::CleaningUp);
        let cmd = backend::cleanup_command(&self.profile.backend);
        self.run_lenient("cleanup", &cmd).await;
    }

    async fn ensure_installed(&mut self) -> Result<(), ProvisionError> {
        self.transition_to(NodeState::Installing);

        let check = backend::install_check_command(&self.profile.backend);
        let result = self
            .run(&check)
            .await
            .map_err(|e| ProvisionError::Install(format!("`{check}`: {e}")))?;

        if InstallCheck::from_result(&result) == InstallCheck::Installed {
            info!(host = %self.host.alias, backend = self.profile.backend.name(), "already installed");
            return Ok(());
        }

        info!(host = %self.host.alias, backend = self.profile.backend.name(), "installing");
        for cmd in backend::install_commands(&self.profile.backend) {
            self.run_required(&cmd, self.profile.timeouts.install, ProvisionError::Install)
                .await?;
        }
        Ok(())
    }

    async fn configure(&mut self) -> Result<(), ProvisionError> {
        self.transition_to(NodeState::Configuring);

        for cmd in backend::firewall_commands(self.profile.listen_port) {
            self.run_lenient("firewall", &cmd).await;
        }

        let profile = Arc::clone(&self.profile);
        match &profile.backend {
            Backend::SingBox {
                protocol,
                reality_server_name,
            } => self.configure_sing_box(*protocol, reality_server_name).await,
            Backend::Hysteria(settings) => self.configure_hysteria(settings).await,
        }
    }

    async fn configure_sing_box(
        &mut self,
        protocol: ProtocolKind,
        reality_server_name: &str,
    ) -> Result<(), ProvisionError> {
        let port = self.profile.listen_port;

        let presence = match self.run("sb info").await {
            Ok(result) => ProtocolPresence::detect(&result, protocol),
            Err(e) => {
                self.warn_step("sb info", &e);
                ProtocolPresence::Absent
            }
        };

        match presence {
            ProtocolPresence::Configured => {
                info!(host = %self.host.alias, %protocol, port, "protocol present, enforcing port");
                let cmd = backend::sb_change_port_command(protocol, port);
                self.run_lenient("port", &cmd).await;
                Ok(())
            }
            ProtocolPresence::Absent => {
                info!(host = %self.host.alias, %protocol, port, "adding protocol");
                let cmd = backend::sb_add_command(protocol, port, reality_server_name);
                self.run_required(&cmd, self.profile.timeouts.command, ProvisionError::Configure)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn configure_hysteria(&mut self, settings: &HysteriaSettings) -> Result<(), ProvisionError> {
        let config = backend::render_hysteria_config(settings, self.profile.listen_port);
        let session = self.session()?;
        session
            .upload_with_timeout(config.as_bytes(), backend::HYSTERIA_CONFIG, self.profile.timeouts.command)
            .await
            .map_err(|e| ProvisionError::Configure(format!("upload {}: {e}", backend::HYSTERIA_CONFIG)))?;

        self.run_required(
            &backend::hysteria_restart_command(),
            self.profile.timeouts.command,
            ProvisionError::Configure,
        )
        .await
        .map(|_| ())
    }

    async fn extract(&mut self) -> Result<String, ProvisionError> {
        self.transition_to(NodeState::Extracting);

        let profile = Arc::clone(&self.profile);
        match &profile.backend {
            Backend::SingBox { protocol, .. } => {
                let cmd = backend::sb_url_command(*protocol);
                let result = self
                    .run_required(&cmd, self.profile.timeouts.command, ProvisionError::Extraction)
                    .await?;
                match find_link(&result.stdout) {
                    LinkMatch::Found(link) => Ok(link),
                    LinkMatch::NotFound => Err(ProvisionError::Extraction(format!(
                        "no link in `{cmd}` output"
                    ))),
                }
            }
            Backend::Hysteria(settings) => {
                self.run_required(
                    &backend::hysteria_active_command(),
                    self.profile.timeouts.command,
                    ProvisionError::Extraction,
                )
                .await?;

                Ok(backend::hysteria_record(
                    settings,
                    &self.host.alias,
                    &self.host.address,
                    self.profile.listen_port,
                )
                .to_uri())
            }
        }
    }

    async fn run_pipeline(&mut self) -> Result<String, ProvisionError> {
        self.connect().await?;
        self.cleanup().await;
        self.ensure_installed().await?;
        self.configure().await?;
        self.extract().await
    }

    async fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect().await {
                warn!(host = %self.host.alias, error = %e, "disconnect failed");
            }
        }
    }

    fn finish(&mut self, outcome: Result<String, ProvisionError>) -> ProvisioningResult {
        let outcome = match outcome {
            Ok(link) => {
                self.transition_to(NodeState::Succeeded);
                info!(host = %self.host.alias, link = %link, "host provisioned");
                Outcome::Success { link }
            }
            Err(error) => {
                let stage = self.state;
                error!(host = %self.host.alias, stage = %stage, error = %error, "host failed");
                self.transition_to(NodeState::Failed);
                Outcome::Failed { stage, error }
            }
        };

        let _ = self.event_tx.send(FleetEvent::HostFinished {
            host: self.host.alias.clone(),
            success: matches!(outcome, Outcome::Success { .. }),
        });

        ProvisioningResult {
            host: self.host.clone(),
            outcome,
            warnings: std::mem::take(&mut self.warnings),
            finished_at: Utc::now(),
        }
    }
}

impl Actor for HostActor {
    type Args = HostActorArgs;
    type Error = ProvisionError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        debug!(host = %args.host.alias, id = %actor_ref.id(), "HostActor starting");

        Ok(Self {
            host: args.host,
            profile: args.profile,
            establisher: args.establisher,
            event_tx: args.event_tx,
            state: NodeState::Pending,
            session: None,
            warnings: Vec::new(),
            result: None,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        debug!(host = %self.host.alias, reason = ?reason, "HostActor stopping");
        self.release_session().await;
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Provision> for HostActor {
    type Reply = ProvisioningResult;

    async fn handle(
        &mut self,
        _msg: Provision,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Some(result) = &self.result {
            return result.clone();
        }

        let budget = self.profile.timeouts.pipeline;
        let outcome = match tokio::time::timeout(budget, self.run_pipeline()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProvisionError::Timeout { timeout: budget }),
        };

        self.release_session().await;

        let result = self.finish(outcome);
        self.result = Some(result.clone());
        result
    }
}

impl Message<GetState> for HostActor {
    type Reply = NodeState;

    async fn handle(
        &mut self,
        _msg: GetState,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.state
    }
}
