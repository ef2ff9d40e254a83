//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use chrono::{DateTime, Utc};
use kameo_macros::Reply;

use crate::config::HostSpec;
use crate::error::ProvisionError;
use crate::state::NodeState;

/// Run the provisioning pipeline
///
/// A host pipeline runs once; asking again returns the recorded result.
#[derive(Debug)]
pub struct Provision;

/// Get current pipeline state
#[derive(Debug)]
pub struct GetState;

/// How a host pipeline ended
#[derive(Debug, Clone)]
pub enum Outcome {
    Success { link: String },
    Failed {
        /// State the pipeline was in when it failed
        stage: NodeState,
        error: ProvisionError,
    },
}

/// Final record of one host pipeline
#[derive(Debug, Clone, Reply)]
pub struct ProvisioningResult {
    pub host: HostSpec,
    pub outcome: Outcome,
    /// Non-fatal problems met on the way
    pub warnings: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisioningResult {
    pub fn failed(host: HostSpec, stage: NodeState, error: ProvisionError) -> Self {
        Self {
            host,
            outcome: Outcome::Failed { stage, error },
            warnings: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    #[must_use]
    pub fn extracted_link(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { link } => Some(link),
            Outcome::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failed { stage, error } => Some(format!("{stage}: {error}")),
        }
    }
}

/// Progress notifications broadcast during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    HostStateChanged {
        host: String,
        from: NodeState,
        to: NodeState,
    },
    HostFinished { host: String, success: bool },
}
