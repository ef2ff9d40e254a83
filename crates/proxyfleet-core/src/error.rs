//! Core error types for proxyfleet-core

use std::time::Duration;

use proxyfleet_exec::ExecError;
use thiserror::Error;

/// Why a single host pipeline failed
///
/// Host-local: recorded in the host's `ProvisioningResult`, never returned
/// from the fleet run.
#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    /// Host unreachable or authentication refused after all attempts
    #[error("connection failed: {0}")]
    Connection(#[source] ExecError),

    /// Remote install procedure failed
    #[error("install failed: {0}")]
    Install(String),

    /// Protocol configuration could not be applied
    #[error("configuration failed: {0}")]
    Configure(String),

    /// No usable link after configuration
    #[error("credential extraction failed: {0}")]
    Extraction(String),

    /// Pipeline exceeded its time budget
    #[error("pipeline timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Actor communication error
    #[error("actor communication error: {0}")]
    Actor(String),
}

/// Errors that abort a fleet run
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// No host finished provisioning, so there is nothing to aggregate
    #[error("no host was provisioned successfully ({failed} failed)")]
    NoSuccessfulHosts { failed: usize },

    /// Host inventory is unusable
    #[error("inventory error: {0}")]
    Inventory(String),

    /// Routing config could not be published
    #[error("distribution failed: {0}")]
    Distribution(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    Actor(String),
}
