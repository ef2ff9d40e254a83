//! Error types for proxyfleet-routing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    /// Document could not be rendered
    #[error("failed to serialize routing config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}
