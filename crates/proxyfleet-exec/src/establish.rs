//! Connection establishment with bounded retries

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ExecError;
use crate::result::ConnectionInfo;
use crate::traits::{Connector, RemoteExecutor};

/// Retry settings for opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Opens sessions through a `Connector`, retrying failed attempts
#[derive(Clone)]
pub struct ConnectionEstablisher {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
}

impl ConnectionEstablisher {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connect to `info.host`, sleeping `policy.delay` between failed attempts
    ///
    /// The caller owns the returned session and must disconnect it.
    ///
    /// # Errors
    /// Returns the error of the last attempt once all attempts are used, or
    /// immediately for errors that cannot succeed on retry
    pub async fn establish(
        &self,
        info: &ConnectionInfo,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.connector.connect(info).await {
                Ok(executor) => {
                    if attempt > 1 {
                        info!(host = %info.host, attempt, "connected after retry");
                    }
                    return Ok(executor);
                }
                Err(e) => {
                    warn!(
                        host = %info.host,
                        port = info.port,
                        attempt,
                        max_attempts,
                        error = %e,
                        "connection attempt failed"
                    );

                    if attempt >= max_attempts || !e.is_retryable() {
                        return Err(e);
                    }
                }
            }

            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }
}
