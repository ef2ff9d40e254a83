//! Remote executor and connector traits

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandResult, ConnectionInfo};

/// A live session on one host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and collect its output
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with `ExecError::Timeout` once `timeout` elapses
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Write `contents` to `remote_path`, replacing any existing file
    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), ExecError>;

    /// Upload, failing with `ExecError::Timeout` once `timeout` elapses
    async fn upload_with_timeout(
        &self,
        contents: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ExecError> {
        tokio::time::timeout(timeout, self.upload(contents, remote_path))
            .await
            .map_err(|_| ExecError::Timeout { timeout })?
    }

    /// Close the session. Calling it twice is a no-op.
    async fn disconnect(&self) -> Result<(), ExecError>;

    fn executor_type(&self) -> &'static str;
}

/// Opens sessions to hosts
#[async_trait]
pub trait Connector: Send + Sync {
    /// Make a single connection attempt
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts the upload and never finishes it
    struct StalledExecutor;

    #[async_trait]
    impl RemoteExecutor for StalledExecutor {
        async fn run(&self, _cmd: &str) -> Result<CommandResult, ExecError> {
            Err(ExecError::NotConnected)
        }

        async fn run_with_timeout(
            &self,
            _cmd: &str,
            _timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            Err(ExecError::NotConnected)
        }

        async fn upload(&self, _contents: &[u8], _remote_path: &str) -> Result<(), ExecError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ExecError> {
            Ok(())
        }

        fn executor_type(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_upload_with_timeout_gives_up() {
        let limit = Duration::from_millis(20);
        let err = StalledExecutor
            .upload_with_timeout(b"data", "/tmp/file", limit)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecError::Timeout { timeout } if timeout == limit));
    }
}
