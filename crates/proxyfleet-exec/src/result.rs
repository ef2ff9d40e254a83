//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::SshCredential;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Stderr when present, stdout otherwise, trimmed for log lines
    #[must_use]
    pub fn failure_detail(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Connection information for SSH
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    pub port: u16,
    /// Username
    pub user: String,
    /// How to authenticate
    pub credential: SshCredential,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>, credential: SshCredential) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            credential,
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set TCP connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_failure_detail_prefers_stderr() {
        assert_eq!(result(1, "out", " boom \n").failure_detail(), "boom");
        assert_eq!(result(1, "only stdout\n", "").failure_detail(), "only stdout");
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(result(0, "a", "").combined_output(), "a");
        assert_eq!(result(0, "a", "b").combined_output(), "a\nb");
    }
}
