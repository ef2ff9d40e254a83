//! proxyfleet-exec: Remote execution abstraction
//!
//! Provides the executor trait, an SSH implementation built on russh and the
//! retrying connection establisher used by the provisioning pipeline.

pub mod error;
pub mod establish;
pub mod keys;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use establish::{ConnectionEstablisher, RetryPolicy};
pub use keys::SshCredential;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::{SshConnector, SshExecutor, shell_quote};
pub use traits::{Connector, RemoteExecutor};
