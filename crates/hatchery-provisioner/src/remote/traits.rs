// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Remote executor trait definitions.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use crate::poll::{DeadlineExceeded, PollPolicy, poll_until};
use crate::secret::SecretString;

/// Errors from remote command execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// Could not reach the host or the session broke mid-command.
    #[error("Connection to {host} failed: {message}")]
    Connection {
        /// Target host.
        host: Ipv4Addr,
        /// Underlying failure.
        message: String,
    },

    /// The host rejected the credential.
    #[error("Authentication to {0} rejected")]
    Authentication(Ipv4Addr),

    /// The command ran and exited non-zero.
    #[error("Remote command exited with status {exit_code}: {stderr}")]
    CommandFailed {
        /// Exit status.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A readiness probe never succeeded.
    #[error(transparent)]
    NotReady(#[from] DeadlineExceeded),

    /// The blocking SSH worker panicked or was cancelled.
    #[error("SSH worker failed: {0}")]
    Worker(String),
}

impl RemoteError {
    /// Whether this failure is about reaching the host rather than the command itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Whether this is a "unit not found" style failure from the service manager.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_ascii_lowercase();
                stderr.contains("not found") || stderr.contains("could not be found")
            }
            _ => false,
        }
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Poll policies for the two readiness gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicies {
    /// TCP reachability of the remote port.
    pub port: PollPolicy,
    /// Full credential acceptance.
    pub auth: PollPolicy,
}

impl Default for ReadinessPolicies {
    fn default() -> Self {
        Self {
            port: PollPolicy::from_secs(2, 120),
            auth: PollPolicy::from_secs(5, 180),
        }
    }
}

/// Trait for remote command channels.
///
/// Implementations provide single-shot probes; the readiness waits are
/// deadline-bounded loops over those probes.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Policies used by [`wait_for_port_ready`](Self::wait_for_port_ready) and
    /// [`wait_for_auth_ready`](Self::wait_for_auth_ready).
    fn readiness(&self) -> ReadinessPolicies {
        ReadinessPolicies::default()
    }

    /// One attempt at opening a TCP connection to the remote port.
    async fn probe_port(&self, ip: Ipv4Addr) -> bool;

    /// One attempt at a full authenticated session.
    async fn probe_auth(&self, ip: Ipv4Addr, secret: &SecretString) -> bool;

    /// Wait until the remote port accepts TCP connections.
    async fn wait_for_port_ready(&self, ip: Ipv4Addr) -> Result<()> {
        poll_until(self.readiness().port, "remote port", move || async move {
            self.probe_port(ip).await.then_some(())
        })
        .await?;
        Ok(())
    }

    /// Wait until the remote host accepts `secret`.
    ///
    /// A reachable port does not imply cloud-init has applied the credential.
    async fn wait_for_auth_ready(&self, ip: Ipv4Addr, secret: &SecretString) -> Result<()> {
        poll_until(self.readiness().auth, "remote authentication", move || async move {
            self.probe_auth(ip, secret).await.then_some(())
        })
        .await?;
        Ok(())
    }

    /// Run `command` in a login shell and return its standard output.
    ///
    /// Connection failures are retried; a non-zero exit is returned as
    /// [`RemoteError::CommandFailed`] without retrying.
    async fn run(&self, ip: Ipv4Addr, secret: &SecretString, command: &str) -> Result<String>;

    /// Write `contents` to `remote_path` with the given permission bits in one transfer.
    async fn upload(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        remote_path: &str,
        contents: &[u8],
        mode: i32,
    ) -> Result<()>;
}
