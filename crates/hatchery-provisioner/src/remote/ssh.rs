// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SSH implementation of the remote executor.
//!
//! Uses the blocking `ssh2` (libssh2) bindings on the tokio blocking pool, one
//! session per command. Password authentication only: the credential is the
//! root password set by cloud-init.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tracing::{debug, warn};

use super::shell::login_shell;
use super::traits::*;
use crate::poll::{RetryPolicy, retry_transient};
use crate::secret::SecretString;

/// Settings for [`SshExecutor`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Login user.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// TCP connect timeout per attempt.
    pub connect_timeout: Duration,
    /// Session I/O timeout per command.
    pub session_timeout: Duration,
    /// Readiness gate policies.
    pub readiness: ReadinessPolicies,
    /// Retry policy for connection failures.
    pub retry: RetryPolicy,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            connect_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(300),
            readiness: ReadinessPolicies::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Remote executor over SSH.
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    /// Create a new SSH executor.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn addr(&self, ip: Ipv4Addr) -> SocketAddr {
        SocketAddr::from((ip, self.config.port))
    }

    async fn exec_once(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        command: &str,
    ) -> Result<String> {
        let target = SessionTarget::new(self, ip, secret);
        let command = login_shell(command);

        tokio::task::spawn_blocking(move || {
            let session = target.connect()?;
            exec_blocking(&session, ip, &command)
        })
        .await
        .map_err(|e| RemoteError::Worker(e.to_string()))?
    }

    async fn upload_once(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        remote_path: &str,
        contents: &[u8],
        mode: i32,
    ) -> Result<()> {
        let target = SessionTarget::new(self, ip, secret);
        let remote_path = remote_path.to_string();
        let contents = contents.to_vec();

        tokio::task::spawn_blocking(move || {
            let session = target.connect()?;
            let broken = |e: std::io::Error| connection_error(ip, e);
            let mut channel = session
                .scp_send(Path::new(&remote_path), mode, contents.len() as u64, None)
                .map_err(|e| ssh_error(ip, e))?;
            channel.write_all(&contents).map_err(broken)?;
            channel.send_eof().map_err(|e| ssh_error(ip, e))?;
            channel.wait_eof().map_err(|e| ssh_error(ip, e))?;
            channel.close().map_err(|e| ssh_error(ip, e))?;
            channel.wait_close().map_err(|e| ssh_error(ip, e))?;
            Ok(())
        })
        .await
        .map_err(|e| RemoteError::Worker(e.to_string()))?
    }
}

/// Everything a blocking worker needs to open one session.
struct SessionTarget {
    addr: SocketAddr,
    ip: Ipv4Addr,
    user: String,
    secret: SecretString,
    connect_timeout: Duration,
    session_timeout: Duration,
}

impl SessionTarget {
    fn new(executor: &SshExecutor, ip: Ipv4Addr, secret: &SecretString) -> Self {
        Self {
            addr: executor.addr(ip),
            ip,
            user: executor.config.user.clone(),
            secret: secret.clone(),
            connect_timeout: executor.config.connect_timeout,
            session_timeout: executor.config.session_timeout,
        }
    }

    fn connect(&self) -> Result<Session> {
        let tcp = TcpStream::connect_timeout(&self.addr, self.connect_timeout)
            .map_err(|e| connection_error(self.ip, e))?;

        let mut session = Session::new().map_err(|e| ssh_error(self.ip, e))?;
        session.set_timeout(self.session_timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| ssh_error(self.ip, e))?;

        if session
            .userauth_password(&self.user, self.secret.expose())
            .is_err()
            || !session.authenticated()
        {
            return Err(RemoteError::Authentication(self.ip));
        }

        Ok(session)
    }
}

fn exec_blocking(session: &Session, ip: Ipv4Addr, command: &str) -> Result<String> {
    let mut channel = session.channel_session().map_err(|e| ssh_error(ip, e))?;
    channel.exec(command).map_err(|e| ssh_error(ip, e))?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| connection_error(ip, e))?;
    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| connection_error(ip, e))?;

    channel.wait_close().map_err(|e| ssh_error(ip, e))?;
    let exit_code = channel.exit_status().map_err(|e| ssh_error(ip, e))?;

    if exit_code != 0 {
        return Err(RemoteError::CommandFailed {
            exit_code,
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(stdout)
}

fn connection_error(host: Ipv4Addr, e: std::io::Error) -> RemoteError {
    RemoteError::Connection {
        host,
        message: e.to_string(),
    }
}

fn ssh_error(host: Ipv4Addr, e: ssh2::Error) -> RemoteError {
    RemoteError::Connection {
        host,
        message: e.to_string(),
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn readiness(&self) -> ReadinessPolicies {
        self.config.readiness
    }

    async fn probe_port(&self, ip: Ipv4Addr) -> bool {
        let connect = tokio::net::TcpStream::connect(self.addr(ip));
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "Remote port not reachable yet");
                false
            }
            Err(_) => {
                debug!(ip = %ip, "Remote port probe timed out");
                false
            }
        }
    }

    async fn probe_auth(&self, ip: Ipv4Addr, secret: &SecretString) -> bool {
        let target = SessionTarget::new(self, ip, secret);
        let outcome = tokio::task::spawn_blocking(move || target.connect().map(|_| ())).await;

        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(ip = %ip, error = %e, "Remote credential not accepted yet");
                false
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "SSH auth probe worker failed");
                false
            }
        }
    }

    async fn run(&self, ip: Ipv4Addr, secret: &SecretString, command: &str) -> Result<String> {
        retry_transient(self.config.retry, "remote command", RemoteError::is_transient, move || {
            self.exec_once(ip, secret, command)
        })
        .await
    }

    async fn upload(
        &self,
        ip: Ipv4Addr,
        secret: &SecretString,
        remote_path: &str,
        contents: &[u8],
        mode: i32,
    ) -> Result<()> {
        retry_transient(self.config.retry, "remote upload", RemoteError::is_transient, move || {
            self.upload_once(ip, secret, remote_path, contents, mode)
        })
        .await?;

        debug!(ip = %ip, path = remote_path, bytes = contents.len(), "Uploaded file");
        Ok(())
    }
}
