// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock remote executor for testing.
//!
//! Readiness is simulated on the tokio clock. Uploaded files land in a
//! virtual filesystem so `cat <path>` reads them back. Commands can be made to
//! fail or return canned output by substring.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::traits::*;
use crate::secret::SecretString;

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    /// Destination path.
    pub path: String,
    /// Bytes written.
    pub contents: Vec<u8>,
    /// Permission bits.
    pub mode: i32,
}

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    exit_code: i32,
    stderr: String,
    remaining: Option<u32>,
}

/// Mock remote executor for testing.
pub struct MockRemote {
    created_at: Instant,
    port_ready_after: Duration,
    auth_ready_after: Duration,
    commands: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<RecordedUpload>>>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pinned: Arc<Mutex<HashSet<String>>>,
    failures: Arc<Mutex<Vec<FailureRule>>>,
    readiness: ReadinessPolicies,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Create a mock whose host is reachable and accepts credentials immediately.
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            port_ready_after: Duration::ZERO,
            auth_ready_after: Duration::ZERO,
            commands: Arc::new(Mutex::new(Vec::new())),
            uploads: Arc::new(Mutex::new(Vec::new())),
            files: Arc::new(Mutex::new(HashMap::new())),
            pinned: Arc::new(Mutex::new(HashSet::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            readiness: ReadinessPolicies::default(),
        }
    }

    /// Delay readiness, measured from when the mock was built.
    pub fn ready_after(port: Duration, auth: Duration) -> Self {
        Self {
            port_ready_after: port,
            auth_ready_after: auth,
            ..Self::new()
        }
    }

    /// Override readiness poll policies.
    pub fn with_readiness(mut self, readiness: ReadinessPolicies) -> Self {
        self.readiness = readiness;
        self
    }

    /// Make every command containing `needle` exit non-zero with `stderr`.
    pub async fn fail_on(&self, needle: &str, exit_code: i32, stderr: &str) {
        self.failures.lock().await.push(FailureRule {
            needle: needle.to_string(),
            exit_code,
            stderr: stderr.to_string(),
            remaining: None,
        });
    }

    /// Like [`fail_on`](Self::fail_on) but only for the first `times` matches.
    pub async fn fail_times(&self, needle: &str, times: u32, stderr: &str) {
        self.failures.lock().await.push(FailureRule {
            needle: needle.to_string(),
            exit_code: 1,
            stderr: stderr.to_string(),
            remaining: Some(times),
        });
    }

    /// Overwrite a file in the virtual filesystem.
    pub async fn put_file(&self, path: &str, contents: &[u8]) {
        self.files
            .lock()
            .await
            .insert(path.to_string(), contents.to_vec());
    }

    /// Fix a file's content; later uploads to `path` are recorded but not applied.
    pub async fn pin_file(&self, path: &str, contents: &[u8]) {
        self.put_file(path, contents).await;
        self.pinned.lock().await.insert(path.to_string());
    }

    /// Commands run, in call order.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    /// Uploads made, in call order.
    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().await.clone()
    }

    /// Current content of a file in the virtual filesystem.
    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    async fn check_failure(&self, command: &str) -> Option<RemoteError> {
        let mut failures = self.failures.lock().await;
        for rule in failures.iter_mut() {
            if !command.contains(&rule.needle) {
                continue;
            }
            match rule.remaining.as_mut() {
                Some(0) => continue,
                Some(n) => *n -= 1,
                None => {}
            }
            return Some(RemoteError::CommandFailed {
                exit_code: rule.exit_code,
                stderr: rule.stderr.clone(),
            });
        }
        None
    }
}

#[async_trait]
impl RemoteExecutor for MockRemote {
    fn readiness(&self) -> ReadinessPolicies {
        self.readiness
    }

    async fn probe_port(&self, _ip: Ipv4Addr) -> bool {
        self.created_at.elapsed() >= self.port_ready_after
    }

    async fn probe_auth(&self, _ip: Ipv4Addr, _secret: &SecretString) -> bool {
        self.created_at.elapsed() >= self.auth_ready_after
    }

    async fn run(&self, _ip: Ipv4Addr, _secret: &SecretString, command: &str) -> Result<String> {
        self.commands.lock().await.push(command.to_string());

        if let Some(err) = self.check_failure(command).await {
            return Err(err);
        }

        if let Some(path) = command.strip_prefix("cat ") {
            let path = path.trim().trim_matches('\'');
            return match self.files.lock().await.get(path) {
                Some(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
                None => Err(RemoteError::CommandFailed {
                    exit_code: 1,
                    stderr: format!("cat: {path}: No such file or directory"),
                }),
            };
        }

        Ok(String::new())
    }

    async fn upload(
        &self,
        _ip: Ipv4Addr,
        _secret: &SecretString,
        remote_path: &str,
        contents: &[u8],
        mode: i32,
    ) -> Result<()> {
        self.uploads.lock().await.push(RecordedUpload {
            path: remote_path.to_string(),
            contents: contents.to_vec(),
            mode,
        });
        if self.pinned.lock().await.contains(remote_path) {
            return Ok(());
        }
        self.files
            .lock()
            .await
            .insert(remote_path.to_string(), contents.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

    #[tokio::test(start_paused = true)]
    async fn test_auth_lags_port() {
        let remote = MockRemote::ready_after(Duration::from_secs(15), Duration::from_secs(40));
        let secret = SecretString::new("pw");

        remote.wait_for_port_ready(IP).await.unwrap();
        assert!(!remote.probe_auth(IP, &secret).await);

        remote.wait_for_auth_ready(IP, &secret).await.unwrap();
        assert!(remote.created_at.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_upload_then_cat_reads_back() {
        let remote = MockRemote::new();
        let secret = SecretString::new("pw");

        remote
            .upload(IP, &secret, "/root/a.json", b"{\"x\":1}", 0o600)
            .await
            .unwrap();

        let out = remote.run(IP, &secret, "cat /root/a.json").await.unwrap();
        assert_eq!(out, "{\"x\":1}");
    }

    #[tokio::test]
    async fn test_fail_times_then_succeeds() {
        let remote = MockRemote::new();
        let secret = SecretString::new("pw");
        remote.fail_times("agentd health", 2, "starting").await;

        assert!(remote.run(IP, &secret, "agentd health").await.is_err());
        assert!(remote.run(IP, &secret, "agentd health").await.is_err());
        assert!(remote.run(IP, &secret, "agentd health").await.is_ok());
        assert_eq!(remote.commands().await.len(), 3);
    }
}
