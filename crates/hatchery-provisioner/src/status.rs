// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory provisioning status registry.
//!
//! One entry per resource id, written only by the orchestrator run for that
//! id and read as cloned snapshots. Entries are lost on process restart; a run
//! that was in flight at that point leaves no status behind.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::compute::ResourceId;
use crate::error::{Error, Result};

/// Provisioning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Compute resource being created.
    Creating,
    /// Waiting for the resource and the database project to come up.
    WaitingActive,
    /// Waiting for the remote port and credential.
    WaitingSsh,
    /// Writing runtime config and the tool bundle, starting services.
    Configuring,
    /// Creating the DNS record.
    Dns,
    /// Checking runtime health and installing hook triggers.
    Verifying,
    /// Installing the reverse proxy and firewall.
    Nginx,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Failed,
}

impl Phase {
    /// Progress reported while in this phase.
    ///
    /// A pure function of the phase. Along the success path it only grows;
    /// `FAILED` maps to 0.0, so a failed run ends below the progress it had
    /// reached. The failure point is kept in the status message and error.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Creating => 0.0,
            Self::WaitingActive => 0.1,
            Self::WaitingSsh => 0.25,
            Self::Configuring => 0.45,
            Self::Dns => 0.65,
            Self::Verifying => 0.8,
            Self::Nginx => 0.9,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::WaitingActive => "WAITING_ACTIVE",
            Self::WaitingSsh => "WAITING_SSH",
            Self::Configuring => "CONFIGURING",
            Self::Dns => "DNS",
            Self::Verifying => "VERIFYING",
            Self::Nginx => "NGINX",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningStatus {
    /// Compute resource id.
    pub resource_id: ResourceId,
    /// Display name.
    pub name: String,
    /// Current phase.
    pub phase: Phase,
    /// Always `phase.progress()`.
    pub progress: f32,
    /// Public address, once known.
    pub ip_address: Option<Ipv4Addr>,
    /// DNS label, once created.
    pub subdomain: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Error detail when failed.
    pub error: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Concurrent status table with change notifications.
pub struct StatusRegistry {
    entries: DashMap<ResourceId, ProvisioningStatus>,
    changes: broadcast::Sender<ProvisioningStatus>,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    /// Snapshot of a resource's status.
    pub fn get(&self, id: ResourceId) -> Option<ProvisioningStatus> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no resources are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningStatus> {
        self.changes.subscribe()
    }

    pub(crate) fn begin(&self, id: ResourceId, name: &str) -> ProvisioningStatus {
        let status = ProvisioningStatus {
            resource_id: id,
            name: name.to_string(),
            phase: Phase::Creating,
            progress: Phase::Creating.progress(),
            ip_address: None,
            subdomain: None,
            message: format!("Creating {name}"),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.entries.insert(id, status.clone());
        let _ = self.changes.send(status.clone());
        status
    }

    /// Move a `CREATING` entry to `WAITING_ACTIVE` and return its name.
    ///
    /// The check and the transition happen under the entry lock, so at most
    /// one run ever starts per resource.
    pub(crate) fn claim(&self, id: ResourceId, message: &str) -> Result<String> {
        let snapshot = {
            let mut entry = self.entries.get_mut(&id).ok_or(Error::ResourceNotFound(id))?;
            let status = entry.value_mut();
            if status.phase != Phase::Creating {
                return Err(Error::AlreadyStarted {
                    id,
                    phase: status.phase,
                });
            }
            status.phase = Phase::WaitingActive;
            status.progress = Phase::WaitingActive.progress();
            status.message = message.to_string();
            status.clone()
        };
        let name = snapshot.name.clone();
        let _ = self.changes.send(snapshot);
        Ok(name)
    }

    fn update(&self, id: ResourceId, apply: impl FnOnce(&mut ProvisioningStatus)) {
        let snapshot = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                apply(entry.value_mut());
                entry.value().clone()
            }
            None => return,
        };
        let _ = self.changes.send(snapshot);
    }

    pub(crate) fn transition(&self, id: ResourceId, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |s| {
            s.phase = phase;
            s.progress = phase.progress();
            s.message = message;
        });
    }

    pub(crate) fn set_ip(&self, id: ResourceId, ip: Ipv4Addr) {
        self.update(id, |s| s.ip_address = Some(ip));
    }

    pub(crate) fn set_subdomain(&self, id: ResourceId, subdomain: &str) {
        self.update(id, |s| s.subdomain = Some(subdomain.to_string()));
    }

    pub(crate) fn complete(&self, id: ResourceId, message: impl Into<String>) {
        let message = message.into();
        self.update(id, |s| {
            s.phase = Phase::Complete;
            s.progress = Phase::Complete.progress();
            s.message = message;
            s.completed_at = Some(Utc::now());
        });
    }

    pub(crate) fn fail(&self, id: ResourceId, message: impl Into<String>, error: impl Into<String>) {
        let message = message.into();
        let error = error.into();
        self.update(id, |s| {
            s.phase = Phase::Failed;
            s.progress = Phase::Failed.progress();
            s.message = message;
            s.error = Some(error);
            s.completed_at = Some(Utc::now());
        });
    }

    pub(crate) fn remove(&self, id: ResourceId) -> Option<ProvisioningStatus> {
        self.entries.remove(&id).map(|(_, status)| status)
    }
}
