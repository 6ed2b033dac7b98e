// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded provisioning work queue.
//!
//! [`ProvisionQueue::submit`] hands a created resource to the
//! [`ProvisionWorker`], which runs up to `max_concurrent` provisioning runs at
//! once. Runs cannot be cancelled; shutdown stops waiting for new jobs, then
//! finishes every job already accepted.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::compute::ResourceId;
use crate::error::{Error, Result};
use crate::orchestrator::Provisioner;
use crate::secret::SecretString;

/// A resource waiting to be provisioned.
#[derive(Debug)]
pub struct ProvisionJob {
    /// Compute resource id from `create_and_provision`.
    pub resource_id: ResourceId,
    /// Remote-access secret for the resource.
    pub secret: SecretString,
    /// Tenant the resource belongs to.
    pub tenant_id: String,
}

/// Queue sizing.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Jobs that may wait before `submit` reports [`Error::QueueFull`].
    pub capacity: usize,
    /// Provisioning runs executing at once.
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            max_concurrent: 8,
        }
    }
}

/// Submitting half of the queue.
#[derive(Clone)]
pub struct ProvisionQueue {
    sender: mpsc::Sender<ProvisionJob>,
}

impl ProvisionQueue {
    /// Create a queue and the worker that consumes it.
    ///
    /// The worker does nothing until [`ProvisionWorker::run`] is spawned.
    pub fn new(provisioner: Arc<Provisioner>, config: QueueConfig) -> (Self, ProvisionWorker) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let worker = ProvisionWorker {
            provisioner,
            receiver,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            shutdown: Arc::new(Notify::new()),
        };
        (Self { sender }, worker)
    }

    /// Enqueue a job without waiting.
    pub fn submit(&self, job: ProvisionJob) -> Result<()> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                warn!(resource_id = job.resource_id, "Provisioning queue full");
                Error::QueueFull
            }
            TrySendError::Closed(_) => Error::QueueClosed,
        })
    }

    /// Free slots in the queue.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }
}

/// Consumes the queue and runs provisioning jobs.
pub struct ProvisionWorker {
    provisioner: Arc<Provisioner>,
    receiver: mpsc::Receiver<ProvisionJob>,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
    shutdown: Arc<Notify>,
}

impl ProvisionWorker {
    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the worker loop until shutdown is signalled or every queue handle
    /// is dropped.
    pub async fn run(mut self) {
        info!(
            capacity = self.config.capacity,
            max_concurrent = self.config.max_concurrent,
            "Provision worker started"
        );

        let mut running = JoinSet::new();
        loop {
            while let Some(result) = running.try_join_next() {
                log_join(result);
            }

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                job = self.receiver.recv() => job,
            };

            match job {
                Some(job) => self.spawn(&mut running, job, permit),
                None => {
                    info!("All queue handles dropped");
                    break;
                }
            }
        }

        // Accepted jobs already own a compute resource; finish them.
        self.receiver.close();
        let mut drained = 0usize;
        while let Some(job) = self.receiver.recv().await {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                error!(resource_id = job.resource_id, "Worker semaphore closed, dropping job");
                continue;
            };
            self.spawn(&mut running, job, permit);
            drained += 1;
        }

        info!(
            in_flight = running.len(),
            drained, "Provision worker shutting down, waiting for running jobs"
        );
        while let Some(result) = running.join_next().await {
            log_join(result);
        }
        info!("Provision worker stopped");
    }

    fn spawn(&self, running: &mut JoinSet<()>, job: ProvisionJob, permit: OwnedSemaphorePermit) {
        let provisioner = self.provisioner.clone();
        running.spawn(async move {
            let _permit = permit;
            let ProvisionJob {
                resource_id,
                secret,
                tenant_id,
            } = job;
            match provisioner
                .provision_resource(resource_id, secret, &tenant_id)
                .await
            {
                Ok(view) => info!(
                    resource_id,
                    tenant_id = %tenant_id,
                    url = %view.public_gateway_url,
                    "Provisioning job finished"
                ),
                Err(e) => error!(
                    resource_id,
                    tenant_id = %tenant_id,
                    error = %e,
                    "Provisioning job failed"
                ),
            }
        });
    }
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Provisioning task panicked: {}", e);
    }
}
