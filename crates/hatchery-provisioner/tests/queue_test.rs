// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Work queue and embeddable runtime tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, test_secrets};
use hatchery_provisioner::compute::{MockCompute, ResourceId};
use hatchery_provisioner::database::MockDatabaseProjects;
use hatchery_provisioner::dns::MockDns;
use hatchery_provisioner::error::Error;
use hatchery_provisioner::orchestrator::ProvisionSettings;
use hatchery_provisioner::pairing::MockPairing;
use hatchery_provisioner::queue::{ProvisionJob, ProvisionQueue, QueueConfig};
use hatchery_provisioner::remote::MockRemote;
use hatchery_provisioner::runtime::{ProvisionerRuntime, ProvisionerRuntimeBuilder};
use hatchery_provisioner::status::{Phase, ProvisioningStatus};
use hatchery_provisioner::store::{InMemoryTenantStore, TenantRecordStore};
use tokio::sync::broadcast;

async fn wait_for(
    updates: &mut broadcast::Receiver<ProvisioningStatus>,
    id: ResourceId,
    phase: Phase,
) -> ProvisioningStatus {
    loop {
        let status = updates.recv().await.expect("status channel");
        if status.resource_id == id && status.phase == phase {
            return status;
        }
    }
}

async fn job(harness: &Harness, name: &str, tenant: &str) -> ProvisionJob {
    let created = harness
        .provisioner
        .create_and_provision(name)
        .await
        .unwrap();
    ProvisionJob {
        resource_id: created.id,
        secret: created.secret,
        tenant_id: tenant.to_string(),
    }
}

// ============================================================================
// ProvisionQueue
// ============================================================================

#[tokio::test]
async fn test_submit_fails_when_full() {
    let harness = Harness::builder().build();
    let (queue, _worker) = ProvisionQueue::new(
        harness.provisioner.clone(),
        QueueConfig {
            capacity: 1,
            max_concurrent: 1,
        },
    );

    queue.submit(job(&harness, "a", "t1").await).unwrap();
    let second = queue.submit(job(&harness, "b", "t2").await);

    assert!(matches!(second, Err(Error::QueueFull)));
    assert_eq!(queue.available(), 0);
}

#[tokio::test]
async fn test_submit_fails_when_worker_dropped() {
    let harness = Harness::builder().build();
    let (queue, worker) = ProvisionQueue::new(harness.provisioner.clone(), QueueConfig::default());
    drop(worker);

    let result = queue.submit(job(&harness, "a", "t1").await);

    assert!(matches!(result, Err(Error::QueueClosed)));
}

#[tokio::test]
async fn test_worker_runs_submitted_job() {
    let harness = Harness::builder().build();
    let mut updates = harness.provisioner.registry().subscribe();
    let (queue, worker) = ProvisionQueue::new(harness.provisioner.clone(), QueueConfig::default());
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(worker.run());

    let job = job(&harness, "alice", "t1").await;
    let id = job.resource_id;
    queue.submit(job).unwrap();

    let status = wait_for(&mut updates, id, Phase::Complete).await;
    assert_eq!(status.name, "alice");
    assert!(harness.store.get("t1").await.unwrap().is_some());

    shutdown.notify_one();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_finishes_accepted_jobs() {
    let harness = Harness::builder()
        .compute(MockCompute::active_after(Duration::from_secs(10)))
        .build();
    let (queue, worker) = ProvisionQueue::new(
        harness.provisioner.clone(),
        QueueConfig {
            capacity: 4,
            max_concurrent: 1,
        },
    );
    let shutdown = worker.shutdown_handle();

    queue.submit(job(&harness, "a", "t1").await).unwrap();
    queue.submit(job(&harness, "b", "t2").await).unwrap();

    // Signalled before the worker even starts.
    shutdown.notify_one();
    worker.run().await;

    assert_eq!(harness.provisioner.get_status(42).unwrap().phase, Phase::Complete);
    assert_eq!(harness.provisioner.get_status(43).unwrap().phase, Phase::Complete);
    assert_eq!(harness.store.len().await, 2);
}

#[tokio::test]
async fn test_worker_survives_failed_job() {
    let harness = Harness::builder().dns(MockDns::failing()).build();
    let mut updates = harness.provisioner.registry().subscribe();
    let (queue, worker) = ProvisionQueue::new(harness.provisioner.clone(), QueueConfig::default());
    let shutdown = worker.shutdown_handle();
    let handle = tokio::spawn(worker.run());

    let first = job(&harness, "a", "t1").await;
    let first_id = first.resource_id;
    queue.submit(first).unwrap();
    wait_for(&mut updates, first_id, Phase::Failed).await;

    let second = job(&harness, "b", "t2").await;
    let second_id = second.resource_id;
    queue.submit(second).unwrap();
    wait_for(&mut updates, second_id, Phase::Failed).await;

    assert!(!handle.is_finished());
    shutdown.notify_one();
    handle.await.unwrap();
}

// ============================================================================
// ProvisionerRuntime
// ============================================================================

struct Mocks {
    compute: Arc<MockCompute>,
    store: Arc<InMemoryTenantStore>,
}

fn runtime_builder(compute: MockCompute, queue: QueueConfig) -> (Mocks, ProvisionerRuntimeBuilder) {
    let compute = Arc::new(compute);
    let store = Arc::new(InMemoryTenantStore::new());
    let builder = ProvisionerRuntime::builder()
        .compute(compute.clone())
        .dns(Arc::new(MockDns::new()))
        .remote(Arc::new(MockRemote::new()))
        .database_projects(Arc::new(MockDatabaseProjects::new()))
        .pairing(Arc::new(MockPairing::connected()))
        .store(store.clone())
        .tool_secrets(test_secrets())
        .settings(ProvisionSettings {
            default_tools: vec!["github".to_string()],
            ..ProvisionSettings::default()
        })
        .queue(queue);
    (Mocks { compute, store }, builder)
}

#[test]
fn test_runtime_build_requires_compute() {
    let result = ProvisionerRuntime::builder().build();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_runtime_launch_provisions() {
    let (mocks, builder) = runtime_builder(MockCompute::new(), QueueConfig::default());
    let runtime = builder.build().unwrap().start().await.unwrap();
    let mut updates = runtime.provisioner().registry().subscribe();

    let initial = runtime.launch("alice", "tenant-1").await.unwrap();
    assert_eq!(initial.resource_id, 42);
    assert_eq!(initial.phase, Phase::Creating);
    assert!(runtime.is_running());

    wait_for(&mut updates, 42, Phase::Complete).await;
    assert_eq!(runtime.status(42).unwrap().phase, Phase::Complete);
    assert!(mocks.store.get("tenant-1").await.unwrap().is_some());

    let report = runtime.teardown("tenant-1").await.unwrap();
    assert!(report.is_clean());
    assert!(!mocks.compute.exists(42).await);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_runtime_launch_when_full_deletes_resource() {
    let (mocks, builder) = runtime_builder(
        MockCompute::active_after(Duration::from_secs(10)),
        QueueConfig {
            capacity: 1,
            max_concurrent: 1,
        },
    );
    let runtime = builder.build().unwrap().start().await.unwrap();
    let mut updates = runtime.provisioner().registry().subscribe();

    // First job holds the only permit, second fills the queue.
    runtime.launch("a", "t1").await.unwrap();
    wait_for(&mut updates, 42, Phase::WaitingActive).await;
    runtime.launch("b", "t2").await.unwrap();

    let third = runtime.launch("c", "t3").await;

    assert!(matches!(third, Err(Error::QueueFull)));
    assert_eq!(mocks.compute.deleted().await, vec![44]);
    let status = runtime.status(44).unwrap();
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.error.unwrap().contains("full"));

    runtime.shutdown().await.unwrap();

    assert_eq!(mocks.store.len().await, 2);
    assert!(mocks.store.get("t3").await.unwrap().is_none());
}
