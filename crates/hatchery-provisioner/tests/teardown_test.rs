// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant teardown tests.

mod common;

use common::{Harness, TENANT};
use hatchery_provisioner::compute::MockCompute;
use hatchery_provisioner::database::ProjectRef;
use hatchery_provisioner::error::Error;
use hatchery_provisioner::store::TenantRecordStore;
use hatchery_provisioner::teardown::TeardownStep;

#[tokio::test]
async fn test_teardown_removes_everything() {
    let harness = Harness::builder().build();
    let (created, result) = harness.provision("alice").await;
    result.unwrap();

    let report = harness.provisioner.teardown(TENANT).await.unwrap();

    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.tenant_id, TENANT);
    assert!(!harness.compute.exists(created.id).await);
    let project = ProjectRef::from("proj0001");
    assert!(!harness.databases.exists(&project).await);
    assert_eq!(harness.dns().deletes().await, vec!["alice".to_string()]);
    assert!(harness.store.get(TENANT).await.unwrap().is_none());
    assert!(
        harness
            .store
            .find_tenant_by_project(&project)
            .await
            .unwrap()
            .is_none()
    );
    assert!(harness.provisioner.get_status(created.id).is_none());
}

#[tokio::test]
async fn test_teardown_without_dns() {
    let harness = Harness::builder().without_dns().build();
    let (_, result) = harness.provision("alice").await;
    result.unwrap();

    let report = harness.provisioner.teardown(TENANT).await.unwrap();

    assert!(report.is_clean());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_teardown_unknown_tenant() {
    let harness = Harness::builder().build();

    let result = harness.provisioner.teardown("nobody").await;

    assert!(matches!(result, Err(Error::TenantNotFound(id)) if id == "nobody"));
}

#[tokio::test]
async fn test_teardown_collects_failures() {
    let mut compute = MockCompute::new();
    compute.fail_delete = true;
    let harness = Harness::builder().compute(compute).build();
    let (_, result) = harness.provision("alice").await;
    result.unwrap();

    let report = harness.provisioner.teardown(TENANT).await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, TeardownStep::Compute);

    // Later steps still ran.
    assert!(!harness.databases.exists(&ProjectRef::from("proj0001")).await);
    assert_eq!(harness.dns().deletes().await, vec!["alice".to_string()]);
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_teardown_twice_reports_not_found() {
    let harness = Harness::builder().build();
    let (_, result) = harness.provision("alice").await;
    result.unwrap();

    harness.provisioner.teardown(TENANT).await.unwrap();
    let second = harness.provisioner.teardown(TENANT).await;

    assert!(matches!(second, Err(Error::TenantNotFound(_))));
}
