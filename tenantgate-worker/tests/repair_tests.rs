/// Repair worker tests
///
/// Run against the in-memory stores, so no services are required.

use std::sync::Arc;
use std::time::Duration;
use tenantgate_shared::coordinator::{RegisterTenant, TenantCoordinator};
use tenantgate_shared::identity::{IdentityStore, MemoryIdentityStore, ProvisioningState};
use tenantgate_shared::provision::MemoryProvisioner;
use tenantgate_shared::schema::ColumnType;
use tenantgate_shared::TenantError;
use tenantgate_worker::repair::{RepairConfig, RepairSummary, RepairWorker};
use uuid::Uuid;

struct Fixture {
    identity: Arc<MemoryIdentityStore>,
    provisioner: Arc<MemoryProvisioner>,
    coordinator: Arc<TenantCoordinator>,
}

fn fixture() -> Fixture {
    let identity = Arc::new(MemoryIdentityStore::new());
    let provisioner = Arc::new(MemoryProvisioner::new());
    Fixture {
        coordinator: Arc::new(TenantCoordinator::new(identity.clone(), provisioner.clone())),
        identity,
        provisioner,
    }
}

fn config(batch_size: usize) -> RepairConfig {
    RepairConfig {
        poll_interval: Duration::from_millis(10),
        batch_size,
        stale_after: Duration::from_secs(60),
        max_concurrency: 2,
    }
}

/// Registers a tenant whose provisioning fails, leaving it incomplete
async fn register_incomplete(fixture: &Fixture, email: &str) -> Uuid {
    fixture.provisioner.fail_next_provision();
    let result = fixture
        .coordinator
        .register_tenant(RegisterTenant {
            name: "Test Client".to_string(),
            phone: "1234567890".to_string(),
            email: email.to_string(),
            schema: [("username", "text"), ("password", "text")].into_iter().collect(),
            primary_key_field: "username".to_string(),
            secret_field: None,
        })
        .await;

    match result {
        Err(TenantError::ProvisioningIncomplete { tenant_id, .. }) => tenant_id,
        other => panic!("expected ProvisioningIncomplete, got {:?}", other),
    }
}

async fn state_of(fixture: &Fixture, tenant_id: Uuid) -> ProvisioningState {
    fixture
        .identity
        .find_by_id(tenant_id)
        .await
        .unwrap()
        .unwrap()
        .provisioning_state
}

#[tokio::test]
async fn test_run_once_with_nothing_to_do() {
    let fixture = fixture();
    let worker = RepairWorker::new(fixture.coordinator.clone(), config(10));

    assert_eq!(worker.run_once().await.unwrap(), RepairSummary::default());
}

#[tokio::test]
async fn test_run_once_repairs_incomplete_tenant() {
    let fixture = fixture();
    let tenant_id = register_incomplete(&fixture, "a@example.com").await;
    assert_eq!(state_of(&fixture, tenant_id).await, ProvisioningState::Incomplete);

    let worker = RepairWorker::new(fixture.coordinator.clone(), config(10));
    let summary = worker.run_once().await.unwrap();

    assert_eq!(summary.repaired, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(state_of(&fixture, tenant_id).await, ProvisioningState::Active);
    assert!(fixture.provisioner.columns(tenant_id).is_some());

    // Nothing left on the next pass
    assert_eq!(worker.run_once().await.unwrap().attempted(), 0);
}

#[tokio::test]
async fn test_run_once_respects_batch_size() {
    let fixture = fixture();
    for i in 0..3 {
        register_incomplete(&fixture, &format!("t{}@example.com", i)).await;
    }

    let worker = RepairWorker::new(fixture.coordinator.clone(), config(2));

    assert_eq!(worker.run_once().await.unwrap().repaired, 2);
    assert_eq!(worker.run_once().await.unwrap().repaired, 1);
    assert_eq!(worker.run_once().await.unwrap().attempted(), 0);
}

#[tokio::test]
async fn test_failed_repair_is_retried_next_pass() {
    let fixture = fixture();
    let tenant_id = register_incomplete(&fixture, "a@example.com").await;
    let worker = RepairWorker::new(fixture.coordinator.clone(), config(10));

    fixture.provisioner.set_unavailable(true);
    let summary = worker.run_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_tenants, vec![tenant_id]);
    assert_eq!(state_of(&fixture, tenant_id).await, ProvisioningState::Incomplete);

    fixture.provisioner.set_unavailable(false);
    let summary = worker.run_once().await.unwrap();
    assert_eq!(summary.repaired, 1);
    assert_eq!(state_of(&fixture, tenant_id).await, ProvisioningState::Active);
}

#[tokio::test]
async fn test_unrepairable_tenant_does_not_block_others() {
    let fixture = fixture();
    let stuck = register_incomplete(&fixture, "stuck@example.com").await;
    let healthy = register_incomplete(&fixture, "healthy@example.com").await;

    // Same columns, wrong key: repair can never succeed for this tenant
    fixture.provisioner.create_table(
        stuck,
        vec![
            ("username".to_string(), ColumnType::Text),
            ("password".to_string(), ColumnType::Text),
        ],
        "password",
    );

    let worker = RepairWorker::new(fixture.coordinator.clone(), config(1));

    let first = worker.run_once().await.unwrap();
    assert_eq!(first.failed_tenants, vec![stuck]);

    let second = worker.run_once().await.unwrap();
    assert_eq!(second.repaired, 1);
    assert_eq!(state_of(&fixture, healthy).await, ProvisioningState::Active);

    // The stuck tenant keeps cycling without starving anyone
    let third = worker.run_once().await.unwrap();
    assert_eq!(third.failed_tenants, vec![stuck]);
    assert_eq!(state_of(&fixture, stuck).await, ProvisioningState::Incomplete);
}

#[tokio::test]
async fn test_identity_outage_fails_the_pass() {
    let fixture = fixture();
    register_incomplete(&fixture, "a@example.com").await;
    fixture.identity.set_unavailable(true);

    let worker = RepairWorker::new(fixture.coordinator.clone(), config(10));
    assert!(matches!(worker.run_once().await, Err(TenantError::Storage(_))));
}

#[tokio::test]
async fn test_run_repairs_then_stops_on_shutdown() {
    let fixture = fixture();
    let tenant_id = register_incomplete(&fixture, "a@example.com").await;

    let worker = Arc::new(RepairWorker::new(fixture.coordinator.clone(), config(10)));
    let token = worker.shutdown_token();
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    let mut repaired = false;
    for _ in 0..100 {
        if state_of(&fixture, tenant_id).await == ProvisioningState::Active {
            repaired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(repaired, "tenant was not repaired by the running worker");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after cancellation")
        .unwrap()
        .unwrap();
}
