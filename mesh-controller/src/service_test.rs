use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::database::{Database, StorageError};
use crate::error::AppError;
use crate::fixtures::{self, DenyAll, FakeBroker, FakeChannelFactory, FakeRegistry, FakeSecrets, ReplicaBehavior, StaticConnector};
use crate::k8s::ReplicaPods;
use crate::service::{Dependencies, MeshComponents};
use crate::state::{StateValue, StorageConnector};
use crate::utils;
use mesh_core::authz::{AllowAll, Authorizer, Subject};
use mesh_core::descriptor::ComponentKind;

struct Harness {
    registry: Arc<FakeRegistry>,
    broker: Arc<FakeBroker>,
    channels: Arc<FakeChannelFactory>,
    db: Database,
    service: MeshComponents,
}

async fn harness(config: Arc<Config>, authorizer: Arc<dyn Authorizer>) -> Result<Harness> {
    let db = fixtures::setup_state_table(config.clone(), "t1", "n1", "f1").await?;
    let registry = Arc::new(FakeRegistry::default());
    let broker = Arc::new(FakeBroker::default());
    let channels = Arc::new(FakeChannelFactory::default());
    let deps = Dependencies {
        registry: registry.clone(),
        broker: broker.clone(),
        secrets: Arc::new(FakeSecrets::default()),
        authorizer,
        channels: channels.clone(),
        storage: Some(Arc::new(StaticConnector::new(Arc::new(db.clone()))) as Arc<dyn StorageConnector>),
    };
    Ok(Harness {
        registry,
        broker,
        channels,
        db,
        service: MeshComponents::new(config, deps),
    })
}

fn replicas(count: u32) -> ReplicaPods {
    ReplicaPods {
        owner: "f1-0a1b2c3d-function".into(),
        subdomain: "f1-0a1b2c3d-function-headless".into(),
        namespace: "default".into(),
        replicas: count,
        pods: (0..count).map(|idx| format!("f1-0a1b2c3d-function-{}", idx)).collect(),
    }
}

#[tokio::test]
async fn deregister_deletes_component_and_tears_it_down() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let h = harness(config, Arc::new(AllowAll)).await?;
    h.registry.add(fixtures::function_descriptor("t1", "n1", "f1", true, &["persistent://t1/n1/in"]), replicas(1));
    h.broker.add_subscription("persistent://t1/n1/in", "t1/n1/f1", vec![]);

    let report = h.service.deregister(ComponentKind::Function, "t1", "n1", "f1", &Subject::default()).await?;

    assert!(report.is_complete(), "expected teardown to be complete, got {:?}", report);
    assert_eq!(report.executed().count(), 2, "unexpected outcomes {:?}", report.outcomes);
    assert_eq!(h.registry.deleted(), vec!["t1/n1/f1".to_string()]);
    assert!(!h.broker.has_subscription("persistent://t1/n1/in", "t1/n1/f1"), "expected subscription to be deleted");
    let res = h.db.get_table_tree("t1_n1", "f1").await;
    assert!(matches!(res, Err(StorageError::StreamNotFound(_))), "expected state table to be deleted");
    Ok(())
}

#[tokio::test]
async fn deregister_of_unknown_component_still_deletes_state() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let h = harness(config, Arc::new(AllowAll)).await?;

    let res = h.service.deregister(ComponentKind::Function, "t1", "n1", "f1", &Subject::default()).await;

    assert!(matches!(res, Err(AppError::NotFound(_))), "expected not found error, got {:?}", res);
    assert!(h.registry.deleted().is_empty(), "expected nothing to be deleted from the registry");
    let res = h.db.get_table_tree("t1_n1", "f1").await;
    assert!(matches!(res, Err(StorageError::StreamNotFound(_))), "expected state table to be deleted");
    Ok(())
}

#[tokio::test]
async fn operations_validate_parameters() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let h = harness(config, Arc::new(AllowAll)).await?;

    let res = h.service.deregister(ComponentKind::Sink, "t1", "n1", "", &Subject::default()).await;
    assert!(
        matches!(res, Err(AppError::InvalidInput(ref msg)) if msg == "Sink name is not provided"),
        "unexpected result {:?}",
        res
    );
    let res = h.service.stats(ComponentKind::Source, "", "n1", "s1", &Subject::default()).await;
    assert!(
        matches!(res, Err(AppError::InvalidInput(ref msg)) if msg == "Tenant is not provided"),
        "unexpected result {:?}",
        res
    );
    let res = h.service.get_state(ComponentKind::Function, "t1", "n1", "f1", "", &Subject::default()).await;
    assert!(matches!(res, Err(AppError::InvalidInput(ref msg)) if msg == "Key is not provided"), "unexpected result {:?}", res);
    let res = h.service.get_state(ComponentKind::Sink, "t1", "n1", "", "k", &Subject::default()).await;
    assert!(
        matches!(res, Err(AppError::InvalidInput(ref msg)) if msg == "Sink name is not provided"),
        "unexpected result {:?}",
        res
    );
    let res = h
        .service
        .put_state(ComponentKind::Source, "t1", "n1", "", "k", StateValue::Text("v".into()), &Subject::default())
        .await;
    assert!(
        matches!(res, Err(AppError::InvalidInput(ref msg)) if msg == "Source name is not provided"),
        "unexpected result {:?}",
        res
    );
    Ok(())
}

#[tokio::test]
async fn unauthorized_callers_are_rejected() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let mut config = (*config).clone();
    config.authorization_enabled = true;
    config.superuser_roles = vec!["admin".into()];
    let h = harness(Arc::new(config), Arc::new(DenyAll)).await?;
    h.registry.add(fixtures::function_descriptor("t1", "n1", "f1", false, &[]), replicas(1));

    let res = h.service.deregister(ComponentKind::Function, "t1", "n1", "f1", &Subject::role("tenant-user")).await;
    assert!(matches!(res, Err(AppError::Unauthorized)), "expected unauthorized error, got {:?}", res);
    let res = h.service.get_state(ComponentKind::Function, "t1", "n1", "f1", "k", &Subject::default()).await;
    assert!(matches!(res, Err(AppError::Unauthorized)), "expected unauthorized error, got {:?}", res);
    assert!(h.registry.deleted().is_empty(), "expected nothing to be deleted by an unauthorized caller");

    let report = h.service.deregister(ComponentKind::Function, "t1", "n1", "f1", &Subject::role("admin")).await?;
    assert!(report.is_complete(), "expected super user teardown to be complete, got {:?}", report);
    assert_eq!(h.registry.deleted(), vec!["t1/n1/f1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn stats_are_aggregated_across_replicas() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let h = harness(config.clone(), Arc::new(AllowAll)).await?;
    let pods = replicas(3);
    h.registry.add(fixtures::function_descriptor("t1", "n1", "f1", false, &[]), pods.clone());
    for (idx, pod) in pods.pods.iter().enumerate().take(2) {
        let address = utils::pod_address(pod, &pods.subdomain, &pods.namespace, &config.cluster_domain);
        h.channels.add_replica(&address, ReplicaBehavior::Reply(fixtures::metrics_data(10 * (idx as i64 + 1))));
    }

    let stats = h.service.stats(ComponentKind::Function, "t1", "n1", "f1", &Subject::default()).await?;

    assert_eq!(h.channels.opened().len(), 3, "expected a channel per replica, got {:?}", h.channels.opened());
    assert_eq!(stats.instances.len(), 3, "expected an entry per replica, got {:?}", stats.instances);
    assert_eq!(stats.totals.received_total, 30, "unexpected received total");
    assert_eq!(stats.instances[2].totals.received_total, 0, "expected failed replica to keep its skeleton");
    assert_eq!(stats.totals.avg_process_latency, Some(2.0), "unexpected average latency");
    Ok(())
}

#[tokio::test]
async fn state_round_trips_through_the_service() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let h = harness(config, Arc::new(AllowAll)).await?;

    h.service
        .put_state(ComponentKind::Function, "t1", "n1", "f1", "greeting", StateValue::Text("hello".into()), &Subject::default())
        .await?;
    let entry = h.service.get_state(ComponentKind::Function, "t1", "n1", "f1", "greeting", &Subject::default()).await?;

    assert_eq!(entry.value, StateValue::Text("hello".into()));
    Ok(())
}

#[tokio::test]
async fn state_is_unavailable_without_storage() -> Result<()> {
    let (config, _tmpdir) = Config::new_test()?;
    let deps = Dependencies {
        registry: Arc::new(FakeRegistry::default()),
        broker: Arc::new(FakeBroker::default()),
        secrets: Arc::new(FakeSecrets::default()),
        authorizer: Arc::new(AllowAll),
        channels: Arc::new(FakeChannelFactory::default()),
        storage: None,
    };
    let service = MeshComponents::new(config, deps);

    let res = service.get_state(ComponentKind::Function, "t1", "n1", "f1", "k", &Subject::default()).await;

    assert!(matches!(res, Err(AppError::Unavailable(_))), "expected unavailable error, got {:?}", res);
    Ok(())
}
