//! In-memory stand-ins for the external collaborators of the controller.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::broker::{AdminError, BrokerAdmin, ConsumerStats, SubscriptionStats, TopicStats};
use crate::cleaner::SecretStore;
use crate::config::Config;
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::grpc::MetricsData;
use crate::k8s::{ComponentRegistry, ReplicaPods};
use crate::state::{StorageClient, StorageConnector};
use crate::stats::{ChannelFactory, InstanceControl};
use mesh_core::authz::{Authorizer, ResourceRef, Subject};
use mesh_core::descriptor::{ComponentKind, ComponentSpec, InputSpec, JobDescriptor, JobIdentity};
use mesh_core::names;

/// An in-memory broker holding topics along with their subscriptions.
#[derive(Default)]
pub struct FakeBroker {
    topics: Mutex<BTreeMap<String, HashMap<String, SubscriptionStats>>>,
    packages: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, AdminError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBroker {
    /// Add a topic with the given subscription & its consumers.
    pub fn add_subscription(&self, topic: &str, subscription: &str, consumers: Vec<BTreeMap<String, String>>) {
        let consumers = consumers
            .into_iter()
            .enumerate()
            .map(|(idx, metadata)| ConsumerStats {
                consumer_name: format!("consumer-{}", idx),
                metadata,
            })
            .collect();
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .insert(subscription.to_string(), SubscriptionStats { msg_backlog: 0, consumers });
    }

    /// Add an uploaded package.
    pub fn add_package(&self, url: &str) {
        self.packages.lock().insert(url.to_string());
    }

    /// Fail every operation targeting the given topic, namespace or package with the given error.
    pub fn fail_on(&self, target: &str, err: AdminError) {
        self.failures.lock().insert(target.to_string(), err);
    }

    /// Stop failing operations targeting the given topic, namespace or package.
    pub fn heal(&self, target: &str) {
        self.failures.lock().remove(target);
    }

    /// All calls received so far, formatted as `{op} {target}`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Check if the given subscription still exists.
    pub fn has_subscription(&self, topic: &str, subscription: &str) -> bool {
        self.topics.lock().get(topic).map(|subs| subs.contains_key(subscription)).unwrap_or(false)
    }

    /// Check if the given topic still exists.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.lock().contains_key(topic)
    }

    fn record(&self, op: &str, target: &str) -> Result<(), AdminError> {
        self.calls.lock().push(format!("{} {}", op, target));
        match self.failures.lock().get(target) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BrokerAdmin for FakeBroker {
    async fn delete_subscription(&self, topic: &str, subscription: &str) -> Result<(), AdminError> {
        self.record("delete_subscription", topic)?;
        match self.topics.lock().get_mut(topic).and_then(|subs| subs.remove(subscription)) {
            Some(_) => Ok(()),
            None => Err(AdminError::NotFound(format!("subscription {} not found", subscription))),
        }
    }

    async fn unsubscribe_namespace(&self, namespace: &str, subscription: &str) -> Result<(), AdminError> {
        self.record("unsubscribe_namespace", namespace)?;
        let prefix = format!("persistent://{}/", namespace);
        for (_, subs) in self.topics.lock().iter_mut().filter(|(topic, _)| topic.starts_with(&prefix)) {
            subs.remove(subscription);
        }
        Ok(())
    }

    async fn delete_topic(&self, topic: &str, _force: bool) -> Result<(), AdminError> {
        self.record("delete_topic", topic)?;
        match self.topics.lock().remove(topic) {
            Some(_) => Ok(()),
            None => Err(AdminError::NotFound(format!("topic {} not found", topic))),
        }
    }

    async fn topic_stats(&self, topic: &str) -> Result<TopicStats, AdminError> {
        match self.topics.lock().get(topic) {
            Some(subs) => Ok(TopicStats {
                subscriptions: subs.clone(),
                ..Default::default()
            }),
            None => Err(AdminError::NotFound(format!("topic {} not found", topic))),
        }
    }

    async fn delete_package(&self, package_url: &str) -> Result<(), AdminError> {
        self.record("delete_package", package_url)?;
        if self.packages.lock().remove(package_url) {
            return Ok(());
        }
        Err(AdminError::Http {
            code: 404,
            message: format!("package {} not found", package_url),
        })
    }
}

/// An in-memory secret store.
#[derive(Default)]
pub struct FakeSecrets {
    secrets: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeSecrets {
    pub fn add(&self, name: &str) {
        self.secrets.lock().insert(name.to_string());
    }

    /// The names of all secrets which were deleted.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn delete_secret(&self, name: &str) -> AppResult<()> {
        if self.secrets.lock().remove(name) {
            self.deleted.lock().push(name.to_string());
        }
        Ok(())
    }
}

/// A storage connector wrapping another connector, counting connects & optionally failing them.
pub struct CountingConnector {
    inner: Option<Arc<dyn StorageConnector>>,
    connects: AtomicUsize,
}

impl CountingConnector {
    /// A connector delegating to the given connector.
    pub fn new(inner: Arc<dyn StorageConnector>) -> Self {
        Self {
            inner: Some(inner),
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose every connect fails.
    pub fn failing() -> Self {
        Self {
            inner: None,
            connects: AtomicUsize::new(0),
        }
    }

    /// The number of connects attempted so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageConnector for CountingConnector {
    async fn connect(&self, client_name: &str) -> Result<Arc<dyn StorageClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(inner) => inner.connect(client_name).await,
            None => bail!("state storage service is unreachable"),
        }
    }
}

/// The behavior of a fake replica.
#[derive(Clone, Debug)]
pub enum ReplicaBehavior {
    /// Reply with the given metrics.
    Reply(MetricsData),
    /// Fail the call.
    Fail,
    /// Reply with default metrics after the given delay.
    Hang(Duration),
}

/// A channel factory whose channels are served by fake replicas keyed by address.
#[derive(Default)]
pub struct FakeChannelFactory {
    replicas: Mutex<HashMap<String, ReplicaBehavior>>,
    opened: Mutex<Vec<String>>,
}

impl FakeChannelFactory {
    /// Register the behavior of the replica at the given address.
    pub fn add_replica(&self, address: &str, behavior: ReplicaBehavior) {
        self.replicas.lock().insert(address.to_string(), behavior);
    }

    /// The addresses of all channels opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl ChannelFactory for FakeChannelFactory {
    fn open(&self, address: &str, port: u16) -> Result<Box<dyn InstanceControl>> {
        self.opened.lock().push(format!("{}:{}", address, port));
        let behavior = self.replicas.lock().get(address).cloned().unwrap_or(ReplicaBehavior::Fail);
        Ok(Box::new(FakeStub { behavior }))
    }
}

struct FakeStub {
    behavior: ReplicaBehavior,
}

#[async_trait]
impl InstanceControl for FakeStub {
    async fn fetch_metrics(&mut self) -> Result<MetricsData, tonic::Status> {
        match &self.behavior {
            ReplicaBehavior::Reply(data) => Ok(data.clone()),
            ReplicaBehavior::Fail => Err(tonic::Status::unavailable("replica unreachable")),
            ReplicaBehavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(MetricsData::default())
            }
        }
    }
}

/// Build replica metrics with the given received total.
pub fn metrics_data(received_total: i64) -> MetricsData {
    MetricsData {
        received_total,
        processed_successfully_total: received_total,
        avg_process_latency: 2.0,
        last_invocation: 1_600_000_000_000,
        received_total_1min: received_total / 2,
        ..Default::default()
    }
}

/// A storage connector handing out an already opened client.
pub struct StaticConnector {
    client: Arc<dyn StorageClient>,
}

impl StaticConnector {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageConnector for StaticConnector {
    async fn connect(&self, _client_name: &str) -> Result<Arc<dyn StorageClient>> {
        Ok(self.client.clone())
    }
}

/// An in-memory component registry.
#[derive(Default)]
pub struct FakeRegistry {
    components: Mutex<HashMap<(ComponentKind, String), (JobDescriptor, ReplicaPods)>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeRegistry {
    /// Register a deployed component along with its replica pods.
    pub fn add(&self, descriptor: JobDescriptor, replicas: ReplicaPods) {
        let key = (descriptor.kind(), descriptor.identity.fully_qualified_name());
        self.components.lock().insert(key, (descriptor, replicas));
    }

    /// The fully qualified names of all deleted components.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ComponentRegistry for FakeRegistry {
    async fn fetch_descriptor(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<JobDescriptor> {
        self.components
            .lock()
            .get(&(kind, identity.fully_qualified_name()))
            .map(|(descriptor, _)| descriptor.clone())
            .ok_or_else(|| AppError::NotFound(format!("{} {} doesn't exist", kind, identity)))
    }

    async fn delete_component(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<()> {
        if self.components.lock().remove(&(kind, identity.fully_qualified_name())).is_some() {
            self.deleted.lock().push(identity.fully_qualified_name());
        }
        Ok(())
    }

    async fn list_replicas(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<ReplicaPods> {
        self.components
            .lock()
            .get(&(kind, identity.fully_qualified_name()))
            .map(|(_, replicas)| replicas.clone())
            .ok_or_else(|| AppError::NotFound(format!("{} {} doesn't exist", kind, identity)))
    }
}

/// An authorizer denying every subject.
pub struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn is_authorized(&self, _subject: &Subject, _resource: ResourceRef<'_>) -> Result<bool> {
        Ok(false)
    }
}

/// Build a function descriptor with subscription cleanup over the given exact topics.
pub fn function_descriptor(tenant: &str, namespace: &str, name: &str, cleanup: bool, topics: &[&str]) -> JobDescriptor {
    JobDescriptor::new(
        JobIdentity::new(tenant, namespace, name),
        ComponentSpec::Function(InputSpec {
            cleanup_subscription_on_delete: cleanup,
            subscription_name: None,
            topics: topics.iter().map(|topic| topic.to_string()).collect(),
            topic_pattern: None,
        }),
    )
}

/// Open a table store with the state table of the given function created.
pub async fn setup_state_table(config: Arc<Config>, tenant: &str, namespace: &str, name: &str) -> Result<Database> {
    let db = Database::new(config).await?;
    let state_namespace = names::state_namespace(tenant, namespace);
    db.create_namespace(&state_namespace).await?;
    db.create_table(&state_namespace, name).await?;
    Ok(db)
}
