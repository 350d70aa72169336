//! The Function Mesh components service.
//!
//! This is the surface an outer REST layer calls into. Every operation validates its parameters
//! and authorizes the caller before delegating to the core components.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::actions::ActionOutcome;
use crate::broker::BrokerAdmin;
use crate::cleaner::{ResourceCleaner, SecretStore, TableAdmin};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::k8s::{ComponentRegistry, K8sRegistry};
use crate::state::{SledConnector, StateEntry, StateStoreBridge, StateValue, StorageConnector};
use crate::stats::{self, ChannelFactory, ComponentStats, GrpcChannelFactory, InstanceStats, SharedStats, StatsAggregator};
use crate::teardown::{TeardownOrchestrator, TeardownReport};
use mesh_core::authz::{AllowAll, Authorizer, ResourceRef, Subject, SuperUserAuthorizer};
use mesh_core::descriptor::{ComponentKind, JobIdentity};

/// The collaborators of the components service.
pub struct Dependencies {
    /// The orchestration layer in which components are deployed.
    pub registry: Arc<dyn ComponentRegistry>,
    /// The broker admin client.
    pub broker: Arc<dyn BrokerAdmin>,
    /// The store of component secrets.
    pub secrets: Arc<dyn SecretStore>,
    /// The authorizer consulted for callers which are not super users.
    pub authorizer: Arc<dyn Authorizer>,
    /// The factory of replica channels.
    pub channels: Arc<dyn ChannelFactory>,
    /// The state storage connector, if state storage is configured.
    pub storage: Option<Arc<dyn StorageConnector>>,
}

/// Lifecycle, stats & state operations on deployed components.
pub struct MeshComponents {
    config: Arc<Config>,
    registry: Arc<dyn ComponentRegistry>,
    authorizer: Arc<dyn Authorizer>,
    teardown: TeardownOrchestrator,
    stats: StatsAggregator,
    state: Arc<StateStoreBridge>,
}

impl MeshComponents {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, deps: Dependencies) -> Self {
        let has_storage = deps.storage.is_some();
        let state = Arc::new(StateStoreBridge::new(deps.storage));
        let tables = if has_storage { Some(state.clone() as Arc<dyn TableAdmin>) } else { None };
        let cleaner = ResourceCleaner::new(deps.broker, tables, deps.secrets);
        let authorizer: Arc<dyn Authorizer> = if config.authorization_enabled {
            Arc::new(SuperUserAuthorizer::new(config.superuser_roles.clone(), deps.authorizer))
        } else {
            Arc::new(AllowAll)
        };
        Self {
            teardown: TeardownOrchestrator::new(&config, cleaner),
            stats: StatsAggregator::new(&config, deps.channels),
            registry: deps.registry,
            authorizer,
            state,
            config,
        }
    }

    /// Create a new instance talking to the K8s cluster the process runs in.
    pub async fn connect(config: Arc<Config>, broker: Arc<dyn BrokerAdmin>, authorizer: Arc<dyn Authorizer>) -> Result<Self> {
        let k8s = Arc::new(K8sRegistry::new(config.clone()).await?);
        let storage = config
            .state_storage_service_url
            .as_ref()
            .map(|_| Arc::new(SledConnector::new(config.clone())) as Arc<dyn StorageConnector>);
        let deps = Dependencies {
            registry: k8s.clone(),
            broker,
            secrets: k8s,
            authorizer,
            channels: Arc::new(GrpcChannelFactory),
            storage,
        };
        Ok(Self::new(config, deps))
    }

    /// The state store bridge of this service.
    pub fn state_store(&self) -> &Arc<StateStoreBridge> {
        &self.state
    }

    /// Deregister a component, deleting its resource & tearing down everything it owns.
    ///
    /// The returned report is advisory: teardown failures do not fail the call. When the component
    /// can not be fetched or deleted, its state table is still deleted before the error is
    /// returned.
    #[tracing::instrument(level = "debug", skip(self, subject))]
    pub async fn deregister(&self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, subject: &Subject) -> AppResult<TeardownReport> {
        let identity = JobIdentity::new(tenant, namespace, name);
        identity.validate(kind)?;
        self.authorize(subject, kind, &identity).await?;

        let descriptor = match self.registry.fetch_descriptor(kind, &identity).await {
            Ok(descriptor) => descriptor,
            Err(err) => return Err(self.fail_deregister(&identity, err).await),
        };
        if let Err(err) = self.registry.delete_component(kind, &identity).await {
            return Err(self.fail_deregister(&identity, err).await);
        }
        tracing::info!(%identity, kind = %kind, cluster = %self.config.cluster_name, "component deleted, tearing down");
        Ok(self.teardown.teardown(&descriptor).await)
    }

    /// Collect the stats of every replica of a component.
    #[tracing::instrument(level = "debug", skip(self, subject))]
    pub async fn stats(&self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, subject: &Subject) -> AppResult<ComponentStats> {
        let identity = JobIdentity::new(tenant, namespace, name);
        identity.validate(kind)?;
        self.authorize(subject, kind, &identity).await?;

        let replicas = self.registry.list_replicas(kind, &identity).await?;
        let skeletons: Vec<SharedStats> = (0..replicas.replicas).map(|id| Arc::new(Mutex::new(InstanceStats::new(id)))).collect();
        let calls = self
            .stats
            .collect(&replicas.pods, &skeletons, &replicas.subdomain, &replicas.owner, &replicas.namespace);
        let completed = stats::await_all(calls, self.config.stats_timeout()).await;
        tracing::debug!(%identity, completed, replicas = replicas.replicas, "replica stats collected");

        let instances = skeletons.iter().map(|stats| stats.lock().clone()).collect();
        Ok(ComponentStats::calculate_overall(instances))
    }

    /// Get the state stored under the given key of a component.
    #[tracing::instrument(level = "debug", skip(self, subject))]
    pub async fn get_state(
        &self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, key: &str, subject: &Subject,
    ) -> AppResult<StateEntry> {
        let identity = JobIdentity::new(tenant, namespace, name);
        identity.validate(kind)?;
        self.authorize(subject, kind, &identity).await?;
        self.state.get(kind, tenant, namespace, name, key).await
    }

    /// Write the given state under the given key of a component.
    #[tracing::instrument(level = "debug", skip(self, value, subject))]
    pub async fn put_state(
        &self, kind: ComponentKind, tenant: &str, namespace: &str, name: &str, key: &str, value: StateValue, subject: &Subject,
    ) -> AppResult<()> {
        let identity = JobIdentity::new(tenant, namespace, name);
        identity.validate(kind)?;
        self.authorize(subject, kind, &identity).await?;
        self.state.put(kind, tenant, namespace, name, key, value).await
    }

    async fn authorize(&self, subject: &Subject, kind: ComponentKind, identity: &JobIdentity) -> AppResult<()> {
        let resource = ResourceRef { kind, identity };
        match self.authorizer.is_authorized(subject, resource).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(role = ?subject.role, %identity, kind = %kind, "client is not authorized");
                Err(AppError::Unauthorized)
            }
            Err(err) => Err(AppError::from_anyhow(err)),
        }
    }

    async fn fail_deregister(&self, identity: &JobIdentity, err: AppError) -> AppError {
        tracing::error!(%identity, error = %err, "deregister failed");
        let outcome: ActionOutcome = self.teardown.cleanup_state_table(identity).await;
        if outcome.is_failure() {
            tracing::warn!(%identity, status = ?outcome.status, "state table deletion failed, moving on");
        }
        err
    }
}
