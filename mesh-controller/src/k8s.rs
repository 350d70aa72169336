//! Kubernetes adapters.
//!
//! Components are deployed as Function, Sink & Source custom resources in the job namespace,
//! each backed by a StatefulSet. All API calls are bounded by the configured API timeout.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use crate::cleaner::SecretStore;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::utils;
use mesh_core::crd::{ComponentStatus, Function, Sink, Source};
use mesh_core::descriptor::{ComponentKind, JobDescriptor, JobIdentity};
use mesh_core::names;

/// The replica pods of a component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaPods {
    /// The name of the StatefulSet owning the pods.
    pub owner: String,
    /// The DNS subdomain of the pods.
    pub subdomain: String,
    /// The namespace of the pods.
    pub namespace: String,
    /// The desired number of replicas.
    pub replicas: u32,
    /// The names of the live pods.
    pub pods: Vec<String>,
}

/// The orchestration layer in which components are deployed.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
    /// Fetch the descriptor of a deployed component.
    async fn fetch_descriptor(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<JobDescriptor>;

    /// Delete a deployed component; an absent component is success.
    async fn delete_component(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<()>;

    /// List the replica pods of a deployed component.
    async fn list_replicas(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<ReplicaPods>;
}

/// A component registry backed by the K8s API.
#[derive(Clone)]
pub struct K8sRegistry {
    client: Client,
    config: Arc<Config>,
}

impl K8sRegistry {
    /// Create a new instance using the inferred K8s client config.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::try_default().await.context("error initializing K8s client")?;
        Ok(Self { client, config })
    }

    /// Create a new instance using the given client.
    pub fn with_client(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    fn object_name(&self, identity: &JobIdentity) -> String {
        names::object_name(&self.config.cluster_name, &identity.tenant, &identity.namespace, &identity.name)
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), &self.config.job_namespace)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_resource<K>(&self, name: &str, kind: ComponentKind, identity: &JobIdentity) -> AppResult<K>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        let api: Api<K> = self.api();
        let res = timeout(self.config.api_timeout(), api.get(name))
            .await
            .map_err(|_| AppError::Transient(format!("timeout while fetching {} {}", kind, identity)))?;
        res.map_err(|err| from_kube_error(err, format!("{} {} doesn't exist", kind, identity)))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_resource<K>(&self, name: &str) -> AppResult<()>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        tracing::info!(name, "deleting component resource");
        let api: Api<K> = self.api();
        let res = timeout(self.config.api_timeout(), api.delete(name, &DeleteParams::default()))
            .await
            .map_err(|_| AppError::Transient(format!("timeout while deleting {}", name)))?;
        match res {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == http::StatusCode::NOT_FOUND => Ok(()),
            Err(err) => Err(from_kube_error(err, format!("error deleting {}", name))),
        }
    }

    async fn replica_spec(&self, name: &str, kind: ComponentKind, identity: &JobIdentity) -> AppResult<(Option<i32>, Option<ComponentStatus>)> {
        Ok(match kind {
            ComponentKind::Function => {
                let cr: Function = self.get_resource(name, kind, identity).await?;
                (cr.spec.replicas, cr.status)
            }
            ComponentKind::Sink => {
                let cr: Sink = self.get_resource(name, kind, identity).await?;
                (cr.spec.replicas, cr.status)
            }
            ComponentKind::Source => {
                let cr: Source = self.get_resource(name, kind, identity).await?;
                (cr.spec.replicas, cr.status)
            }
        })
    }
}

#[async_trait]
impl ComponentRegistry for K8sRegistry {
    async fn fetch_descriptor(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<JobDescriptor> {
        let name = self.object_name(identity);
        Ok(match kind {
            ComponentKind::Function => self.get_resource::<Function>(&name, kind, identity).await?.descriptor(identity.clone()),
            ComponentKind::Sink => self.get_resource::<Sink>(&name, kind, identity).await?.descriptor(identity.clone()),
            ComponentKind::Source => self.get_resource::<Source>(&name, kind, identity).await?.descriptor(identity.clone()),
        })
    }

    async fn delete_component(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<()> {
        let name = self.object_name(identity);
        match kind {
            ComponentKind::Function => self.delete_resource::<Function>(&name).await,
            ComponentKind::Sink => self.delete_resource::<Sink>(&name).await,
            ComponentKind::Source => self.delete_resource::<Source>(&name).await,
        }
    }

    async fn list_replicas(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<ReplicaPods> {
        let name = self.object_name(identity);
        let (replicas, status) = self.replica_spec(&name, kind, identity).await?;
        let owner = names::job_name(&name, kind);
        let selector = status.and_then(|status| status.selector).filter(|selector| !selector.is_empty());
        let params = match selector.as_deref() {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };

        let api: Api<Pod> = self.api();
        let pods = timeout(self.config.api_timeout(), api.list(&params))
            .await
            .map_err(|_| AppError::Transient(format!("timeout while listing pods of {}", owner)))?
            .map_err(|err| from_kube_error(err, format!("error listing pods of {}", owner)))?;
        let pods = pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .filter(|pod| selector.is_some() || utils::parse_ordinal(&owner, pod).is_some())
            .collect();

        Ok(ReplicaPods {
            subdomain: names::headless_service_name(&owner),
            owner,
            namespace: self.config.job_namespace.clone(),
            replicas: replicas.unwrap_or(1).max(0) as u32,
            pods,
        })
    }
}

#[async_trait]
impl SecretStore for K8sRegistry {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_secret(&self, name: &str) -> AppResult<()> {
        tracing::info!(name, "deleting Secret");
        let api: Api<Secret> = self.api();
        let res = timeout(self.config.api_timeout(), api.delete(name, &DeleteParams::default()))
            .await
            .map_err(|_| AppError::Transient(format!("timeout while deleting secret {}", name)))?;
        match res {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == http::StatusCode::NOT_FOUND => Ok(()),
            Err(err) => Err(from_kube_error(err, format!("error deleting secret {}", name))),
        }
    }
}

/// Classify a K8s API error, using the given message for absent resources & as context.
fn from_kube_error(err: kube::Error, message: String) -> AppError {
    match err {
        kube::Error::Api(api_err) if api_err.code == http::StatusCode::NOT_FOUND => AppError::NotFound(message),
        kube::Error::Api(api_err) if api_err.code == http::StatusCode::CONFLICT || api_err.code >= 500 => {
            AppError::Transient(format!("{}: {}", message, api_err.message))
        }
        err => AppError::Ise(anyhow::Error::from(err).context(message)),
    }
}
