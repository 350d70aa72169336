//! Idempotent deletion of the external resources owned by a component.
//!
//! Every primitive treats an already absent target as success, so that it can be retried and
//! re-run freely.

use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::{AdminError, BrokerAdmin};
use crate::error::{AppError, AppResult};
use crate::state::ERR_STATE_UNAVAILABLE;
use mesh_core::descriptor::{ComponentKind, JobIdentity};
use mesh_core::names;

/// Administration of state storage tables.
#[async_trait]
pub trait TableAdmin: Send + Sync {
    /// Delete a table along with all of its data.
    async fn delete_table(&self, namespace: &str, table: &str) -> AppResult<()>;
}

/// Deletion of secrets holding component material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Delete the named secret.
    async fn delete_secret(&self, name: &str) -> AppResult<()>;
}

/// Deletion primitives for the resources owned by a component.
#[derive(Clone)]
pub struct ResourceCleaner {
    broker: Arc<dyn BrokerAdmin>,
    tables: Option<Arc<dyn TableAdmin>>,
    secrets: Arc<dyn SecretStore>,
}

impl ResourceCleaner {
    /// Create a new instance.
    pub fn new(broker: Arc<dyn BrokerAdmin>, tables: Option<Arc<dyn TableAdmin>>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { broker, tables, secrets }
    }

    /// Delete a subscription from a single topic.
    ///
    /// On failure, the metadata of the subscription's connected consumers is appended to the
    /// error message when it can be fetched.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_subscription_exact(&self, topic: &str, subscription: &str) -> AppResult<()> {
        let err = match self.broker.delete_subscription(topic, subscription).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_not_found() => {
                tracing::debug!(topic, subscription, "subscription already absent");
                return Ok(());
            }
            Err(err) => err,
        };
        let mut message = err.to_string();
        match self.broker.topic_stats(topic).await {
            Ok(stats) => {
                if let Some(sub) = stats.subscriptions.get(subscription) {
                    let consumers: Vec<_> = sub.consumers.iter().map(|consumer| &consumer.metadata).collect();
                    if let Ok(json) = serde_json::to_string(&consumers) {
                        message = format!("{} - existing consumers: {}", message, json);
                    }
                }
            }
            Err(stats_err) => tracing::debug!(topic, error = %stats_err, "error fetching topic stats"),
        }
        Err(err.classify(message))
    }

    /// Unsubscribe a subscription from every topic of a namespace.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_subscription_by_pattern(&self, namespace: &str, subscription: &str) -> AppResult<()> {
        match self.broker.unsubscribe_namespace(namespace, subscription).await {
            Ok(()) => Ok(()),
            Err(err) => absent_or(err),
        }
    }

    /// Delete a topic.
    ///
    /// On failure, the topic's stats are appended to the error message when they can be fetched.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_topic(&self, topic: &str, force: bool) -> AppResult<()> {
        let err = match self.broker.delete_topic(topic, force).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_not_found() => {
                tracing::debug!(topic, "topic already absent");
                return Ok(());
            }
            Err(err) => err,
        };
        let mut message = err.to_string();
        match self.broker.topic_stats(topic).await {
            Ok(stats) => {
                if let Ok(json) = serde_json::to_string(&stats) {
                    message = format!("{} - topic stats: {}", message, json);
                }
            }
            Err(stats_err) => tracing::debug!(topic, error = %stats_err, "error fetching topic stats"),
        }
        Err(err.classify(message))
    }

    /// Delete a state table; an absent namespace or table is success.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_state_table(&self, namespace: &str, table: &str) -> AppResult<()> {
        let tables = self
            .tables
            .as_ref()
            .ok_or_else(|| AppError::Unavailable(ERR_STATE_UNAVAILABLE.into()))?;
        match tables.delete_table(namespace, table).await {
            Ok(()) => Ok(()),
            Err(AppError::NotFound(msg)) => {
                tracing::debug!(namespace, table, %msg, "state table already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Delete a secret.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_secret(&self, name: &str) -> AppResult<()> {
        match self.secrets.delete_secret(name).await {
            Ok(()) | Err(AppError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Delete the uploaded package of a component.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_package(&self, kind: ComponentKind, identity: &JobIdentity) -> AppResult<()> {
        let url = names::package_url(kind, &identity.tenant, &identity.namespace, &identity.name);
        match self.broker.delete_package(&url).await {
            Ok(()) => Ok(()),
            Err(err) => absent_or(err),
        }
    }
}

fn absent_or(err: AdminError) -> AppResult<()> {
    if err.is_not_found() {
        return Ok(());
    }
    let message = err.to_string();
    Err(err.classify(message))
}
