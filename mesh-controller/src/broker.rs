//! Broker admin abstractions.
//!
//! The message broker is an external collaborator. This module defines the admin operations the
//! control plane needs from it along with the error classification of their failures.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Errors returned by broker admin operations.
#[derive(Clone, Debug, Error)]
pub enum AdminError {
    /// The target resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The broker rejected the request.
    #[error("{message}")]
    Http { code: u16, message: String },
    /// The broker could not be reached.
    #[error("{0}")]
    Transport(String),
}

impl AdminError {
    /// Check if this error reports the target as already absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Http { code, .. } => *code == StatusCode::NOT_FOUND.as_u16(),
            Self::Transport(_) => false,
        }
    }

    /// Classify this error, using the given message in place of the broker's own.
    pub fn classify(&self, message: String) -> AppError {
        match self {
            Self::NotFound(_) => AppError::NotFound(message),
            Self::Transport(_) => AppError::Transient(message),
            Self::Http { code, .. } => match *code {
                404 => AppError::NotFound(message),
                400 => AppError::InvalidInput(message),
                401 | 403 => AppError::Unauthorized,
                409 | 412 | 429 | 500..=599 => AppError::Transient(message),
                _ => AppError::ise(message),
            },
        }
    }
}

/// Stats of a single consumer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStats {
    #[serde(default)]
    pub consumer_name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Stats of a single subscription.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStats {
    #[serde(default)]
    pub msg_backlog: i64,
    #[serde(default)]
    pub consumers: Vec<ConsumerStats>,
}

/// Stats of a single topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    #[serde(default)]
    pub msg_in_counter: i64,
    #[serde(default)]
    pub msg_out_counter: i64,
    #[serde(default)]
    pub storage_size: i64,
    #[serde(default)]
    pub subscriptions: HashMap<String, SubscriptionStats>,
}

/// The broker admin operations used to decommission components.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Delete a subscription from a single topic.
    async fn delete_subscription(&self, topic: &str, subscription: &str) -> Result<(), AdminError>;

    /// Unsubscribe the given subscription from all topics of a namespace.
    async fn unsubscribe_namespace(&self, namespace: &str, subscription: &str) -> Result<(), AdminError>;

    /// Delete a topic, forcibly closing its producers & consumers when `force` is set.
    async fn delete_topic(&self, topic: &str, force: bool) -> Result<(), AdminError>;

    /// Get the stats of a topic.
    async fn topic_stats(&self, topic: &str) -> Result<TopicStats, AdminError>;

    /// Delete an uploaded package.
    async fn delete_package(&self, package_url: &str) -> Result<(), AdminError>;
}
