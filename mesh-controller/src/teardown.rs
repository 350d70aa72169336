//! Component teardown.
//!
//! A teardown drives every cleanup action of a component to completion and records each outcome.
//! Individual failures never abort the teardown; they are logged and surfaced in the report.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Serialize;

use crate::actions::{Action, ActionOutcome, RetryExecutor, RetryPolicy};
use crate::cleaner::ResourceCleaner;
use crate::config::Config;
use mesh_core::descriptor::{CleanupPlan, ComponentKind, JobDescriptor, JobIdentity, TopicSelection};
use mesh_core::names::{self, TopicName};

/// The ordered outcomes of a teardown.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub outcomes: Vec<ActionOutcome>,
}

impl TeardownReport {
    /// The outcomes of all actions which were executed.
    pub fn executed(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_executed())
    }

    /// The outcomes of all actions which failed.
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_failure())
    }

    /// Check if every executed action succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Drives the cleanup of every resource owned by a component.
pub struct TeardownOrchestrator {
    cleaner: ResourceCleaner,
    policy: RetryPolicy,
    cluster_name: String,
    upload_enabled: bool,
    tls_enabled: bool,
}

impl TeardownOrchestrator {
    /// Create a new instance.
    pub fn new(config: &Config, cleaner: ResourceCleaner) -> Self {
        Self {
            cleaner,
            policy: RetryPolicy::from_config(config),
            cluster_name: config.cluster_name.clone(),
            upload_enabled: config.upload_enabled,
            tls_enabled: config.tls_enabled,
        }
    }

    /// Tear down the given component.
    ///
    /// Subscription cleanup and state table deletion run concurrently. The report lists the
    /// subscription outcomes first, then the state table, then any artifact deletions.
    #[tracing::instrument(level = "debug", skip(self, descriptor), fields(identity = %descriptor.identity))]
    pub async fn teardown(&self, descriptor: &JobDescriptor) -> TeardownReport {
        let (kind, identity) = (descriptor.kind(), &descriptor.identity);
        let plan = descriptor.cleanup_plan();

        let (mut outcomes, state_outcome) = tokio::join!(
            self.cleanup_subscriptions(kind, identity, &plan),
            self.cleanup_state_table(identity),
        );
        outcomes.push(state_outcome);
        if self.upload_enabled {
            outcomes.push(self.cleanup_package(kind, identity).await);
        }
        if self.tls_enabled {
            outcomes.push(self.cleanup_tls_secret(kind, identity).await);
        }

        let report = TeardownReport { outcomes };
        for failure in report.failures() {
            tracing::warn!(%identity, action = %failure.name, status = ?failure.status, "teardown action failed");
        }
        tracing::info!(
            %identity,
            kind = %kind,
            executed = report.executed().count(),
            failed = report.failures().count(),
            "teardown finished"
        );
        report
    }

    async fn cleanup_subscriptions(&self, kind: ComponentKind, identity: &JobIdentity, plan: &CleanupPlan) -> Vec<ActionOutcome> {
        let name = format!("Cleaning up subscriptions for {} {}", kind, identity);
        if !plan.enabled {
            return vec![ActionOutcome::skipped(name, "subscription cleanup is disabled")];
        }

        let subscription = plan.subscription_name.as_str();
        let mut outcomes = match &plan.topics {
            TopicSelection::Pattern(pattern) => {
                tracing::info!(subscription, pattern = %pattern, "cleaning up subscription for topic pattern");
                match TopicName::parse(pattern) {
                    Ok(topic) => vec![self.run_one(self.delete_subscription_by_pattern(name, topic.namespace(), subscription)).await],
                    Err(err) => vec![ActionOutcome::failed(name, err.to_string())],
                }
            }
            TopicSelection::Exact(topics) => {
                tracing::info!(subscription, topics = ?topics, "cleaning up subscription for topics");
                let mut seen = HashSet::new();
                let actions = topics
                    .iter()
                    .map(|topic| TopicName::parse(topic).map(|parsed| parsed.to_string()).unwrap_or_else(|_| topic.clone()))
                    .filter(|topic| seen.insert(topic.clone()))
                    .map(|topic| self.run_one(self.delete_subscription_exact(format!("{} on {}", name, topic), topic, subscription)));
                join_all(actions).await
            }
        };

        if let (ComponentKind::Source, Some(intermediate)) = (kind, plan.intermediate_topic.as_ref()) {
            let report = RetryExecutor::new()
                .add_action(self.delete_subscription_exact(
                    format!("Removing intermediate topic subscription {} for batch source {}", subscription, identity),
                    intermediate.clone(),
                    subscription,
                ))
                .add_action(self.delete_topic(
                    format!("Deleting intermediate topic {} for batch source {}", intermediate, identity),
                    intermediate.clone(),
                ))
                .run()
                .await;
            outcomes.extend(report.outcomes);
        }
        outcomes
    }

    /// Delete the state table of a component on its own.
    pub async fn cleanup_state_table(&self, identity: &JobIdentity) -> ActionOutcome {
        let (namespace, table) = (identity.state_namespace(), identity.name.clone());
        let cleaner = self.cleaner.clone();
        let action = Action::new(format!("Deleting state table {}/{}", namespace, table), move || {
            let (cleaner, namespace, table) = (cleaner.clone(), namespace.clone(), table.clone());
            async move { cleaner.delete_state_table(&namespace, &table).await }
        });
        self.run_one(action.with_retry(self.policy)).await
    }

    async fn cleanup_package(&self, kind: ComponentKind, identity: &JobIdentity) -> ActionOutcome {
        let cleaner = self.cleaner.clone();
        let owned_identity = identity.clone();
        let url = names::package_url(kind, &identity.tenant, &identity.namespace, &identity.name);
        let action = Action::new(format!("Deleting package {}", url), move || {
            let (cleaner, identity) = (cleaner.clone(), owned_identity.clone());
            async move { cleaner.delete_package(kind, &identity).await }
        });
        self.run_one(action.with_retry(self.policy)).await
    }

    async fn cleanup_tls_secret(&self, kind: ComponentKind, identity: &JobIdentity) -> ActionOutcome {
        let cleaner = self.cleaner.clone();
        let secret = names::tls_secret_name(kind, &self.cluster_name, &identity.tenant, &identity.namespace, &identity.name);
        let action = Action::new(format!("Deleting TLS secret {}", secret), move || {
            let (cleaner, secret) = (cleaner.clone(), secret.clone());
            async move { cleaner.delete_secret(&secret).await }
        });
        self.run_one(action.with_retry(self.policy)).await
    }

    fn delete_subscription_exact(&self, name: String, topic: String, subscription: &str) -> Action {
        let (cleaner, subscription) = (self.cleaner.clone(), subscription.to_string());
        Action::new(name, move || {
            let (cleaner, topic, subscription) = (cleaner.clone(), topic.clone(), subscription.clone());
            async move { cleaner.delete_subscription_exact(&topic, &subscription).await }
        })
        .with_retry(self.policy)
    }

    fn delete_subscription_by_pattern(&self, name: String, namespace: String, subscription: &str) -> Action {
        let (cleaner, subscription) = (self.cleaner.clone(), subscription.to_string());
        Action::new(name, move || {
            let (cleaner, namespace, subscription) = (cleaner.clone(), namespace.clone(), subscription.clone());
            async move { cleaner.delete_subscription_by_pattern(&namespace, &subscription).await }
        })
        .with_retry(self.policy)
    }

    fn delete_topic(&self, name: String, topic: String) -> Action {
        let cleaner = self.cleaner.clone();
        Action::new(name, move || {
            let (cleaner, topic) = (cleaner.clone(), topic.clone());
            async move { cleaner.delete_topic(&topic, true).await }
        })
        .with_retry(self.policy)
    }

    /// Run a single action on its own, recording its outcome.
    async fn run_one(&self, action: Action) -> ActionOutcome {
        let name = action.name().to_string();
        let mut report = RetryExecutor::new().add_action(action).run().await;
        report.outcomes.pop().unwrap_or_else(|| ActionOutcome::skipped(name, "no outcome recorded"))
    }
}
