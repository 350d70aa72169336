//! Job descriptors.
//!
//! A descriptor is the last-known shape of a deployed component, as far as the control plane
//! needs it in order to decommission the component. Descriptors are built from the component's
//! custom resource (see `crate::crd`) and are owned by the caller for the duration of one call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::names;

/// The kind of a deployed component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentKind {
    Function,
    Sink,
    Source,
}

impl ComponentKind {
    /// The API kind of the component's custom resource.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "Function",
            Self::Sink => "Sink",
            Self::Source => "Source",
        }
    }

    /// The package type under which the component's artifact is uploaded.
    pub fn package_type(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Sink => "sink",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity of a component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentity {
    pub tenant: String,
    pub namespace: String,
    pub name: String,
}

impl JobIdentity {
    /// Create a new instance.
    pub fn new(tenant: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Ensure all segments of this identity are populated.
    pub fn validate(&self, kind: ComponentKind) -> Result<(), AppError> {
        if self.tenant.is_empty() {
            return Err(AppError::InvalidInput("Tenant is not provided".into()));
        }
        if self.namespace.is_empty() {
            return Err(AppError::InvalidInput("Namespace is not provided".into()));
        }
        if self.name.is_empty() {
            return Err(AppError::InvalidInput(format!("{} name is not provided", kind)));
        }
        Ok(())
    }

    /// The `{tenant}/{namespace}/{name}` form of this identity.
    pub fn fully_qualified_name(&self) -> String {
        names::fully_qualified_name(&self.tenant, &self.namespace, &self.name)
    }

    /// The state-store namespace of this component.
    pub fn state_namespace(&self) -> String {
        names::state_namespace(&self.tenant, &self.namespace)
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.namespace, self.name)
    }
}

/// The input side of a function or sink.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Remove the component's subscriptions when it is deleted.
    pub cleanup_subscription_on_delete: bool,
    /// The explicit subscription name, if any.
    pub subscription_name: Option<String>,
    /// The exact input topics, in declaration order.
    pub topics: Vec<String>,
    /// The input topic pattern, which takes precedence over `topics` when set.
    pub topic_pattern: Option<String>,
}

impl InputSpec {
    /// The authoritative topic selection of this input.
    pub fn topic_selection(&self) -> TopicSelection {
        match self.topic_pattern.as_deref() {
            Some(pattern) if !pattern.is_empty() => TopicSelection::Pattern(pattern.to_string()),
            _ => TopicSelection::Exact(self.topics.clone()),
        }
    }
}

/// The batch discovery side of a source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Batch discovery is configured for this source, which implies subscription cleanup.
    pub batch_discovery: bool,
    /// The intermediate topic used to fan discovered tasks out to instances.
    pub intermediate_topic: String,
    /// The subscription instances hold on the intermediate topic.
    pub subscription_name: String,
}

impl SourceSpec {
    /// Build the batch discovery spec of the given source identity.
    pub fn batch(identity: &JobIdentity, batch_discovery: bool) -> Self {
        Self {
            batch_discovery,
            intermediate_topic: names::batch_source_intermediate_topic(&identity.tenant, &identity.namespace, &identity.name),
            subscription_name: names::batch_source_subscription_name(&identity.tenant, &identity.namespace, &identity.name),
        }
    }
}

/// Per-kind component fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentSpec {
    Function(InputSpec),
    Sink(InputSpec),
    Source(SourceSpec),
}

/// The set of topics a subscription spans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicSelection {
    /// Exact topic names.
    Exact(Vec<String>),
    /// A single regex pattern.
    Pattern(String),
}

/// The last-known descriptor of a deployed component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub identity: JobIdentity,
    pub spec: ComponentSpec,
}

/// The kind-independent subscription cleanup shape of a descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupPlan {
    /// Subscription cleanup is enabled for this component.
    pub enabled: bool,
    /// The resolved subscription name.
    pub subscription_name: String,
    /// The topics the subscription spans.
    pub topics: TopicSelection,
    /// The intermediate topic of a batch source.
    pub intermediate_topic: Option<String>,
}

impl JobDescriptor {
    /// Create a new instance.
    pub fn new(identity: JobIdentity, spec: ComponentSpec) -> Self {
        Self { identity, spec }
    }

    /// The kind of this component.
    pub fn kind(&self) -> ComponentKind {
        match &self.spec {
            ComponentSpec::Function(_) => ComponentKind::Function,
            ComponentSpec::Sink(_) => ComponentKind::Sink,
            ComponentSpec::Source(_) => ComponentKind::Source,
        }
    }

    /// Extract the subscription cleanup shape of this component.
    pub fn cleanup_plan(&self) -> CleanupPlan {
        let id = &self.identity;
        let (enabled, subscription_name, topics, intermediate_topic) = match &self.spec {
            ComponentSpec::Function(input) | ComponentSpec::Sink(input) => (
                input.cleanup_subscription_on_delete,
                input.subscription_name.clone(),
                input.topic_selection(),
                None,
            ),
            ComponentSpec::Source(source) => (
                source.batch_discovery,
                Some(source.subscription_name.clone()),
                TopicSelection::Exact(vec![source.intermediate_topic.clone()]),
                Some(source.intermediate_topic.clone()),
            ),
        };
        let subscription_name = subscription_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| names::default_subscription_name(&id.tenant, &id.namespace, &id.name));
        CleanupPlan {
            enabled,
            subscription_name,
            topics,
            intermediate_topic,
        }
    }
}
