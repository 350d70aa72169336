//! Sink CRD.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ComponentStatus, InputConf};
use crate::descriptor::{ComponentSpec, JobDescriptor, JobIdentity};

pub type Sink = SinkCRD; // Mostly to resolve a Rust Analyzer issue.
pub type SinkStatus = ComponentStatus;

/// CRD spec for the Sink resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    struct = "SinkCRD",
    status = "SinkStatus",
    group = "compute.functionmesh.io",
    version = "v1alpha1",
    kind = "Sink",
    namespaced,
    derive = "PartialEq",
    apiextensions = "v1",
    shortname = "sink"
)]
#[serde(rename_all = "camelCase")]
pub struct SinkSpec {
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub replicas: Option<i32>,
    /// The input config of this sink.
    #[serde(default)]
    pub input: Option<InputConf>,
    /// The subscription name used on all input topics.
    #[serde(default)]
    pub subscription_name: Option<String>,
    /// Remove the sink's subscriptions when it is deleted.
    #[serde(default)]
    pub cleanup_subscription: Option<bool>,
}

impl SinkCRD {
    /// Build the descriptor of this sink.
    pub fn descriptor(&self, identity: JobIdentity) -> JobDescriptor {
        let input = super::input_spec(self.spec.input.as_ref(), self.spec.cleanup_subscription, self.spec.subscription_name.as_ref());
        JobDescriptor::new(identity, ComponentSpec::Sink(input))
    }
}
