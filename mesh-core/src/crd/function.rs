//! Function CRD.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ComponentStatus, InputConf, OutputConf};
use crate::descriptor::{ComponentSpec, JobDescriptor, JobIdentity};

pub type Function = FunctionCRD; // Mostly to resolve a Rust Analyzer issue.
pub type FunctionStatus = ComponentStatus;

/// CRD spec for the Function resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    struct = "FunctionCRD",
    status = "FunctionStatus",
    group = "compute.functionmesh.io",
    version = "v1alpha1",
    kind = "Function",
    namespaced,
    derive = "PartialEq",
    apiextensions = "v1",
    shortname = "function"
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// The tenant of this function.
    #[serde(default)]
    pub tenant: Option<String>,
    /// The namespace of this function.
    #[serde(default)]
    pub namespace: Option<String>,
    /// The name of this function.
    #[serde(default)]
    pub name: Option<String>,
    /// The cluster this function runs in.
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// The number of replicas of this function.
    #[serde(default)]
    pub replicas: Option<i32>,
    /// The input config of this function.
    #[serde(default)]
    pub input: Option<InputConf>,
    /// The output config of this function.
    #[serde(default)]
    pub output: Option<OutputConf>,
    /// The subscription name used on all input topics.
    #[serde(default)]
    pub subscription_name: Option<String>,
    /// Remove the function's subscriptions when it is deleted.
    #[serde(default)]
    pub cleanup_subscription: Option<bool>,
}

impl FunctionCRD {
    /// Build the descriptor of this function.
    pub fn descriptor(&self, identity: JobIdentity) -> JobDescriptor {
        let input = super::input_spec(self.spec.input.as_ref(), self.spec.cleanup_subscription, self.spec.subscription_name.as_ref());
        JobDescriptor::new(identity, ComponentSpec::Function(input))
    }
}
