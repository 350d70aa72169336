//! Source CRD.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ComponentStatus, OutputConf};
use crate::descriptor::{self, ComponentSpec, JobDescriptor, JobIdentity};

pub type Source = SourceCRD; // Mostly to resolve a Rust Analyzer issue.
pub type SourceStatus = ComponentStatus;

/// CRD spec for the Source resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    struct = "SourceCRD",
    status = "SourceStatus",
    group = "compute.functionmesh.io",
    version = "v1alpha1",
    kind = "Source",
    namespaced,
    derive = "PartialEq",
    apiextensions = "v1",
    shortname = "source"
)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
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
    /// The output config of this source.
    #[serde(default)]
    pub output: Option<OutputConf>,
    /// Batch source config, present only for batch sources.
    #[serde(default)]
    pub batch_source_config: Option<BatchSourceConfig>,
}

/// The config of a batch source.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSourceConfig {
    /// The class used to trigger task discovery.
    #[serde(default)]
    pub discovery_triggerer_class_name: Option<String>,
    /// Config passed to the discovery triggerer.
    #[serde(default)]
    pub discovery_triggerer_config: Option<BTreeMap<String, String>>,
}

impl SourceCRD {
    /// Build the descriptor of this source.
    ///
    /// Only batch sources with a discovery triggerer hold a subscription which needs cleanup.
    pub fn descriptor(&self, identity: JobIdentity) -> JobDescriptor {
        let batch_discovery = self
            .spec
            .batch_source_config
            .as_ref()
            .and_then(|conf| conf.discovery_triggerer_class_name.as_deref())
            .map(|class| !class.is_empty())
            .unwrap_or_default();
        let spec = descriptor::SourceSpec::batch(&identity, batch_discovery);
        JobDescriptor::new(identity, ComponentSpec::Source(spec))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn descriptor_enables_cleanup_only_with_discovery_triggerer() -> Result<()> {
        let with_triggerer: SourceSpec = serde_json::from_value(serde_json::json!({
            "batchSourceConfig": {"discoveryTriggererClassName": "org.example.CronTriggerer"},
        }))?;
        let without: SourceSpec = serde_json::from_value(serde_json::json!({
            "batchSourceConfig": {"discoveryTriggererClassName": ""},
        }))?;
        let id = JobIdentity::new("t1", "n1", "src");

        let plan = Source::new("src", with_triggerer).descriptor(id.clone()).cleanup_plan();
        assert!(plan.enabled, "expected cleanup to be enabled with a discovery triggerer");
        assert_eq!(plan.intermediate_topic.as_deref(), Some("persistent://t1/n1/src-intermediate"));

        let plan = Source::new("src", without).descriptor(id).cleanup_plan();
        assert!(!plan.enabled, "expected cleanup to be disabled without a discovery triggerer");
        Ok(())
    }
}
