//! Function Mesh CRDs.
//!
//! These types mirror the subset of the Function, Sink & Source custom resources which the
//! control plane reads in order to decommission a component. The CRDs themselves are owned by the
//! Function Mesh operator.

mod function;
mod sink;
mod source;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::descriptor::InputSpec;

pub use function::{Function, FunctionSpec, FunctionStatus};
pub use sink::{Sink, SinkSpec, SinkStatus};
pub use source::{BatchSourceConfig, Source, SourceSpec, SourceStatus};

/// The API group of all Function Mesh CRDs.
pub const GROUP: &str = "compute.functionmesh.io";

/// The input config of a function or sink.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputConf {
    /// Exact input topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// An input topic pattern.
    #[serde(default)]
    pub topic_pattern: Option<String>,
    /// Per-topic consumer config, keyed by topic name or pattern.
    #[serde(default)]
    pub source_specs: Option<BTreeMap<String, ConsumerConfig>>,
}

/// Consumer config of a single input.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    /// The key of this entry is a topic pattern rather than a topic name.
    #[serde(default)]
    pub is_regex_pattern: Option<bool>,
    /// The schema type of the input.
    #[serde(default)]
    pub schema_type: Option<String>,
    /// The receiver queue size of the consumer.
    #[serde(default)]
    pub receiver_queue_size: Option<i32>,
}

/// The output config of a function or source.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputConf {
    /// The output topic.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Status fields shared by all component CRs.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// The number of observed replicas.
    #[serde(default)]
    pub replicas: i32,
    /// The label selector of the component's pods.
    #[serde(default)]
    pub selector: Option<String>,
}

/// Build the cleanup-relevant input spec of a function or sink.
///
/// Entries of `sourceSpecs` flagged as regex patterns replace the topic pattern, all others are
/// appended to the exact topics.
pub(crate) fn input_spec(input: Option<&InputConf>, cleanup: Option<bool>, subscription_name: Option<&String>) -> InputSpec {
    let mut spec = InputSpec {
        cleanup_subscription_on_delete: cleanup.unwrap_or_default(),
        subscription_name: subscription_name.cloned(),
        ..Default::default()
    };
    let input = match input {
        Some(input) => input,
        None => return spec,
    };
    spec.topics = input.topics.clone();
    spec.topic_pattern = input.topic_pattern.clone();
    for (topic, conf) in input.source_specs.iter().flatten() {
        if conf.is_regex_pattern.unwrap_or_default() {
            spec.topic_pattern = Some(topic.clone());
        } else {
            spec.topics.push(topic.clone());
        }
    }
    spec
}
