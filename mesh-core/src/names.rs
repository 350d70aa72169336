//! Topic name parsing & deterministic naming of the resources owned by a component.

use std::fmt;
use std::str::FromStr;

use crate::descriptor::ComponentKind;
use crate::error::AppError;

/// The domain of durable topics.
pub const DOMAIN_PERSISTENT: &str = "persistent";
/// The domain of non-durable topics.
pub const DOMAIN_NON_PERSISTENT: &str = "non-persistent";
/// The tenant assumed for bare topic names.
pub const DEFAULT_TENANT: &str = "public";
/// The namespace assumed for bare topic names.
pub const DEFAULT_NAMESPACE: &str = "default";
/// The subscription name prefix used by batch sources for their intermediate topic.
const BATCH_SOURCE_SUBSCRIPTION_PREFIX: &str = "BatchSourceExecutor";
/// The suffix of a batch source's intermediate topic.
const BATCH_SOURCE_INTERMEDIATE_SUFFIX: &str = "intermediate";
/// The suffix of a component's headless service.
const HEADLESS_SERVICE_SUFFIX: &str = "headless";
/// The number of hex chars of the name hash appended to K8s object names.
const OBJECT_NAME_HASH_LEN: usize = 8;

/// A parsed topic name.
///
/// Accepted forms are `{domain}://{tenant}/{namespace}/{topic}`, `{tenant}/{namespace}/{topic}` and
/// a bare `{topic}`; the latter two are persistent, and bare names live in `public/default`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicName {
    persistent: bool,
    tenant: String,
    namespace: String,
    local_name: String,
}

impl TopicName {
    /// Parse the given topic name.
    pub fn parse(topic: &str) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidInput(format!("invalid topic name '{}'", topic));
        let (persistent, rest) = match topic.split_once("://") {
            Some((DOMAIN_PERSISTENT, rest)) => (true, rest),
            Some((DOMAIN_NON_PERSISTENT, rest)) => (false, rest),
            Some(_) => return Err(invalid()),
            None if !topic.contains('/') && !topic.is_empty() => {
                return Ok(Self {
                    persistent: true,
                    tenant: DEFAULT_TENANT.into(),
                    namespace: DEFAULT_NAMESPACE.into(),
                    local_name: topic.into(),
                })
            }
            None => (true, topic),
        };
        let mut segments = rest.splitn(3, '/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(tenant), Some(namespace), Some(local_name)) if !tenant.is_empty() && !namespace.is_empty() && !local_name.is_empty() => Ok(Self {
                persistent,
                tenant: tenant.into(),
                namespace: namespace.into(),
                local_name: local_name.into(),
            }),
            _ => Err(invalid()),
        }
    }

    /// The `{tenant}/{namespace}` this topic belongs to.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.tenant, self.namespace)
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domain = if self.persistent { DOMAIN_PERSISTENT } else { DOMAIN_NON_PERSISTENT };
        write!(f, "{}://{}/{}/{}", domain, self.tenant, self.namespace, self.local_name)
    }
}

impl FromStr for TopicName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The fully qualified name of a component, `{tenant}/{namespace}/{name}`.
pub fn fully_qualified_name(tenant: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", tenant, namespace, name)
}

/// The subscription name a component uses when none is given explicitly.
pub fn default_subscription_name(tenant: &str, namespace: &str, name: &str) -> String {
    fully_qualified_name(tenant, namespace, name)
}

/// The state-store namespace holding the tables of all components of a namespace.
pub fn state_namespace(tenant: &str, namespace: &str) -> String {
    format!("{}_{}", tenant, namespace).replace('-', "_")
}

/// The subscription a batch source holds on its intermediate topic.
pub fn batch_source_subscription_name(tenant: &str, namespace: &str, name: &str) -> String {
    format!("{}-{}", BATCH_SOURCE_SUBSCRIPTION_PREFIX, fully_qualified_name(tenant, namespace, name))
}

/// The intermediate topic a batch source uses to hand discovered tasks to its instances.
pub fn batch_source_intermediate_topic(tenant: &str, namespace: &str, name: &str) -> String {
    format!("{}://{}/{}/{}-{}", DOMAIN_PERSISTENT, tenant, namespace, name, BATCH_SOURCE_INTERMEDIATE_SUFFIX)
}

/// The K8s object name of a component.
///
/// Component names are not unique across tenants & namespaces, so a short hash of the full
/// identity is appended to the RFC 1123 compliant form of the name.
pub fn object_name(cluster: &str, tenant: &str, namespace: &str, name: &str) -> String {
    format!("{}-{}", rfc1123(name), short_hash(&format!("{}-{}-{}-{}", cluster, tenant, namespace, name)))
}

/// The name of the StatefulSet running the replicas of a component.
pub fn job_name(object_name: &str, kind: ComponentKind) -> String {
    format!("{}-{}", object_name, kind.package_type())
}

/// The name of the headless service which is the DNS subdomain of a component's replicas.
pub fn headless_service_name(job_name: &str) -> String {
    format!("{}-{}", job_name, HEADLESS_SERVICE_SUFFIX)
}

/// The name of the K8s Secret holding a component's TLS material.
pub fn tls_secret_name(kind: ComponentKind, cluster: &str, tenant: &str, namespace: &str, name: &str) -> String {
    format!(
        "{}-tls-{}",
        kind.as_str().to_lowercase(),
        short_hash(&format!("{}-{}-{}-{}", cluster, tenant, namespace, name))
    )
}

/// The package-service locator of a component's uploaded artifact.
pub fn package_url(kind: ComponentKind, tenant: &str, namespace: &str, name: &str) -> String {
    format!("{}://{}@latest", kind.package_type(), fully_qualified_name(tenant, namespace, name))
}

/// Lowercase the given name & replace every char which is not valid in a K8s object name.
fn rfc1123(name: &str) -> String {
    let converted: String = name
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' { c } else { '-' })
        .collect();
    converted.trim_matches(|c| c == '-' || c == '.').to_string()
}

fn short_hash(val: &str) -> String {
    let mut hash = format!("{:016x}", seahash::hash(val.as_bytes()));
    hash.truncate(OBJECT_NAME_HASH_LEN);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_name_parses_all_accepted_forms() -> Result<(), AppError> {
        let cases = vec![
            ("persistent://t1/n1/in", "persistent://t1/n1/in", "t1/n1"),
            ("non-persistent://t1/n1/in", "non-persistent://t1/n1/in", "t1/n1"),
            ("t1/n1/in", "persistent://t1/n1/in", "t1/n1"),
            ("in", "persistent://public/default/in", "public/default"),
            ("persistent://t1/n1/in-.*", "persistent://t1/n1/in-.*", "t1/n1"),
        ];
        for (input, expected, expected_ns) in cases {
            let topic = TopicName::parse(input)?;
            assert_eq!(topic.to_string(), expected, "unexpected fully qualified name for {}", input);
            assert_eq!(topic.namespace(), expected_ns, "unexpected namespace for {}", input);
        }
        Ok(())
    }

    #[test]
    fn topic_name_rejects_malformed_names() {
        for input in ["", "t1/in", "kafka://t1/n1/in", "persistent://t1//in", "persistent://t1/n1/"] {
            let res = TopicName::parse(input);
            assert!(matches!(res, Err(AppError::InvalidInput(_))), "expected validation error for '{}', got {:?}", input, res);
        }
    }

    #[test]
    fn state_namespace_replaces_dashes() {
        let output = state_namespace("my-tenant", "prod-ns");
        assert_eq!(output, "my_tenant_prod_ns", "unexpected state namespace {}", output);
    }

    #[test]
    fn batch_source_names_are_derived_from_identity() {
        let sub = batch_source_subscription_name("t1", "n1", "src");
        assert_eq!(sub, "BatchSourceExecutor-t1/n1/src");
        let topic = batch_source_intermediate_topic("t1", "n1", "src");
        assert_eq!(topic, "persistent://t1/n1/src-intermediate");
    }

    #[test]
    fn object_name_is_deterministic_and_compliant() {
        let first = object_name("c1", "t1", "n1", "My_Func");
        let second = object_name("c1", "t1", "n1", "My_Func");
        let other = object_name("c1", "t2", "n1", "My_Func");
        assert_eq!(first, second, "expected object names to be deterministic");
        assert_ne!(first, other, "expected object names of distinct tenants to differ");
        assert!(first.starts_with("my-func-"), "unexpected object name {}", first);
        assert_eq!(first.len(), "my-func-".len() + OBJECT_NAME_HASH_LEN, "unexpected object name len {}", first);
    }

    #[test]
    fn replica_names_are_derived_from_object_name() {
        let job = job_name("f1-0a1b2c3d", ComponentKind::Function);
        assert_eq!(job, "f1-0a1b2c3d-function");
        assert_eq!(headless_service_name(&job), "f1-0a1b2c3d-function-headless");
    }

    #[test]
    fn package_url_uses_component_package_type() {
        let url = package_url(ComponentKind::Sink, "t1", "n1", "s1");
        assert_eq!(url, "sink://t1/n1/s1@latest");
    }
}
