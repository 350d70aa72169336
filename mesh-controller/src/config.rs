//! Runtime configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// The default port of the instance control service exposed by every replica.
pub const DEFAULT_INSTANCE_CONTROL_PORT: u16 = 9093;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,

    /// The name of the Pulsar cluster the components run against.
    pub cluster_name: String,
    /// The Kubernetes namespace in which component CRs & pods live.
    pub job_namespace: String,
    /// The cluster DNS apex used to build pod addresses.
    #[serde(default = "Config::default_cluster_domain")]
    pub cluster_domain: String,

    /// The URL of the state storage service.
    ///
    /// When unset, function state operations report the state store as unavailable.
    #[serde(default)]
    pub state_storage_service_url: Option<String>,
    /// The port of the instance control service exposed by every replica.
    #[serde(default = "Config::default_instance_control_port")]
    pub instance_control_port: u16,

    /// The total number of attempts made for each cleanup action.
    #[serde(default = "Config::default_cleanup_max_attempts")]
    pub cleanup_max_attempts: u32,
    /// The delay between attempts of a cleanup action, in milliseconds.
    #[serde(default = "Config::default_cleanup_retry_delay_ms")]
    pub cleanup_retry_delay_ms: u64,
    /// The deadline applied to replica stats collection, in seconds.
    #[serde(default = "Config::default_timeout_seconds")]
    pub stats_timeout_seconds: u64,
    /// The timeout applied to each K8s API call, in seconds.
    #[serde(default = "Config::default_timeout_seconds")]
    pub api_timeout_seconds: u64,

    /// Component artifacts are uploaded to the package service, and must be deleted with the component.
    #[serde(default)]
    pub upload_enabled: bool,
    /// Components are deployed with TLS material which must be deleted with the component.
    #[serde(default)]
    pub tls_enabled: bool,
    /// Enforce authorization of callers.
    #[serde(default)]
    pub authorization_enabled: bool,
    /// Roles which are granted all operations.
    #[serde(default)]
    pub superuser_roles: Vec<String>,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds the application
    /// config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        Ok(config)
    }

    /// The delay between attempts of a cleanup action.
    pub fn cleanup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_retry_delay_ms)
    }

    /// The deadline applied to replica stats collection.
    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_seconds)
    }

    /// The timeout applied to each K8s API call.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    fn default_cluster_domain() -> String {
        "cluster.local".into()
    }

    fn default_instance_control_port() -> u16 {
        DEFAULT_INSTANCE_CONTROL_PORT
    }

    fn default_cleanup_max_attempts() -> u32 {
        10
    }

    fn default_cleanup_retry_delay_ms() -> u64 {
        1000
    }

    fn default_timeout_seconds() -> u64 {
        10
    }

    /// Build a config for use in tests, backed by a temporary state storage directory.
    #[cfg(test)]
    pub fn new_test() -> Result<(Arc<Self>, tempfile::TempDir)> {
        let tmpdir = tempfile::tempdir_in("/tmp").context("error creating tmp dir in /tmp")?;
        Ok((
            Arc::new(Self {
                rust_log: "".into(),
                cluster_name: "test-cluster".into(),
                job_namespace: "default".into(),
                cluster_domain: Self::default_cluster_domain(),
                state_storage_service_url: Some(tmpdir.path().to_string_lossy().to_string()),
                instance_control_port: DEFAULT_INSTANCE_CONTROL_PORT,
                cleanup_max_attempts: 3,
                cleanup_retry_delay_ms: 5,
                stats_timeout_seconds: 1,
                api_timeout_seconds: 1,
                upload_enabled: false,
                tls_enabled: false,
                authorization_enabled: false,
                superuser_roles: vec![],
            }),
            tmpdir,
        ))
    }
}
