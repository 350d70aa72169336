//! Replica stats collection.
//!
//! Stats are fetched from every replica of a component concurrently. Each call runs in its own
//! task on its own channel, and merges its reply into the caller-owned accumulator of the
//! replica. Failed calls are logged and leave the accumulator untouched.

mod models;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

use crate::config::Config;
use crate::grpc::{Empty, InstanceControlClient, MetricsData};
use crate::utils;

pub use models::{ComponentStats, InstanceStats, WindowStats};

const METRIC_REPLICA_STATS_FAILURES: &str = "mesh_replica_stats_failures";

/// A stats accumulator shared between the caller and a replica call.
pub type SharedStats = Arc<Mutex<InstanceStats>>;

/// A stub of the instance control service of a single replica.
#[async_trait]
pub trait InstanceControl: Send {
    /// Fetch the current metrics of the replica.
    async fn fetch_metrics(&mut self) -> Result<MetricsData, tonic::Status>;
}

/// A factory of replica channels.
pub trait ChannelFactory: Send + Sync {
    /// Open a plaintext channel to the given replica.
    fn open(&self, address: &str, port: u16) -> Result<Box<dyn InstanceControl>>;
}

/// A channel factory building lazily connected tonic channels.
#[derive(Clone, Copy, Debug, Default)]
pub struct GrpcChannelFactory;

impl ChannelFactory for GrpcChannelFactory {
    fn open(&self, address: &str, port: u16) -> Result<Box<dyn InstanceControl>> {
        let channel = Endpoint::from_shared(format!("http://{}:{}", address, port))
            .context("invalid replica endpoint")?
            .connect_lazy();
        Ok(Box::new(InstanceControlClient::new(channel)))
    }
}

#[async_trait]
impl InstanceControl for InstanceControlClient<Channel> {
    async fn fetch_metrics(&mut self) -> Result<MetricsData, tonic::Status> {
        self.get_metrics(Empty {}).await.map(|res| res.into_inner())
    }
}

/// An in-flight stats call to a single replica.
pub struct PendingCall {
    ordinal: u32,
    handle: JoinHandle<()>,
    stats: SharedStats,
    expired: Arc<AtomicBool>,
}

impl PendingCall {
    /// The ordinal of the replica being called.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

/// Fans stats calls out to the replicas of a component.
pub struct StatsAggregator {
    factory: Arc<dyn ChannelFactory>,
    port: u16,
    cluster_domain: String,
}

impl StatsAggregator {
    /// Create a new instance.
    pub fn new(config: &Config, factory: Arc<dyn ChannelFactory>) -> Self {
        metrics::register_counter!(METRIC_REPLICA_STATS_FAILURES, metrics::Unit::Count, "replica stats calls which failed");
        Self {
            factory,
            port: config.instance_control_port,
            cluster_domain: config.cluster_domain.clone(),
        }
    }

    /// Issue one stats call per replica pod, returning the pending calls.
    ///
    /// Pods whose ordinal can not be parsed from their name, or which have no matching stats
    /// skeleton, are skipped. This never blocks on replica calls.
    #[tracing::instrument(level = "debug", skip(self, pods, skeletons))]
    pub fn collect(&self, pods: &[String], skeletons: &[SharedStats], subdomain: &str, owner: &str, namespace: &str) -> Vec<PendingCall> {
        let mut dispatched = HashSet::new();
        let mut calls = Vec::with_capacity(pods.len());
        for pod in pods {
            let ordinal = match utils::parse_ordinal(owner, pod) {
                Some(ordinal) => ordinal,
                None => {
                    tracing::warn!(pod = %pod, owner, "invalid replica ordinal in pod name, skipping");
                    continue;
                }
            };
            let stats = match skeletons.iter().find(|stats| stats.lock().instance_id == ordinal) {
                Some(stats) => stats.clone(),
                None => {
                    tracing::warn!(owner, ordinal, namespace, "no stats found for replica, skipping");
                    continue;
                }
            };
            if !dispatched.insert(ordinal) {
                tracing::warn!(pod = %pod, ordinal, "replica ordinal already dispatched, skipping");
                continue;
            }
            let address = utils::pod_address(pod, subdomain, namespace, &self.cluster_domain);
            let stub = match self.factory.open(&address, self.port) {
                Ok(stub) => stub,
                Err(err) => {
                    tracing::warn!(address = %address, error = ?err, "error opening replica channel");
                    metrics::increment_counter!(METRIC_REPLICA_STATS_FAILURES);
                    continue;
                }
            };
            let expired = Arc::new(AtomicBool::new(false));
            let handle = tokio::spawn(fetch_stats(stub, stats.clone(), expired.clone(), owner.to_string(), ordinal, namespace.to_string()));
            calls.push(PendingCall {
                ordinal,
                handle,
                stats,
                expired,
            });
        }
        calls
    }
}

async fn fetch_stats(
    mut stub: Box<dyn InstanceControl>, stats: SharedStats, expired: Arc<AtomicBool>, owner: String, ordinal: u32, namespace: String,
) {
    let res = stub.fetch_metrics().await;
    tracing::debug!(ordinal, "closing replica channel");
    drop(stub);
    match res {
        Ok(data) => {
            let mut stats = stats.lock();
            if !expired.load(Ordering::SeqCst) {
                stats.merge(&data);
            }
        }
        Err(status) => {
            tracing::warn!(owner = %owner, ordinal, namespace = %namespace, error = %status, "error fetching replica stats");
            metrics::increment_counter!(METRIC_REPLICA_STATS_FAILURES);
        }
    }
}

/// Await the given calls until the deadline, returning the number of calls which completed.
///
/// Calls still pending at the deadline are aborted, and will not touch their accumulators.
pub async fn await_all(calls: Vec<PendingCall>, deadline: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + deadline;
    let mut completed = 0;
    for mut call in calls {
        match tokio::time::timeout_at(deadline, &mut call.handle).await {
            Ok(Ok(())) => completed += 1,
            Ok(Err(err)) => tracing::warn!(ordinal = call.ordinal, error = %err, "replica stats task failed"),
            Err(_) => {
                {
                    let _stats = call.stats.lock();
                    call.expired.store(true, Ordering::SeqCst);
                }
                call.handle.abort();
                tracing::warn!(ordinal = call.ordinal, "replica stats call did not complete before the deadline");
            }
        }
    }
    completed
}
