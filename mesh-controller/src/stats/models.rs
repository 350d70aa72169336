use std::collections::HashMap;

use serde::Serialize;

use crate::grpc::MetricsData;

/// Counters of a single stats window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub received_total: i64,
    pub processed_successfully_total: i64,
    pub system_exceptions_total: i64,
    pub user_exceptions_total: i64,
    pub avg_process_latency: Option<f64>,
}

impl WindowStats {
    fn add(&mut self, other: &WindowStats) {
        self.received_total += other.received_total;
        self.processed_successfully_total += other.processed_successfully_total;
        self.system_exceptions_total += other.system_exceptions_total;
        self.user_exceptions_total += other.user_exceptions_total;
    }
}

/// The stats of a single component instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStats {
    pub instance_id: u32,
    #[serde(flatten)]
    pub totals: WindowStats,
    pub one_min: WindowStats,
    pub last_invocation: Option<i64>,
    pub user_metrics: HashMap<String, f64>,
}

impl InstanceStats {
    /// Create an empty stats skeleton for the given instance.
    pub fn new(instance_id: u32) -> Self {
        Self {
            instance_id,
            ..Default::default()
        }
    }

    /// Merge the metrics reported by the instance into these stats.
    pub fn merge(&mut self, data: &MetricsData) {
        self.totals = WindowStats {
            received_total: data.received_total,
            processed_successfully_total: data.processed_successfully_total,
            system_exceptions_total: data.system_exceptions_total,
            user_exceptions_total: data.user_exceptions_total,
            avg_process_latency: non_zero(data.avg_process_latency),
        };
        self.one_min = WindowStats {
            received_total: data.received_total_1min,
            processed_successfully_total: data.processed_successfully_total_1min,
            system_exceptions_total: data.system_exceptions_total_1min,
            user_exceptions_total: data.user_exceptions_total_1min,
            avg_process_latency: non_zero(data.avg_process_latency_1min),
        };
        self.last_invocation = Some(data.last_invocation).filter(|ts| *ts != 0);
        self.user_metrics = data.user_metrics.clone();
    }
}

/// The stats of a component across all of its instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStats {
    #[serde(flatten)]
    pub totals: WindowStats,
    pub one_min: WindowStats,
    pub last_invocation: Option<i64>,
    pub instances: Vec<InstanceStats>,
}

impl ComponentStats {
    /// Calculate the overall stats of the given instances.
    ///
    /// Counters are summed, latencies are averaged over the instances which reported one, and the
    /// latest invocation wins.
    pub fn calculate_overall(instances: Vec<InstanceStats>) -> Self {
        let mut stats = Self::default();
        for instance in &instances {
            stats.totals.add(&instance.totals);
            stats.one_min.add(&instance.one_min);
            stats.last_invocation = stats.last_invocation.max(instance.last_invocation);
        }
        stats.totals.avg_process_latency = mean(instances.iter().filter_map(|inst| inst.totals.avg_process_latency));
        stats.one_min.avg_process_latency = mean(instances.iter().filter_map(|inst| inst.one_min.avg_process_latency));
        stats.instances = instances;
        stats
    }
}

fn non_zero(val: f64) -> Option<f64> {
    if val == 0.0 {
        None
    } else {
        Some(val)
    }
}

fn mean(vals: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = vals.fold((0.0, 0u32), |(sum, count), val| (sum + val, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}
