//! # 指标收集器
//!
//! 每个完成的请求更新一次全局聚合和按路径聚合，快照时计算平均值与成功率。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::types::{Aggregate, MetricsSnapshot};

/// 最多单独跟踪的路径数，超出后计入溢出桶
pub const MAX_TRACKED_PATHS: usize = 1024;

/// 溢出桶的键
pub const OVERFLOW_PATH_KEY: &str = "<other>";

#[derive(Debug)]
struct MetricsState {
    global: Aggregate,
    paths: HashMap<String, Aggregate>,
    since: DateTime<Utc>,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            global: Aggregate::default(),
            paths: HashMap::new(),
            since: Utc::now(),
        }
    }
}

/// 指标收集器
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 记录一个完成的请求
    pub fn record(&self, path: &str, status: u16, duration: Duration) {
        let mut state = self.lock();
        state.global.record(status, duration);

        let key = if state.paths.contains_key(path) || state.paths.len() < MAX_TRACKED_PATHS {
            path
        } else {
            OVERFLOW_PATH_KEY
        };
        state
            .paths
            .entry(key.to_string())
            .or_default()
            .record(status, duration);
    }

    /// 当前快照
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock();
        MetricsSnapshot {
            global: state.global.snapshot(),
            paths: state
                .paths
                .iter()
                .map(|(path, aggregate)| (path.clone(), aggregate.snapshot()))
                .collect(),
            collecting_since: state.since,
        }
    }

    /// 清零所有聚合
    pub fn reset(&self) {
        *self.lock() = MetricsState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot.global.total_count, 0);
        assert_eq!(snapshot.global.average_duration, Duration::ZERO);
        assert_eq!(snapshot.global.min_duration, Duration::ZERO);
        assert!(snapshot.paths.is_empty());
    }

    #[test]
    fn test_success_and_failure_buckets() {
        let collector = MetricsCollector::new();
        collector.record("/api/v1/job", 200, Duration::from_millis(10));
        collector.record("/api/v1/job", 302, Duration::from_millis(20));
        collector.record("/api/v1/job", 404, Duration::from_millis(30));
        collector.record("/api/v1/auth/login", 503, Duration::from_millis(40));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.global.success_count, 2);
        assert_eq!(snapshot.global.failure_count, 2);
        assert_eq!(
            snapshot.global.status_codes,
            BTreeMap::from([(200, 1), (302, 1), (404, 1), (503, 1)])
        );

        let job = &snapshot.paths["/api/v1/job"];
        assert_eq!(job.total_count, 3);
        assert_eq!(job.average_duration, Duration::from_millis(20));
        // 按路径自身的成功与失败计算
        assert!((job.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!(snapshot.paths["/api/v1/auth/login"].success_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let collector = MetricsCollector::new();
        collector.record("/a", 200, Duration::from_millis(5));
        collector.reset();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.global.total_count, 0);
        assert!(snapshot.paths.is_empty());
    }

    #[test]
    fn test_path_cardinality_is_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..=MAX_TRACKED_PATHS {
            collector.record(&format!("/api/v1/users/{i}"), 200, Duration::from_millis(1));
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.paths.len(), MAX_TRACKED_PATHS + 1);
        assert_eq!(snapshot.paths[OVERFLOW_PATH_KEY].total_count, 1);
        assert_eq!(snapshot.global.total_count, (MAX_TRACKED_PATHS + 1) as u64);
    }

    #[test]
    fn test_snapshot_serializes_durations_as_millis() {
        let collector = MetricsCollector::new();
        collector.record("/a", 200, Duration::from_micros(1500));
        let value = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(value["global"]["max_duration_ms"], 1.5);
        assert_eq!(value["global"]["status_codes"]["200"], 1);
    }

    proptest! {
        #[test]
        fn prop_aggregate_matches_recorded_durations(
            samples in prop::collection::vec((0u64..5_000_000, prop::sample::select(vec![200u16, 201, 301, 400, 404, 429, 500, 503])), 1..64)
        ) {
            let collector = MetricsCollector::new();
            for (micros, status) in &samples {
                collector.record("/p", *status, Duration::from_micros(*micros));
            }

            let snapshot = collector.snapshot();
            let path = &snapshot.paths["/p"];
            let durations: Vec<Duration> = samples.iter().map(|(m, _)| Duration::from_micros(*m)).collect();
            let total: Duration = durations.iter().sum();
            let n = u32::try_from(samples.len()).unwrap();

            prop_assert_eq!(path.total_count, u64::from(n));
            prop_assert_eq!(path.min_duration, *durations.iter().min().unwrap());
            prop_assert_eq!(path.max_duration, *durations.iter().max().unwrap());
            prop_assert_eq!(path.average_duration, total / n);
            prop_assert_eq!(path.status_codes.values().sum::<u64>(), u64::from(n));
            prop_assert_eq!(path.success_count + path.failure_count, u64::from(n));
            prop_assert_eq!(&snapshot.global, path);
        }
    }
}
