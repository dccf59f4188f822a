//! 指标类型定义：聚合器与对外快照

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::{DurationMilliSecondsWithFrac, serde_as};

/// 请求是否计入成功桶
#[must_use]
pub const fn is_success_status(status: u16) -> bool {
    status >= 200 && status < 400
}

/// 一组请求的聚合（全局或单个路径）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub total_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Duration,
    pub status_codes: BTreeMap<u16, u64>,
}

impl Aggregate {
    pub fn record(&mut self, status: u16, duration: Duration) {
        self.total_count += 1;
        if is_success_status(status) {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.total_duration += duration;
        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = self.max_duration.max(duration);
        *self.status_codes.entry(status).or_insert(0) += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> AggregateSnapshot {
        let average_duration = if self.total_count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / u32::try_from(self.total_count).unwrap_or(u32::MAX)
        };
        let decided = self.success_count + self.failure_count;
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if decided == 0 {
            0.0
        } else {
            self.success_count as f64 / decided as f64 * 100.0
        };

        AggregateSnapshot {
            total_count: self.total_count,
            success_count: self.success_count,
            failure_count: self.failure_count,
            success_rate,
            total_duration: self.total_duration,
            min_duration: self.min_duration.unwrap_or_default(),
            max_duration: self.max_duration,
            average_duration,
            status_codes: self.status_codes.clone(),
        }
    }
}

/// 聚合快照
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub total_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// 百分比，0 ~ 100
    pub success_rate: f64,
    #[serde(rename = "total_duration_ms")]
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub total_duration: Duration,
    #[serde(rename = "min_duration_ms")]
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub min_duration: Duration,
    #[serde(rename = "max_duration_ms")]
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub max_duration: Duration,
    #[serde(rename = "average_duration_ms")]
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub average_duration: Duration,
    pub status_codes: BTreeMap<u16, u64>,
}

/// 指标快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub global: AggregateSnapshot,
    pub paths: BTreeMap<String, AggregateSnapshot>,
    pub collecting_since: DateTime<Utc>,
}
