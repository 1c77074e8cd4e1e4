//! 排罐策略配置

use brewops_config::PlanningConfig;
use chrono::{DateTime, Utc};

use crate::domain::value_objects::{BlendingConfig, TimeWindow};
use crate::error::AllocationResult;

/// 规划策略
#[derive(Debug, Clone)]
pub struct PlanningPolicy {
    /// 体积守恒容差（升）
    pub tolerance: f64,
    pub blending: BlendingConfig,
    /// 未指定结束时间时的默认占罐天数
    pub default_window_days: i64,
}

impl PlanningPolicy {
    /// 未给出结束时间时按默认天数推算
    pub fn window(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> AllocationResult<TimeWindow> {
        match end {
            Some(end) => TimeWindow::new(start, end),
            None => TimeWindow::starting_at(start, self.default_window_days),
        }
    }
}

impl From<&PlanningConfig> for PlanningPolicy {
    fn from(config: &PlanningConfig) -> Self {
        Self {
            tolerance: config.volume_tolerance,
            blending: BlendingConfig::from(&config.blending),
            default_window_days: config.default_window_days,
        }
    }
}

impl Default for PlanningPolicy {
    fn default() -> Self {
        Self::from(&PlanningConfig::default())
    }
}
