//! 占罐时间窗

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AllocationError;

/// 半开区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AllocationError> {
        if end <= start {
            return Err(AllocationError::validation(format!(
                "window end {} must be after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// 从开始时间起持续若干天
    pub fn starting_at(start: DateTime<Utc>, days: i64) -> Result<Self, AllocationError> {
        let end = Duration::try_days(days)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or_else(|| {
                AllocationError::validation(format!(
                    "window of {} days from {} is out of range",
                    days, start
                ))
            })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 半开区间重叠：首尾相接不算冲突
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// 同时覆盖两个时间窗的最小窗口
    pub fn span(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}
