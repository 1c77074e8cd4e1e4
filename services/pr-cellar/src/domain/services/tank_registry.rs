//! 罐台账
//!
//! 按阶段能力、清洗状态与占用情况筛选候选罐，只读。

use crate::domain::entities::{Tank, TankAssignment};
use crate::domain::enums::{AssignmentStatus, BatchPhase, TankStatus};
use crate::domain::value_objects::TimeWindow;

/// 一个罐及其仍未关闭的占罐记录
#[derive(Debug, Clone)]
pub struct TankSnapshot {
    pub tank: Tank,
    pub open_assignments: Vec<TankAssignment>,
}

impl TankSnapshot {
    pub fn has_active_assignment(&self) -> bool {
        self.open_assignments
            .iter()
            .any(|a| a.status == AssignmentStatus::Active)
    }

    pub fn has_open_assignment(&self) -> bool {
        self.open_assignments.iter().any(|a| a.is_open())
    }
}

/// 候选罐筛选条件
#[derive(Debug, Clone, Copy)]
pub struct CandidateFilter {
    pub phase: BatchPhase,
    pub exclude_needs_cip: bool,
    pub exclude_occupied: bool,
    /// 给定时间窗时，排除在该窗口内已被预订的罐
    pub window: Option<TimeWindow>,
}

impl CandidateFilter {
    pub fn for_phase(phase: BatchPhase) -> Self {
        Self {
            phase,
            exclude_needs_cip: true,
            exclude_occupied: true,
            window: None,
        }
    }

    pub fn accepts(&self, snapshot: &TankSnapshot) -> bool {
        let tank = &snapshot.tank;
        if !tank.supports(self.phase) || tank.is_out_of_service() {
            return false;
        }
        if self.exclude_needs_cip && tank.needs_cip {
            return false;
        }
        if self.exclude_occupied
            && (tank.status == TankStatus::Occupied || snapshot.has_active_assignment())
        {
            return false;
        }
        match &self.window {
            Some(window) => !snapshot.open_assignments.iter().any(|a| a.blocks(window)),
            // 无时间窗时任何未关闭的预订都算占用
            None => !(self.exclude_occupied && snapshot.has_open_assignment()),
        }
    }
}

/// 过滤候选罐，按罐名排序
pub fn filter_candidates(snapshots: Vec<TankSnapshot>, filter: &CandidateFilter) -> Vec<Tank> {
    let mut tanks: Vec<Tank> = snapshots
        .into_iter()
        .filter(|snapshot| filter.accepts(snapshot))
        .map(|snapshot| snapshot.tank)
        .collect();
    tanks.sort_by(|a, b| a.name.cmp(&b.name));
    tanks
}
