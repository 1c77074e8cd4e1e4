//! 占罐记录

use brewops_domain_core::{
    AggregateRoot, AuditInfo, Entity, TenantId, TenantOwned, UserId, Volume,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::{AssignmentStatus, BatchPhase};
use crate::domain::value_objects::{AssignmentId, BatchId, LotId, TankId, TimeWindow};
use crate::error::AllocationError;

/// 某酒批在某阶段、某时间窗内占用某个罐
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankAssignment {
    pub id: AssignmentId,
    pub tenant_id: TenantId,
    pub tank_id: TankId,
    pub lot_id: LotId,
    pub batch_id: BatchId,
    pub phase: BatchPhase,
    pub window: TimeWindow,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub status: AssignmentStatus,
    pub planned_volume: Volume,
    pub is_blend_target: bool,
    pub is_split_source: bool,
    /// 第一次被混入前的时间窗与批次，混入全部撤回后据此复原
    pub blend_base: Option<BlendBase>,
    pub notes: Option<String>,
    pub audit_info: AuditInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlendBase {
    pub window: TimeWindow,
    pub batch_ids: Vec<BatchId>,
}

/// 创建占罐记录所需参数
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub tenant_id: TenantId,
    pub tank_id: TankId,
    pub lot_id: LotId,
    pub batch_id: BatchId,
    pub phase: BatchPhase,
    pub window: TimeWindow,
    pub planned_volume: Volume,
    pub notes: Option<String>,
}

impl TankAssignment {
    pub fn planned(params: NewAssignment, user_id: Option<UserId>) -> Self {
        Self {
            id: AssignmentId::new(),
            tenant_id: params.tenant_id,
            tank_id: params.tank_id,
            lot_id: params.lot_id,
            batch_id: params.batch_id,
            phase: params.phase,
            window: params.window,
            actual_start: None,
            actual_end: None,
            status: AssignmentStatus::Planned,
            planned_volume: params.planned_volume,
            is_blend_target: false,
            is_split_source: false,
            blend_base: None,
            notes: params.notes,
            audit_info: AuditInfo::new(user_id),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// 与时间窗冲突（仅 PLANNED/ACTIVE 参与）
    pub fn blocks(&self, window: &TimeWindow) -> bool {
        self.is_open() && self.window.overlaps(window)
    }

    /// 接收混入的批次：体积累加，时间窗扩展到覆盖来料窗口
    pub fn absorb_blend(
        &mut self,
        incoming: Volume,
        window: &TimeWindow,
        base_batches: Vec<BatchId>,
        user_id: Option<UserId>,
    ) {
        if self.blend_base.is_none() {
            self.blend_base = Some(BlendBase {
                window: self.window,
                batch_ids: base_batches,
            });
        }
        self.planned_volume += incoming;
        self.is_blend_target = true;
        self.window = self.window.span(window);
        self.touch(user_id);
    }

    /// 批次撤出混合后按比例缩减体积
    ///
    /// 剩余批次全部属于混入前的酒批时，恢复原时间窗。
    pub fn release_blend(&mut self, ratio: f64, remaining: &[BatchId], user_id: Option<UserId>) {
        self.planned_volume = self.planned_volume.scale(ratio);
        let restored = self
            .blend_base
            .as_ref()
            .filter(|base| remaining.iter().all(|id| base.batch_ids.contains(id)))
            .map(|base| base.window);
        if let Some(window) = restored {
            self.window = window;
            self.is_blend_target = false;
            self.blend_base = None;
        }
        self.touch(user_id);
    }

    /// 记录实际入罐
    pub fn start(
        &mut self,
        at: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Result<(), AllocationError> {
        if self.status != AssignmentStatus::Planned {
            return Err(AllocationError::invalid_state(format!(
                "assignment {} is {} and cannot be started",
                self.id, self.status
            )));
        }
        self.status = AssignmentStatus::Active;
        self.actual_start = Some(at);
        self.touch(user_id);
        Ok(())
    }

    /// 关闭占罐；从未开始过的记录以关闭时间作为实际开始
    pub fn complete(&mut self, at: DateTime<Utc>, user_id: Option<UserId>) {
        if !self.is_open() {
            return;
        }
        self.actual_start.get_or_insert(at);
        self.actual_end = Some(at);
        self.status = AssignmentStatus::Completed;
        self.touch(user_id);
    }

    pub fn cancel(&mut self, user_id: Option<UserId>) -> Result<(), AllocationError> {
        if self.status != AssignmentStatus::Planned {
            return Err(AllocationError::invalid_state(format!(
                "only planned assignments can be cancelled, {} is {}",
                self.id, self.status
            )));
        }
        self.status = AssignmentStatus::Cancelled;
        self.touch(user_id);
        Ok(())
    }
}

impl Entity for TankAssignment {
    type Id = AssignmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for TankAssignment {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl AggregateRoot for TankAssignment {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assignment() -> TankAssignment {
        let start = Utc::now();
        TankAssignment::planned(
            NewAssignment {
                tenant_id: TenantId::new(),
                tank_id: TankId::new(),
                lot_id: LotId::new(),
                batch_id: BatchId::new(),
                phase: BatchPhase::Fermenting,
                window: TimeWindow::new(start, start + Duration::days(10)).unwrap(),
                planned_volume: Volume::liters(300.0),
                notes: None,
            },
            None,
        )
    }

    #[test]
    fn test_closed_assignments_no_longer_block() {
        let mut assignment = assignment();
        let window = assignment.window;
        assert!(assignment.blocks(&window));

        assignment.complete(Utc::now(), None);
        assert!(!assignment.blocks(&window));
        assert!(assignment.actual_start.is_some());
    }

    #[test]
    fn test_withdrawing_last_blended_batch_restores_window() {
        let mut target = assignment();
        let own_window = target.window;
        let owner = target.batch_id;
        let late = TimeWindow::new(own_window.start(), own_window.end() + Duration::days(6)).unwrap();
        let first = BatchId::new();
        let second = BatchId::new();

        target.absorb_blend(Volume::liters(100.0), &late, vec![owner], None);
        target.absorb_blend(Volume::liters(100.0), &own_window, vec![owner, first], None);
        assert_eq!(target.window.end(), late.end());
        assert!(target.planned_volume.approx_eq(Volume::liters(500.0), 0.01));

        // 还有另一个混入批次，时间窗保持
        target.release_blend(0.8, &[owner, second], None);
        assert!(target.is_blend_target);
        assert_eq!(target.window.end(), late.end());

        target.release_blend(0.75, &[owner], None);
        assert!(!target.is_blend_target);
        assert_eq!(target.window, own_window);
        assert!(target.blend_base.is_none());
        assert!(target.planned_volume.approx_eq(Volume::liters(300.0), 0.01));
    }

    #[test]
    fn test_start_only_from_planned() {
        let mut assignment = assignment();
        assignment.start(Utc::now(), None).unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Active);
        assert!(assignment.start(Utc::now(), None).is_err());
        assert!(assignment.cancel(None).is_err());
    }
}
