//! 酒批/占罐写入
//!
//! 把通过校验的方案落成 Lot 与 TankAssignment，全部写入都在调用方的事务里。

use std::collections::BTreeSet;

use brewops_common::{TenantId, UserId};
use brewops_domain_core::Volume;
use chrono::Utc;
use tracing::debug;

use crate::domain::entities::{
    Lot, LotContribution, LotProfile, NewAssignment, TankAssignment,
};
use crate::domain::enums::{AssignmentStatus, BatchPhase};
use crate::domain::services::{first_conflict, AllocationPlan, ModeKind, PlannedAllocation};
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{AssignmentId, BatchId, LotId, Readings, TimeWindow};
use crate::error::{AllocationError, AllocationResult};

use super::snapshot::open_assignment_of;

pub struct CommitRequest<'a> {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub plan: &'a AllocationPlan,
    pub phase: BatchPhase,
    pub window: TimeWindow,
    /// 占罐记录挂在哪个批次名下
    pub primary_batch_id: BatchId,
    pub lot_code: String,
    pub profile: LotProfile,
    pub contributions: Vec<LotContribution>,
    /// 转罐时酒液立即入罐，占罐直接为 ACTIVE
    pub activate: bool,
    /// 这些酒批的占罐不参与重叠复查
    pub ignore_lots: BTreeSet<LotId>,
    pub readings: Readings,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// 拆分时为父酒批，混合时为目标酒批
    pub lot_id: LotId,
    pub assignment_ids: Vec<AssignmentId>,
    pub lots: Vec<Lot>,
    pub assignments: Vec<TankAssignment>,
}

impl CommitOutcome {
    /// 某个罐上新写入的酒批（拆分时为子酒批）
    pub fn lot_in_tank(&self, allocation: &PlannedAllocation) -> LotId {
        self.assignments
            .iter()
            .find(|a| a.tank_id == allocation.tank_id)
            .map(|a| a.lot_id)
            .unwrap_or(self.lot_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LotAssignmentWriter;

impl LotAssignmentWriter {
    pub fn new() -> Self {
        Self
    }

    pub async fn commit(
        &self,
        uow: &dyn UnitOfWork,
        request: CommitRequest<'_>,
    ) -> AllocationResult<CommitOutcome> {
        self.ensure_not_planned(uow, &request).await?;
        if request.activate {
            self.ensure_tanks_empty(uow, &request).await?;
        }
        self.recheck_overlaps(uow, &request).await?;

        let mut outcome = match request.plan.mode {
            ModeKind::Blend => self.blend_into_target(uow, &request).await?,
            _ if request.plan.is_multi_tank() => self.write_split(uow, &request).await?,
            _ => self.write_single(uow, &request).await?,
        };

        if !request.readings.is_empty() {
            uow.lots()
                .add_reading(
                    &outcome.lot_id,
                    &request.tenant_id,
                    &request.readings,
                    request.user_id,
                )
                .await?;
        }

        outcome.assignment_ids = outcome.assignments.iter().map(|a| a.id).collect();
        debug!(
            lot_id = %outcome.lot_id,
            assignments = outcome.assignment_ids.len(),
            mode = %request.plan.mode,
            "Plan written"
        );
        Ok(outcome)
    }

    /// 同一批次同一阶段只能有一份分配
    async fn ensure_not_planned(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<()> {
        for contribution in &request.contributions {
            let existing = uow
                .lots()
                .find_open_by_batch(&contribution.batch_id, &request.tenant_id)
                .await?;
            if existing
                .iter()
                .any(|lot| lot.phase == request.phase && !request.ignore_lots.contains(&lot.id))
            {
                return Err(AllocationError::DuplicatePlan {
                    batch_id: contribution.batch_id,
                    phase: request.phase,
                });
            }
        }
        Ok(())
    }

    /// 立即入罐时，目标罐不能还装着别的酒批
    async fn ensure_tanks_empty(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<()> {
        let tank_ids = request.plan.tank_ids();
        let open = uow
            .assignments()
            .find_open_by_tanks(&tank_ids, &request.tenant_id)
            .await?;
        let occupant = open.iter().find(|a| {
            a.status == AssignmentStatus::Active && !request.ignore_lots.contains(&a.lot_id)
        });
        match occupant {
            Some(active) => Err(AllocationError::TankUnavailable {
                tank_id: active.tank_id,
            }),
            None => Ok(()),
        }
    }

    /// 事务内复查时间窗，快照之后被别的请求抢占则报并发冲突
    async fn recheck_overlaps(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<()> {
        let tank_ids = request.plan.tank_ids();
        let open = uow
            .assignments()
            .find_open_by_tanks(&tank_ids, &request.tenant_id)
            .await?;
        let mut ignore = request.ignore_lots.clone();
        if let Some(target) = request.plan.target_lot_id {
            ignore.insert(target);
        }

        for tank_id in tank_ids {
            if let Some(conflict) = first_conflict(tank_id, &request.window, &open, &ignore) {
                return Err(AllocationError::ConcurrentModification(format!(
                    "tank {} was booked by assignment {} in the meantime",
                    tank_id, conflict.id
                )));
            }
        }
        Ok(())
    }

    fn new_assignment(
        &self,
        request: &CommitRequest<'_>,
        lot_id: LotId,
        allocation: &PlannedAllocation,
    ) -> AllocationResult<TankAssignment> {
        let mut assignment = TankAssignment::planned(
            NewAssignment {
                tenant_id: request.tenant_id,
                tank_id: allocation.tank_id,
                lot_id,
                batch_id: request.primary_batch_id,
                phase: request.phase,
                window: request.window,
                planned_volume: allocation.volume,
                notes: request.notes.clone(),
            },
            request.user_id,
        );
        if request.activate {
            // 计划开始在未来时，实际入罐时间取当前时刻
            let started_at = request.window.start().min(Utc::now());
            assignment.start(started_at, request.user_id)?;
        }
        Ok(assignment)
    }

    fn new_lot(&self, request: &CommitRequest<'_>) -> Lot {
        let mut lot = Lot::new(
            request.tenant_id,
            request.lot_code.clone(),
            request.phase,
            request.profile.clone(),
            request.contributions.clone(),
            request.user_id,
        );
        if request.activate {
            lot.activate(request.user_id);
        }
        lot
    }

    async fn write_single(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<CommitOutcome> {
        let allocation = request.plan.allocations.first().ok_or_else(|| {
            AllocationError::SelectionRequired("plan has no allocations".to_string())
        })?;

        let mut lot = self.new_lot(request);
        // 单罐时酒批体积即分配体积（转罐后扣除了损耗）
        lot.rescale(allocation.volume, request.user_id);
        uow.lots().save(&lot).await?;

        let assignment = self.new_assignment(request, lot.id, allocation)?;
        uow.assignments().save(&assignment).await?;

        Ok(CommitOutcome {
            lot_id: lot.id,
            assignment_ids: Vec::new(),
            lots: vec![lot],
            assignments: vec![assignment],
        })
    }

    /// 父酒批记录全部体积，每个罐一个子酒批
    async fn write_split(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<CommitOutcome> {
        let mut parent = self.new_lot(request);
        parent.rescale(request.plan.total_volume, request.user_id);
        uow.lots().save(&parent).await?;

        let mut lots = Vec::with_capacity(request.plan.allocations.len() + 1);
        let mut assignments = Vec::with_capacity(request.plan.allocations.len());
        for (index, allocation) in request.plan.allocations.iter().enumerate() {
            let child = parent.split_child(
                format!("{}.{}", request.lot_code, index + 1),
                allocation.volume,
            );
            uow.lots().save(&child).await?;

            let mut assignment = self.new_assignment(request, child.id, allocation)?;
            assignment.is_split_source = true;
            uow.assignments().save(&assignment).await?;

            lots.push(child);
            assignments.push(assignment);
        }

        let parent_id = parent.id;
        lots.insert(0, parent);
        Ok(CommitOutcome {
            lot_id: parent_id,
            assignment_ids: Vec::new(),
            lots,
            assignments,
        })
    }

    /// 混入目标酒批，并扩展其现有占罐
    async fn blend_into_target(
        &self,
        uow: &dyn UnitOfWork,
        request: &CommitRequest<'_>,
    ) -> AllocationResult<CommitOutcome> {
        let target_id = request.plan.target_lot_id.ok_or_else(|| {
            AllocationError::SelectionRequired("blend plan has no target lot".to_string())
        })?;
        let mut lot = uow
            .lots()
            .find_by_id(&target_id, &request.tenant_id)
            .await?
            .ok_or_else(|| AllocationError::not_found(format!("lot {}", target_id)))?;
        let mut assignment = open_assignment_of(uow, &target_id, &request.tenant_id)
            .await?
            .ok_or_else(|| {
                AllocationError::ConcurrentModification(format!(
                    "lot {} left its tank in the meantime",
                    lot.lot_code
                ))
            })?;

        let incoming: Volume = request.plan.total_volume;
        let ratio = incoming.ratio_of(request.contributions.iter().map(|c| c.volume).sum());
        let scaled: Vec<LotContribution> = request
            .contributions
            .iter()
            .map(|c| LotContribution {
                batch_id: c.batch_id,
                volume: c.volume.scale(ratio),
            })
            .collect();
        let base_batches = lot.batch_ids();
        lot.blend_in(&scaled, request.user_id);
        uow.lots().update(&lot).await?;

        assignment.absorb_blend(incoming, &request.window, base_batches, request.user_id);
        uow.assignments().update(&assignment).await?;

        Ok(CommitOutcome {
            lot_id: lot.id,
            assignment_ids: Vec::new(),
            lots: vec![lot],
            assignments: vec![assignment],
        })
    }
}

/// 酒批编号：批号加阶段后缀
pub fn lot_code(batch_number: &str, phase: BatchPhase) -> String {
    let suffix = match phase {
        BatchPhase::Fermenting => "F",
        BatchPhase::Conditioning => "C",
        BatchPhase::Ready => "R",
        _ => "X",
    };
    format!("{}-{}", batch_number, suffix)
}
