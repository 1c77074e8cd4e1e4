//! 转罐编排
//!
//! 批次阶段状态机。每个命令在一个可写事务中完成：
//! 读取、规划、写入、关闭源占罐、记录转罐，任何一步失败整体回滚。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use brewops_common::{TenantId, UserId};
use brewops_domain_core::Volume;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::PlanningPolicy;
use crate::domain::entities::{
    Batch, Lot, LotContribution, LotProfile, NewAssignment, Tank, TankAssignment, Transfer,
    TransferLeg,
};
use crate::domain::enums::{AssignmentStatus, BatchPhase, TransferStatus, TransferType};
use crate::domain::services::{
    first_conflict, planner, AllocationPlan, AllocationRequest, IncomingProfile, ModeKind,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::value_objects::{BatchId, LotId, TankId, TimeWindow};
use crate::error::{AllocationError, AllocationResult};
use crate::infrastructure::observability::metrics;

use super::commands::*;
use super::snapshot::{build_snapshot, SnapshotRequest};
use super::writer::{lot_code, CommitOutcome, CommitRequest, LotAssignmentWriter};

pub struct TransferOrchestrator {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    policy: PlanningPolicy,
    writer: LotAssignmentWriter,
}

/// 转罐源：批次在当前阶段的酒批及其占罐
#[derive(Clone)]
struct Sources {
    lots: Vec<Lot>,
    assignments: Vec<TankAssignment>,
    volume: Volume,
    contributions: BTreeMap<BatchId, Volume>,
    profile: LotProfile,
}

impl Sources {
    fn tank_ids(&self) -> BTreeSet<TankId> {
        self.assignments.iter().map(|a| a.tank_id).collect()
    }

    fn lot_ids(&self) -> BTreeSet<LotId> {
        self.lots.iter().map(|l| l.id).collect()
    }

    /// 按转罐后体积等比缩放的贡献
    fn scaled_contributions(&self, destination: Volume) -> Vec<LotContribution> {
        let ratio = destination.ratio_of(self.volume);
        self.contributions
            .iter()
            .map(|(batch_id, volume)| LotContribution {
                batch_id: *batch_id,
                volume: volume.scale(ratio),
            })
            .collect()
    }

    fn batch_ids(&self) -> Vec<BatchId> {
        self.contributions.keys().copied().collect()
    }
}

impl TransferOrchestrator {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, policy: PlanningPolicy) -> Self {
        Self {
            uow_factory,
            policy,
            writer: LotAssignmentWriter::new(),
        }
    }

    pub fn policy(&self) -> &PlanningPolicy {
        &self.policy
    }

    /// 首次入罐：规划发酵罐并提交
    pub async fn plan_and_commit(
        &self,
        cmd: PlanAndCommitCommand,
    ) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            cmd.validate()?;
            let uow = self.uow_factory.begin().await?;
            let result = self.plan_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("plan_and_commit", started, &result);

        if let Ok(outcome) = &result {
            info!(
                tenant_id = %cmd.tenant_id,
                lot_id = ?outcome.lot_id,
                batches = cmd.batch_ids.len(),
                assignments = outcome.assignments.len(),
                "Allocation committed"
            );
        }
        result
    }

    /// 带罐变化（或原罐留存）的阶段转换
    pub async fn transfer_phase(
        &self,
        cmd: TransferPhaseCommand,
    ) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            cmd.validate()?;
            let uow = self.uow_factory.begin().await?;
            let result = self.transfer_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("transfer_phase", started, &result);

        if let Ok(outcome) = &result {
            info!(
                tenant_id = %cmd.tenant_id,
                batch_id = %cmd.batch_id,
                to_phase = %cmd.to_phase,
                stay_in_same_tank = cmd.stay_in_same_tank,
                transfers = outcome.transfers.len(),
                "Phase transfer committed"
            );
        }
        result
    }

    /// 不涉及换罐的阶段推进
    pub async fn advance_phase(
        &self,
        cmd: AdvancePhaseCommand,
    ) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            cmd.validate()?;
            let uow = self.uow_factory.begin().await?;
            let result = self.advance_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("advance_phase", started, &result);

        if result.is_ok() {
            info!(
                tenant_id = %cmd.tenant_id,
                batch_id = %cmd.batch_id,
                to_phase = %cmd.to_phase,
                "Batch phase advanced"
            );
        }
        result
    }

    /// 取消批次并释放其占罐
    pub async fn cancel_batch(&self, cmd: CancelBatchCommand) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            let uow = self.uow_factory.begin().await?;
            let result = self.cancel_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("cancel_batch", started, &result);

        if let Ok(outcome) = &result {
            info!(
                tenant_id = %cmd.tenant_id,
                batch_id = %cmd.batch_id,
                reason = cmd.reason.as_deref().unwrap_or(""),
                lots = outcome.lots.len(),
                "Batch cancelled"
            );
        }
        result
    }

    /// 记录实际入罐
    pub async fn start_assignment(
        &self,
        cmd: StartAssignmentCommand,
    ) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            let uow = self.uow_factory.begin().await?;
            let result = self.start_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("start_assignment", started, &result);

        if result.is_ok() {
            info!(
                tenant_id = %cmd.tenant_id,
                assignment_id = %cmd.assignment_id,
                "Assignment started"
            );
        }
        result
    }

    /// CIP 完成
    pub async fn complete_cip(&self, cmd: CompleteCipCommand) -> AllocationResult<CommandOutcome> {
        let started = Instant::now();
        let result: AllocationResult<CommandOutcome> = async {
            let uow = self.uow_factory.begin().await?;
            let result = self.cip_in(uow.as_ref(), &cmd).await;
            finish(uow, result).await
        }
        .await;
        observe("complete_cip", started, &result);

        if result.is_ok() {
            info!(tenant_id = %cmd.tenant_id, tank_id = %cmd.tank_id, "CIP completed");
        }
        result
    }

    // ========== 事务内步骤 ==========

    async fn plan_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &PlanAndCommitCommand,
    ) -> AllocationResult<CommandOutcome> {
        let phase = BatchPhase::Fermenting;

        let mut batches = Vec::with_capacity(cmd.batch_ids.len());
        for batch_id in &cmd.batch_ids {
            let batch = load_batch(uow, batch_id, &cmd.tenant_id).await?;
            if !matches!(batch.phase, BatchPhase::Planned | BatchPhase::Brewing) {
                return Err(AllocationError::InvalidTransition {
                    from: batch.phase,
                    to: phase,
                });
            }
            batches.push(batch);
        }
        let primary = batches
            .first()
            .cloned()
            .ok_or_else(|| AllocationError::validation("at least one batch is required"))?;

        let window = self.policy.window(cmd.window_start, cmd.window_end)?;
        let total: Volume = batches.iter().map(|b| b.volume).sum();

        let snapshot = build_snapshot(
            uow,
            SnapshotRequest {
                tenant_id: cmd.tenant_id,
                phase,
                window,
                mode: &cmd.mode,
                incoming: incoming_profile(&primary, phase),
                ignore_lots: BTreeSet::new(),
            },
            &self.policy,
        )
        .await?;
        let plan = planner::plan(
            &AllocationRequest {
                total_volume: total,
                mode: cmd.mode.clone(),
            },
            &snapshot,
        )?;

        let written = self
            .writer
            .commit(
                uow,
                CommitRequest {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    plan: &plan,
                    phase,
                    window,
                    primary_batch_id: primary.id,
                    lot_code: lot_code(&primary.batch_number, phase),
                    profile: lot_profile(&primary),
                    contributions: batches
                        .iter()
                        .map(|b| LotContribution {
                            batch_id: b.id,
                            volume: b.volume,
                        })
                        .collect(),
                    activate: false,
                    ignore_lots: BTreeSet::new(),
                    readings: cmd.readings,
                    notes: cmd.notes.clone(),
                },
            )
            .await?;

        let now = Utc::now();
        let mut transfers = Vec::new();
        for batch in &mut batches {
            // 已出锅的批次立即进入发酵；仍在计划中的只是预留
            let brewed = batch.phase == BatchPhase::Brewing;
            if brewed {
                batch.transition_to(phase, cmd.user_id)?;
                uow.batches().update(batch).await?;
            }

            let executed_at = brewed.then_some(now);
            for transfer in
                initial_transfers(&plan, &written, batch, executed_at, cmd.user_id)
            {
                uow.transfers().save(&transfer).await?;
                transfers.push(transfer);
            }
        }

        Ok(CommandOutcome {
            lot_id: Some(written.lot_id),
            plan: Some(plan),
            batches,
            lots: written.lots,
            assignments: written.assignments,
            transfers,
            tanks: Vec::new(),
        })
    }

    async fn transfer_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &TransferPhaseCommand,
    ) -> AllocationResult<CommandOutcome> {
        let batch = load_batch(uow, &cmd.batch_id, &cmd.tenant_id).await?;
        let from = batch.phase;
        let to = cmd.to_phase;
        if !from.can_transition_to(to) {
            return Err(AllocationError::InvalidTransition { from, to });
        }

        let sources = self.load_sources(uow, &batch, cmd).await?;
        let loss = cmd.measured_loss.unwrap_or(Volume::ZERO);
        let destination_volume = sources.volume - loss;
        if !destination_volume.is_valid_quantity() {
            return Err(AllocationError::validation(format!(
                "a loss of {} leaves nothing to transfer from {}",
                loss, sources.volume
            )));
        }

        let window = self.policy.window(cmd.window_start, cmd.window_end)?;
        let now = Utc::now();

        if cmd.stay_in_same_tank {
            return self
                .stay_in_tank(uow, cmd, &batch, sources, destination_volume, loss, window, now)
                .await;
        }

        let mode = cmd.mode.clone().ok_or_else(|| {
            AllocationError::SelectionRequired(
                "choose destination tanks or stay in the same tank".to_string(),
            )
        })?;
        let source_lot_ids = sources.lot_ids();

        let snapshot = build_snapshot(
            uow,
            SnapshotRequest {
                tenant_id: cmd.tenant_id,
                phase: to,
                window,
                mode: &mode,
                incoming: IncomingProfile {
                    recipe_id: sources.profile.recipe_id,
                    yeast_strain: sources.profile.yeast_strain.clone(),
                    style: sources.profile.style.clone(),
                    phase: Some(to),
                    brewed_at: batch.brewed_at,
                },
                ignore_lots: source_lot_ids.clone(),
            },
            &self.policy,
        )
        .await?;
        let plan = planner::plan(
            &AllocationRequest {
                total_volume: destination_volume,
                mode,
            },
            &snapshot,
        )?;

        let mut lots = sources.lots.clone();
        let mut assignments = sources.assignments.clone();
        let source_tanks = sources.tank_ids();

        // 先关闭源占罐，目标罐可能与源罐相同
        for assignment in &mut assignments {
            assignment.complete(now, cmd.user_id);
            uow.assignments().update(assignment).await?;
        }
        for lot in &mut lots {
            lot.complete(cmd.user_id);
            uow.lots().update(lot).await?;
        }

        let written = self
            .writer
            .commit(
                uow,
                CommitRequest {
                    tenant_id: cmd.tenant_id,
                    user_id: cmd.user_id,
                    plan: &plan,
                    phase: to,
                    window,
                    primary_batch_id: batch.id,
                    lot_code: lot_code(&batch.batch_number, to),
                    profile: sources.profile.clone(),
                    contributions: sources.scaled_contributions(destination_volume),
                    activate: true,
                    ignore_lots: source_lot_ids,
                    readings: cmd.readings,
                    notes: cmd.notes.clone(),
                },
            )
            .await?;

        let destination_tanks: BTreeSet<TankId> = plan.tank_ids().into_iter().collect();
        let mut tanks = Vec::new();
        for tank_id in &destination_tanks {
            let mut tank = lock_tank(uow, tank_id, &cmd.tenant_id).await?;
            tank.ensure_ready_to_fill()?;
            tank.occupy(cmd.user_id);
            uow.tanks().update(&tank).await?;
            tanks.push(tank);
        }
        for tank_id in source_tanks.difference(&destination_tanks) {
            let mut tank = lock_tank(uow, tank_id, &cmd.tenant_id).await?;
            tank.release_for_cleaning(cmd.user_id);
            uow.tanks().update(&tank).await?;
            tanks.push(tank);
        }

        let transfer_type = TransferType::for_destination(to)
            .ok_or(AllocationError::InvalidTransition { from, to })?;
        let source_lot_id = assignments.first().map(|a| a.lot_id);
        let source_tank_id = match source_tanks.len() {
            1 => source_tanks.iter().next().copied(),
            _ => None,
        };
        let mut transfers = Vec::with_capacity(plan.allocations.len());
        for allocation in &plan.allocations {
            let loss_share = loss.scale(allocation.volume.ratio_of(destination_volume));
            let transfer = Transfer::executed(
                cmd.tenant_id,
                batch.id,
                TransferLeg {
                    source_lot_id,
                    source_tank_id,
                    destination_lot_id: written.lot_in_tank(allocation),
                    destination_tank_id: allocation.tank_id,
                },
                transfer_type,
                allocation.volume,
                loss_share,
                now,
                cmd.user_id,
            )
            .with_notes(cmd.notes.clone());
            uow.transfers().save(&transfer).await?;
            transfers.push(transfer);
        }

        self.close_orphan_lots(uow, &batch.id, from, &cmd.tenant_id, cmd.user_id)
            .await?;
        let batches = self
            .advance_contributors(uow, &sources.batch_ids(), from, to, &cmd.tenant_id, cmd.user_id)
            .await?;

        lots.extend(written.lots);
        assignments.extend(written.assignments);
        Ok(CommandOutcome {
            lot_id: Some(written.lot_id),
            plan: Some(plan),
            batches,
            lots,
            assignments,
            transfers,
            tanks,
        })
    }

    /// 单元罐原罐转阶段：关闭旧占罐，在同一罐开新的 ACTIVE 占罐
    #[allow(clippy::too_many_arguments)]
    async fn stay_in_tank(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &TransferPhaseCommand,
        batch: &Batch,
        sources: Sources,
        destination_volume: Volume,
        loss: Volume,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> AllocationResult<CommandOutcome> {
        let from = batch.phase;
        let to = cmd.to_phase;
        let Sources {
            lots,
            mut assignments,
            contributions,
            ..
        } = sources;

        if assignments.len() != 1 {
            return Err(AllocationError::validation(format!(
                "staying in the same tank needs exactly one source tank, found {}",
                assignments.len()
            )));
        }
        let mut previous = assignments
            .pop()
            .ok_or_else(|| AllocationError::invalid_state("no source assignment"))?;
        let mut lot = lots
            .into_iter()
            .find(|l| l.id == previous.lot_id)
            .ok_or_else(|| AllocationError::not_found(format!("lot {}", previous.lot_id)))?;

        let mut tank = lock_tank(uow, &previous.tank_id, &cmd.tenant_id).await?;
        if !tank.supports(to) {
            return Err(AllocationError::validation(format!(
                "tank {} cannot host {}",
                tank.name, to
            )));
        }

        previous.complete(now, cmd.user_id);
        uow.assignments().update(&previous).await?;

        let open = uow
            .assignments()
            .find_open_by_tanks(&[tank.id], &cmd.tenant_id)
            .await?;
        if first_conflict(tank.id, &window, &open, &BTreeSet::new()).is_some() {
            return Err(AllocationError::TankUnavailable { tank_id: tank.id });
        }

        let mut assignment = TankAssignment::planned(
            NewAssignment {
                tenant_id: cmd.tenant_id,
                tank_id: tank.id,
                lot_id: lot.id,
                batch_id: previous.batch_id,
                phase: to,
                window,
                planned_volume: destination_volume,
                notes: cmd.notes.clone(),
            },
            cmd.user_id,
        );
        assignment.start(now, cmd.user_id)?;
        uow.assignments().save(&assignment).await?;

        lot.advance_to(to, cmd.user_id);
        lot.rescale(destination_volume, cmd.user_id);
        lot.activate(cmd.user_id);
        uow.lots().update(&lot).await?;

        tank.occupy(cmd.user_id);
        uow.tanks().update(&tank).await?;

        let transfer = Transfer::executed(
            cmd.tenant_id,
            batch.id,
            TransferLeg {
                source_lot_id: Some(lot.id),
                source_tank_id: Some(tank.id),
                destination_lot_id: lot.id,
                destination_tank_id: tank.id,
            },
            TransferType::TankToTank,
            destination_volume,
            loss,
            now,
            cmd.user_id,
        )
        .with_notes(cmd.notes.clone());
        uow.transfers().save(&transfer).await?;

        if !cmd.readings.is_empty() {
            uow.lots()
                .add_reading(&lot.id, &cmd.tenant_id, &cmd.readings, cmd.user_id)
                .await?;
        }

        self.close_orphan_lots(uow, &batch.id, from, &cmd.tenant_id, cmd.user_id)
            .await?;
        let batch_ids: Vec<BatchId> = contributions.keys().copied().collect();
        let batches = self
            .advance_contributors(uow, &batch_ids, from, to, &cmd.tenant_id, cmd.user_id)
            .await?;

        Ok(CommandOutcome {
            lot_id: Some(lot.id),
            plan: None,
            batches,
            lots: vec![lot],
            assignments: vec![previous, assignment],
            transfers: vec![transfer],
            tanks: vec![tank],
        })
    }

    async fn advance_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &AdvancePhaseCommand,
    ) -> AllocationResult<CommandOutcome> {
        let mut batch = load_batch(uow, &cmd.batch_id, &cmd.tenant_id).await?;
        let from = batch.phase;
        let to = cmd.to_phase;

        match to {
            BatchPhase::Brewing => {
                batch.transition_to(to, cmd.user_id)?;
                if let Some(volume) = cmd.measured_volume {
                    let open = uow
                        .lots()
                        .find_open_by_batch(&batch.id, &cmd.tenant_id)
                        .await?;
                    if !open.is_empty() {
                        return Err(AllocationError::validation(format!(
                            "batch {} already holds tank allocations; cancel and re-plan to change its volume",
                            batch.batch_number
                        )));
                    }
                    batch.set_measured_volume(volume, cmd.user_id)?;
                }
                uow.batches().update(&batch).await?;
                Ok(CommandOutcome {
                    batches: vec![batch],
                    ..CommandOutcome::default()
                })
            }
            BatchPhase::Fermenting => {
                if from != BatchPhase::Brewing {
                    return Err(AllocationError::InvalidTransition { from, to });
                }
                let lots: Vec<Lot> = uow
                    .lots()
                    .find_open_by_batch(&batch.id, &cmd.tenant_id)
                    .await?
                    .into_iter()
                    .filter(|l| l.phase == BatchPhase::Fermenting)
                    .collect();
                if lots.is_empty() {
                    return Err(AllocationError::SelectionRequired(format!(
                        "batch {} has no fermentation tank planned",
                        batch.batch_number
                    )));
                }

                batch.transition_to(to, cmd.user_id)?;
                uow.batches().update(&batch).await?;

                // 预留时记下的转罐此时真正发生
                let now = Utc::now();
                let mut transfers = Vec::new();
                for mut transfer in uow
                    .transfers()
                    .find_by_batch(&batch.id, &cmd.tenant_id)
                    .await?
                {
                    if transfer.status == TransferStatus::Planned {
                        transfer.complete(now, cmd.user_id)?;
                        uow.transfers().update(&transfer).await?;
                        transfers.push(transfer);
                    }
                }

                Ok(CommandOutcome {
                    batches: vec![batch],
                    lots,
                    transfers,
                    ..CommandOutcome::default()
                })
            }
            BatchPhase::Packaging | BatchPhase::Completed => {
                if !from.can_transition_to(to) {
                    return Err(AllocationError::InvalidTransition { from, to });
                }
                self.empty_tanks(uow, batch, from, to, cmd).await
            }
            _ => Err(AllocationError::InvalidTransition { from, to }),
        }
    }

    /// 进入包装或完成：关闭剩余占罐，罐进入清洗
    async fn empty_tanks(
        &self,
        uow: &dyn UnitOfWork,
        batch: Batch,
        from: BatchPhase,
        to: BatchPhase,
        cmd: &AdvancePhaseCommand,
    ) -> AllocationResult<CommandOutcome> {
        let now = Utc::now();
        let mut outcome = CommandOutcome::default();
        let mut batch_ids = vec![batch.id];
        let mut emptied = BTreeSet::new();

        for mut lot in uow
            .lots()
            .find_open_by_batch(&batch.id, &cmd.tenant_id)
            .await?
        {
            for mut assignment in uow.assignments().find_by_lot(&lot.id, &cmd.tenant_id).await? {
                if !assignment.is_open() {
                    continue;
                }
                assignment.complete(now, cmd.user_id);
                uow.assignments().update(&assignment).await?;
                emptied.insert(assignment.tank_id);
                outcome.assignments.push(assignment);
            }
            lot.complete(cmd.user_id);
            uow.lots().update(&lot).await?;
            for batch_id in lot.batch_ids() {
                if !batch_ids.contains(&batch_id) {
                    batch_ids.push(batch_id);
                }
            }
            outcome.lots.push(lot);
        }

        for tank_id in &emptied {
            let mut tank = lock_tank(uow, tank_id, &cmd.tenant_id).await?;
            tank.release_for_cleaning(cmd.user_id);
            uow.tanks().update(&tank).await?;
            outcome.tanks.push(tank);
        }

        outcome.batches = self
            .advance_contributors(uow, &batch_ids, from, to, &cmd.tenant_id, cmd.user_id)
            .await?;
        Ok(outcome)
    }

    async fn cancel_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &CancelBatchCommand,
    ) -> AllocationResult<CommandOutcome> {
        let mut batch = load_batch(uow, &cmd.batch_id, &cmd.tenant_id).await?;
        if batch.phase.is_terminal() {
            return Err(AllocationError::InvalidTransition {
                from: batch.phase,
                to: BatchPhase::Cancelled,
            });
        }

        let now = Utc::now();
        let mut outcome = CommandOutcome::default();
        let mut released = BTreeSet::new();

        for mut lot in uow
            .lots()
            .find_open_by_batch(&batch.id, &cmd.tenant_id)
            .await?
        {
            let mut assignments: Vec<TankAssignment> = uow
                .assignments()
                .find_by_lot(&lot.id, &cmd.tenant_id)
                .await?
                .into_iter()
                .filter(|a| a.is_open())
                .collect();

            if lot.contributions.iter().all(|c| c.batch_id == batch.id) {
                for assignment in &mut assignments {
                    if assignment.status == AssignmentStatus::Planned {
                        assignment.cancel(cmd.user_id)?;
                    } else {
                        assignment.complete(now, cmd.user_id);
                        released.insert(assignment.tank_id);
                    }
                    uow.assignments().update(assignment).await?;
                }
                lot.cancel(cmd.user_id)?;
            } else {
                // 混合酒批：只撤回本批次的体积
                let before = lot.volume;
                let removed = lot.withdraw(batch.id, cmd.user_id);
                let ratio = lot.volume.ratio_of(before);
                let remaining = lot.batch_ids();
                for assignment in &mut assignments {
                    assignment.release_blend(ratio, &remaining, cmd.user_id);
                    uow.assignments().update(assignment).await?;
                }
                debug!(lot_id = %lot.id, removed = %removed, "Contribution withdrawn from blend");
            }
            uow.lots().update(&lot).await?;
            outcome.lots.push(lot);
            outcome.assignments.extend(assignments);
        }

        for tank_id in &released {
            let mut tank = lock_tank(uow, tank_id, &cmd.tenant_id).await?;
            tank.release_for_cleaning(cmd.user_id);
            uow.tanks().update(&tank).await?;
            outcome.tanks.push(tank);
        }

        for mut transfer in uow
            .transfers()
            .find_by_batch(&batch.id, &cmd.tenant_id)
            .await?
        {
            if transfer.status == TransferStatus::Planned {
                transfer.cancel(cmd.user_id)?;
                uow.transfers().update(&transfer).await?;
                outcome.transfers.push(transfer);
            }
        }

        batch.transition_to(BatchPhase::Cancelled, cmd.user_id)?;
        uow.batches().update(&batch).await?;
        outcome.batches.push(batch);
        Ok(outcome)
    }

    async fn start_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &StartAssignmentCommand,
    ) -> AllocationResult<CommandOutcome> {
        let mut assignment = uow
            .assignments()
            .find_by_id(&cmd.assignment_id, &cmd.tenant_id)
            .await?
            .ok_or_else(|| AllocationError::not_found(format!("assignment {}", cmd.assignment_id)))?;
        if assignment.status != AssignmentStatus::Planned {
            return Err(AllocationError::invalid_state(format!(
                "assignment {} is {}",
                assignment.id, assignment.status
            )));
        }

        let mut tank = lock_tank(uow, &assignment.tank_id, &cmd.tenant_id).await?;
        tank.ensure_ready_to_fill()?;
        let open = uow
            .assignments()
            .find_open_by_tanks(&[tank.id], &cmd.tenant_id)
            .await?;
        if let Some(active) = open
            .iter()
            .find(|a| a.status == AssignmentStatus::Active && a.id != assignment.id)
        {
            return Err(AllocationError::ConcurrentModification(format!(
                "tank {} already holds active assignment {}",
                tank.name, active.id
            )));
        }

        let batch = load_batch(uow, &assignment.batch_id, &cmd.tenant_id).await?;
        if batch.phase != assignment.phase {
            return Err(AllocationError::invalid_state(format!(
                "batch {} is {} but the assignment is for {}",
                batch.batch_number, batch.phase, assignment.phase
            )));
        }

        assignment.start(cmd.started_at.unwrap_or_else(Utc::now), cmd.user_id)?;
        uow.assignments().update(&assignment).await?;
        tank.occupy(cmd.user_id);
        uow.tanks().update(&tank).await?;

        let mut lots = Vec::new();
        let mut next = Some(assignment.lot_id);
        while let Some(lot_id) = next {
            let mut lot = uow
                .lots()
                .find_by_id(&lot_id, &cmd.tenant_id)
                .await?
                .ok_or_else(|| AllocationError::not_found(format!("lot {}", lot_id)))?;
            lot.activate(cmd.user_id);
            uow.lots().update(&lot).await?;
            next = lot.parent_lot_id;
            lots.push(lot);
        }

        Ok(CommandOutcome {
            lot_id: Some(assignment.lot_id),
            batches: vec![batch],
            lots,
            assignments: vec![assignment],
            tanks: vec![tank],
            ..CommandOutcome::default()
        })
    }

    async fn cip_in(
        &self,
        uow: &dyn UnitOfWork,
        cmd: &CompleteCipCommand,
    ) -> AllocationResult<CommandOutcome> {
        let mut tank = lock_tank(uow, &cmd.tank_id, &cmd.tenant_id).await?;
        tank.complete_cip(cmd.user_id)?;
        uow.tanks().update(&tank).await?;
        Ok(CommandOutcome {
            tanks: vec![tank],
            ..CommandOutcome::default()
        })
    }

    // ========== 辅助 ==========

    /// 批次在当前阶段的酒批与仍未关闭的占罐
    async fn load_sources(
        &self,
        uow: &dyn UnitOfWork,
        batch: &Batch,
        cmd: &TransferPhaseCommand,
    ) -> AllocationResult<Sources> {
        let lots: Vec<Lot> = uow
            .lots()
            .find_open_by_batch(&batch.id, &cmd.tenant_id)
            .await?
            .into_iter()
            .filter(|l| l.phase == batch.phase)
            .filter(|l| {
                cmd.source_lot_id
                    .is_none_or(|id| l.id == id || l.parent_lot_id == Some(id))
            })
            .collect();
        if lots.is_empty() {
            return Err(AllocationError::invalid_state(format!(
                "batch {} has no open lot in {}",
                batch.batch_number, batch.phase
            )));
        }

        let mut assignments = Vec::new();
        let mut volume = Volume::ZERO;
        let mut contributions: BTreeMap<BatchId, Volume> = BTreeMap::new();
        for lot in &lots {
            let open: Vec<TankAssignment> = uow
                .assignments()
                .find_by_lot(&lot.id, &cmd.tenant_id)
                .await?
                .into_iter()
                .filter(|a| a.is_open())
                .collect();
            if open.is_empty() {
                continue;
            }
            volume += lot.volume;
            for contribution in &lot.contributions {
                *contributions.entry(contribution.batch_id).or_default() += contribution.volume;
            }
            assignments.extend(open);
        }

        if assignments.is_empty() {
            return Err(AllocationError::invalid_state(format!(
                "batch {} does not occupy any tank",
                batch.batch_number
            )));
        }
        if let Some(tank_id) = cmd.source_tank_id {
            if !assignments.iter().any(|a| a.tank_id == tank_id) {
                return Err(AllocationError::validation(format!(
                    "batch {} is not in tank {}",
                    batch.batch_number, tank_id
                )));
            }
        }

        let profile = lots
            .iter()
            .find(|l| assignments.iter().any(|a| a.lot_id == l.id))
            .map(|l| l.profile.clone())
            .unwrap_or_default();

        Ok(Sources {
            lots,
            assignments,
            volume,
            contributions,
            profile,
        })
    }

    /// 关闭子酒批都已结束的拆分父酒批
    async fn close_orphan_lots(
        &self,
        uow: &dyn UnitOfWork,
        batch_id: &BatchId,
        phase: BatchPhase,
        tenant_id: &TenantId,
        user_id: Option<UserId>,
    ) -> AllocationResult<()> {
        let open: Vec<Lot> = uow
            .lots()
            .find_open_by_batch(batch_id, tenant_id)
            .await?
            .into_iter()
            .filter(|l| l.phase == phase)
            .collect();

        for lot in &open {
            if open.iter().any(|child| child.parent_lot_id == Some(lot.id)) {
                continue;
            }
            let holding = uow
                .assignments()
                .find_by_lot(&lot.id, tenant_id)
                .await?
                .iter()
                .any(|a| a.is_open());
            if !holding {
                let mut lot = lot.clone();
                lot.complete(user_id);
                uow.lots().update(&lot).await?;
            }
        }
        Ok(())
    }

    /// 推进仍在原阶段且已无该阶段酒批的批次
    async fn advance_contributors(
        &self,
        uow: &dyn UnitOfWork,
        batch_ids: &[BatchId],
        from: BatchPhase,
        to: BatchPhase,
        tenant_id: &TenantId,
        user_id: Option<UserId>,
    ) -> AllocationResult<Vec<Batch>> {
        let mut batches = Vec::with_capacity(batch_ids.len());
        for batch_id in batch_ids {
            let mut batch = load_batch(uow, batch_id, tenant_id).await?;
            if batch.phase != from {
                batches.push(batch);
                continue;
            }
            let still_held = uow
                .lots()
                .find_open_by_batch(batch_id, tenant_id)
                .await?
                .iter()
                .any(|l| l.phase == from);
            if still_held {
                debug!(batch_id = %batch_id, phase = %from, "Batch still has lots in phase");
            } else {
                batch.transition_to(to, user_id)?;
                uow.batches().update(&batch).await?;
            }
            batches.push(batch);
        }
        Ok(batches)
    }
}

/// 提交或回滚
async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: AllocationResult<T>,
) -> AllocationResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = uow.rollback().await {
                warn!(error = %rollback_error, "Rollback failed");
            }
            Err(error)
        }
    }
}

fn observe(command: &'static str, started: Instant, result: &AllocationResult<CommandOutcome>) {
    metrics::record_command_duration(command, started, result.is_ok());
    match result {
        Ok(outcome) => {
            if let Some(plan) = &outcome.plan {
                metrics::record_plan_committed(plan.mode);
            }
            for transfer in &outcome.transfers {
                if transfer.status == TransferStatus::Completed {
                    metrics::record_transfer(transfer.transfer_type);
                }
            }
        }
        Err(error) => {
            metrics::record_rejection(command, error);
            warn!(command, code = error.code(), error = %error, "Command rejected");
        }
    }
}

async fn load_batch(
    uow: &dyn UnitOfWork,
    batch_id: &BatchId,
    tenant_id: &TenantId,
) -> AllocationResult<Batch> {
    uow.batches()
        .find_by_id(batch_id, tenant_id)
        .await?
        .ok_or_else(|| AllocationError::not_found(format!("batch {}", batch_id)))
}

async fn lock_tank(
    uow: &dyn UnitOfWork,
    tank_id: &TankId,
    tenant_id: &TenantId,
) -> AllocationResult<Tank> {
    uow.tanks()
        .lock(tank_id, tenant_id)
        .await?
        .ok_or_else(|| AllocationError::not_found(format!("tank {}", tank_id)))
}

fn incoming_profile(batch: &Batch, phase: BatchPhase) -> IncomingProfile {
    IncomingProfile {
        recipe_id: batch.recipe_id,
        yeast_strain: batch.yeast_strain.clone(),
        style: batch.style.clone(),
        phase: Some(phase),
        brewed_at: batch.brewed_at,
    }
}

fn lot_profile(batch: &Batch) -> LotProfile {
    LotProfile {
        recipe_id: batch.recipe_id,
        recipe_name: batch.recipe_name.clone(),
        style: batch.style.clone(),
        yeast_strain: batch.yeast_strain.clone(),
    }
}

/// 首次入罐时的拆分/混合转罐记录，每个批次一条或每个子酒批一条
fn initial_transfers(
    plan: &AllocationPlan,
    written: &CommitOutcome,
    batch: &Batch,
    executed_at: Option<DateTime<Utc>>,
    user_id: Option<UserId>,
) -> Vec<Transfer> {
    let transfer_type = match plan.mode {
        ModeKind::Blend => TransferType::Blend,
        ModeKind::Split if plan.is_multi_tank() => TransferType::Split,
        _ => return Vec::new(),
    };

    plan.allocations
        .iter()
        .filter_map(|allocation| {
            let lot_id = written.lot_in_tank(allocation);
            let volume = match transfer_type {
                TransferType::Blend => Some(batch.volume),
                _ => written
                    .lots
                    .iter()
                    .find(|l| l.id == lot_id)
                    .and_then(|l| l.contributions.iter().find(|c| c.batch_id == batch.id))
                    .map(|c| c.volume),
            }?;
            let leg = TransferLeg {
                source_lot_id: None,
                source_tank_id: None,
                destination_lot_id: lot_id,
                destination_tank_id: allocation.tank_id,
            };
            Some(match executed_at {
                Some(at) => Transfer::executed(
                    batch.tenant_id,
                    batch.id,
                    leg,
                    transfer_type,
                    volume,
                    Volume::ZERO,
                    at,
                    user_id,
                ),
                None => Transfer::planned(
                    batch.tenant_id,
                    batch.id,
                    leg,
                    transfer_type,
                    volume,
                    user_id,
                ),
            })
        })
        .collect()
}
