//! 排罐命令

use std::collections::BTreeSet;

use brewops_common::{TenantId, UserId};
use brewops_domain_core::Volume;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::{Batch, Lot, Tank, TankAssignment, Transfer};
use crate::domain::enums::BatchPhase;
use crate::domain::services::{AllocationMode, AllocationPlan};
use crate::domain::value_objects::{AssignmentId, BatchId, LotId, Readings, TankId};
use crate::error::{AllocationError, AllocationResult};

const MAX_NOTES_LEN: usize = 2000;

fn validate_notes(notes: &Option<String>) -> AllocationResult<()> {
    match notes {
        Some(notes) if notes.chars().count() > MAX_NOTES_LEN => Err(AllocationError::validation(
            format!("notes must not exceed {} characters", MAX_NOTES_LEN),
        )),
        _ => Ok(()),
    }
}

/// 首次入罐：为一个或多个批次规划发酵罐并提交
#[derive(Debug, Clone)]
pub struct PlanAndCommitCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    /// 第一个批次决定酒批的配方/酵母信息
    pub batch_ids: Vec<BatchId>,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub mode: AllocationMode,
    pub readings: Readings,
    pub notes: Option<String>,
}

impl PlanAndCommitCommand {
    pub fn validate(&self) -> AllocationResult<()> {
        if self.batch_ids.is_empty() {
            return Err(AllocationError::validation("at least one batch is required"));
        }
        let unique: BTreeSet<_> = self.batch_ids.iter().collect();
        if unique.len() != self.batch_ids.len() {
            return Err(AllocationError::validation("batch ids must be unique"));
        }
        self.readings.validate()?;
        validate_notes(&self.notes)
    }
}

/// 带罐变化的阶段转换（发酵 → 后熟，后熟 → 清酒罐）
#[derive(Debug, Clone)]
pub struct TransferPhaseCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub batch_id: BatchId,
    pub to_phase: BatchPhase,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    /// 不留在原罐时必须给出
    pub mode: Option<AllocationMode>,
    pub stay_in_same_tank: bool,
    /// 只转出指定的源酒批
    pub source_lot_id: Option<LotId>,
    /// 调用方认为的源罐，仅用于一致性校验
    pub source_tank_id: Option<TankId>,
    pub measured_loss: Option<Volume>,
    pub readings: Readings,
    pub notes: Option<String>,
}

impl TransferPhaseCommand {
    pub fn validate(&self) -> AllocationResult<()> {
        if !matches!(self.to_phase, BatchPhase::Conditioning | BatchPhase::Ready) {
            return Err(AllocationError::validation(format!(
                "{} is not reached through a tank transfer",
                self.to_phase
            )));
        }
        if self.stay_in_same_tank && self.mode.is_some() {
            return Err(AllocationError::validation(
                "a destination plan cannot be combined with staying in the same tank",
            ));
        }
        if !self.stay_in_same_tank && self.mode.is_none() {
            return Err(AllocationError::SelectionRequired(
                "choose destination tanks or stay in the same tank".to_string(),
            ));
        }
        if let Some(loss) = self.measured_loss {
            if !loss.as_liters().is_finite() || loss.as_liters() < 0.0 {
                return Err(AllocationError::validation("measured loss must not be negative"));
            }
        }
        self.readings.validate()?;
        validate_notes(&self.notes)
    }
}

/// 不涉及换罐的阶段推进
#[derive(Debug, Clone)]
pub struct AdvancePhaseCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub batch_id: BatchId,
    pub to_phase: BatchPhase,
    /// 出锅实测体积，仅在进入 BREWING 时接受
    pub measured_volume: Option<Volume>,
}

impl AdvancePhaseCommand {
    pub fn validate(&self) -> AllocationResult<()> {
        if self.measured_volume.is_some() && self.to_phase != BatchPhase::Brewing {
            return Err(AllocationError::validation(
                "measured volume can only be recorded when brewing starts",
            ));
        }
        if self.to_phase == BatchPhase::Cancelled {
            return Err(AllocationError::validation(
                "use the cancel command to cancel a batch",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CancelBatchCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub batch_id: BatchId,
    pub reason: Option<String>,
}

/// 记录实际入罐
#[derive(Debug, Clone)]
pub struct StartAssignmentCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub assignment_id: AssignmentId,
    pub started_at: Option<DateTime<Utc>>,
}

/// CIP 完成事件
#[derive(Debug, Clone)]
pub struct CompleteCipCommand {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub tank_id: TankId,
}

/// 命令执行后的实体，调用方无需再查询
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<LotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<AllocationPlan>,
    pub batches: Vec<Batch>,
    pub lots: Vec<Lot>,
    pub assignments: Vec<TankAssignment>,
    pub transfers: Vec<Transfer>,
    pub tanks: Vec<Tank>,
}
