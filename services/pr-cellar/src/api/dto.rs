//! 请求与响应体

use brewops_common::{TenantId, UserId};
use brewops_domain_core::Volume;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::{
    ActiveLotsQuery, AdvancePhaseCommand, AvailabilityMap, AvailabilityQuery, CancelBatchCommand,
    CandidateTanksQuery, PlanAndCommitCommand, PreviewMode, PreviewPlanQuery, SplitDraft,
    StartAssignmentCommand, TransferPhaseCommand,
};
use crate::domain::enums::BatchPhase;
use crate::domain::services::{AllocationMode, PlannedAllocation};
use crate::domain::value_objects::{AssignmentId, BatchId, LotId, Readings, TankId};

/// 分配方式，以 `mode` 字段区分
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationModeDto {
    Single { tank_id: TankId },
    Split { allocations: Vec<PlannedAllocation> },
    Blend { target_lot_id: LotId },
}

impl From<AllocationModeDto> for AllocationMode {
    fn from(dto: AllocationModeDto) -> Self {
        match dto {
            AllocationModeDto::Single { tank_id } => AllocationMode::Single { tank_id },
            AllocationModeDto::Split { allocations } => AllocationMode::Split { allocations },
            AllocationModeDto::Blend { target_lot_id } => AllocationMode::Blend { target_lot_id },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateTanksParams {
    pub phase: BatchPhase,
    #[serde(default = "default_true")]
    pub exclude_needs_cip: bool,
    #[serde(default = "default_true")]
    pub exclude_occupied: bool,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl CandidateTanksParams {
    pub fn into_query(self, tenant_id: TenantId) -> CandidateTanksQuery {
        CandidateTanksQuery {
            tenant_id,
            phase: self.phase,
            exclude_needs_cip: self.exclude_needs_cip,
            exclude_occupied: self.exclude_occupied,
            window_start: self.window_start,
            window_end: self.window_end,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRequest {
    pub tank_ids: Vec<TankId>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl AvailabilityRequest {
    pub fn into_query(self, tenant_id: TenantId) -> AvailabilityQuery {
        AvailabilityQuery {
            tenant_id,
            tank_ids: self.tank_ids,
            window_start: self.window_start,
            window_end: self.window_end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TankAvailability {
    pub tank_id: TankId,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub tanks: Vec<TankAvailability>,
}

impl AvailabilityResponse {
    pub fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>, map: AvailabilityMap) -> Self {
        Self {
            window_start,
            window_end,
            tanks: map
                .into_iter()
                .map(|(tank_id, available)| TankAvailability { tank_id, available })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveLotsParams {
    pub phase: Option<BatchPhase>,
}

impl ActiveLotsParams {
    pub fn into_query(self, tenant_id: TenantId) -> ActiveLotsQuery {
        ActiveLotsQuery {
            tenant_id,
            phase: self.phase,
        }
    }
}

/// 拆分草稿行，体积可省略
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SplitDraftDto {
    pub tank_id: TankId,
    pub volume: Option<Volume>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewModeDto {
    Single { tank_id: TankId },
    Split { allocations: Vec<SplitDraftDto> },
    Blend { target_lot_id: LotId },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    pub batch_ids: Vec<BatchId>,
    pub phase: BatchPhase,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub total_volume: Option<Volume>,
    #[serde(flatten)]
    pub mode: PreviewModeDto,
    #[serde(default)]
    pub split_equally: bool,
}

impl PreviewRequest {
    pub fn into_query(self, tenant_id: TenantId) -> PreviewPlanQuery {
        let mode = match self.mode {
            PreviewModeDto::Single { tank_id } => PreviewMode::Single { tank_id },
            PreviewModeDto::Split { allocations } => PreviewMode::Split {
                drafts: allocations
                    .into_iter()
                    .map(|d| SplitDraft {
                        tank_id: d.tank_id,
                        volume: d.volume,
                    })
                    .collect(),
            },
            PreviewModeDto::Blend { target_lot_id } => PreviewMode::Blend { target_lot_id },
        };
        PreviewPlanQuery {
            tenant_id,
            batch_ids: self.batch_ids,
            phase: self.phase,
            window_start: self.window_start,
            window_end: self.window_end,
            total_volume: self.total_volume,
            mode,
            split_equally: self.split_equally,
        }
    }
}

/// 首次入罐
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequestBody {
    #[serde(flatten)]
    pub mode: AllocationModeDto,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    /// 一并混入同一酒批的其他批次
    #[serde(default)]
    pub additional_batch_ids: Vec<BatchId>,
    #[serde(default)]
    pub readings: Readings,
    pub notes: Option<String>,
}

impl AllocationRequestBody {
    pub fn into_command(
        self,
        batch_id: BatchId,
        tenant_id: TenantId,
        user_id: Option<UserId>,
    ) -> PlanAndCommitCommand {
        let mut batch_ids = vec![batch_id];
        batch_ids.extend(self.additional_batch_ids);
        PlanAndCommitCommand {
            tenant_id,
            user_id,
            batch_ids,
            window_start: self.window_start,
            window_end: self.window_end,
            mode: self.mode.into(),
            readings: self.readings,
            notes: self.notes,
        }
    }
}

/// 阶段转罐
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequestBody {
    pub to_phase: BatchPhase,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub mode: Option<AllocationModeDto>,
    #[serde(default)]
    pub stay_in_same_tank: bool,
    pub source_lot_id: Option<LotId>,
    pub source_tank_id: Option<TankId>,
    pub measured_loss: Option<Volume>,
    #[serde(default)]
    pub readings: Readings,
    pub notes: Option<String>,
}

impl TransferRequestBody {
    pub fn into_command(
        self,
        batch_id: BatchId,
        tenant_id: TenantId,
        user_id: Option<UserId>,
    ) -> TransferPhaseCommand {
        TransferPhaseCommand {
            tenant_id,
            user_id,
            batch_id,
            to_phase: self.to_phase,
            window_start: self.window_start,
            window_end: self.window_end,
            mode: self.mode.map(AllocationMode::from),
            stay_in_same_tank: self.stay_in_same_tank,
            source_lot_id: self.source_lot_id,
            source_tank_id: self.source_tank_id,
            measured_loss: self.measured_loss,
            readings: self.readings,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancePhaseBody {
    pub to_phase: BatchPhase,
    pub measured_volume: Option<Volume>,
}

impl AdvancePhaseBody {
    pub fn into_command(
        self,
        batch_id: BatchId,
        tenant_id: TenantId,
        user_id: Option<UserId>,
    ) -> AdvancePhaseCommand {
        AdvancePhaseCommand {
            tenant_id,
            user_id,
            batch_id,
            to_phase: self.to_phase,
            measured_volume: self.measured_volume,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelBatchBody {
    pub reason: Option<String>,
}

impl CancelBatchBody {
    pub fn into_command(
        self,
        batch_id: BatchId,
        tenant_id: TenantId,
        user_id: Option<UserId>,
    ) -> CancelBatchCommand {
        CancelBatchCommand {
            tenant_id,
            user_id,
            batch_id,
            reason: self.reason,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAssignmentBody {
    pub started_at: Option<DateTime<Utc>>,
}

impl StartAssignmentBody {
    pub fn into_command(
        self,
        assignment_id: AssignmentId,
        tenant_id: TenantId,
        user_id: Option<UserId>,
    ) -> StartAssignmentCommand {
        StartAssignmentCommand {
            tenant_id,
            user_id,
            assignment_id,
            started_at: self.started_at,
        }
    }
}
