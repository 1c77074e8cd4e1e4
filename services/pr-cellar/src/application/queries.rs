//! 排罐查询

use std::collections::BTreeMap;

use brewops_common::TenantId;
use brewops_domain_core::Volume;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::enums::BatchPhase;
use crate::domain::services::PlannedAllocation;
use crate::domain::value_objects::{BatchId, LotId, TankId};

/// 候选罐查询
#[derive(Debug, Clone)]
pub struct CandidateTanksQuery {
    pub tenant_id: TenantId,
    pub phase: BatchPhase,
    pub exclude_needs_cip: bool,
    pub exclude_occupied: bool,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AvailabilityQuery {
    pub tenant_id: TenantId,
    pub tank_ids: Vec<TankId>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// 在罐酒批查询（混合目标选择）
#[derive(Debug, Clone)]
pub struct ActiveLotsQuery {
    pub tenant_id: TenantId,
    pub phase: Option<BatchPhase>,
}

/// 拆分草稿中的一行，未给出体积时按默认分配规则补齐
#[derive(Debug, Clone, Copy)]
pub struct SplitDraft {
    pub tank_id: TankId,
    pub volume: Option<Volume>,
}

#[derive(Debug, Clone)]
pub enum PreviewMode {
    Single { tank_id: TankId },
    Split { drafts: Vec<SplitDraft> },
    Blend { target_lot_id: LotId },
}

/// 规划试算，不写库
#[derive(Debug, Clone)]
pub struct PreviewPlanQuery {
    pub tenant_id: TenantId,
    pub batch_ids: Vec<BatchId>,
    pub phase: BatchPhase,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    /// 缺省为所有批次体积之和
    pub total_volume: Option<Volume>,
    pub mode: PreviewMode,
    pub split_equally: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveLotView {
    pub id: LotId,
    pub lot_code: String,
    pub phase: BatchPhase,
    pub tank_id: TankId,
    pub tank_name: String,
    pub total_volume: Volume,
    pub batch_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRejection {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub total_volume: Volume,
    pub allocations: Vec<PlannedAllocation>,
    /// 正数为未分配量，负数为超出量
    pub remaining_volume: f64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PlanRejection>,
}

pub type AvailabilityMap = BTreeMap<TankId, bool>;
