//! 分配规划器
//!
//! 纯函数：相同的请求与快照总是得到相同的结果，不做任何持久化。
//! 规则按固定顺序检查，第一个失败的规则即为返回的错误。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use brewops_domain_core::Volume;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::Lot;
use crate::domain::enums::BatchPhase;
use crate::domain::value_objects::{BlendRule, BlendingConfig, LotId, RecipeId, TankId};
use crate::error::AllocationError;

/// 单个罐的分配量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub tank_id: TankId,
    pub volume: Volume,
}

/// 分配方式
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationMode {
    Single { tank_id: TankId },
    Split { allocations: Vec<PlannedAllocation> },
    Blend { target_lot_id: LotId },
}

impl AllocationMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Single { .. } => ModeKind::Single,
            Self::Split { .. } => ModeKind::Split,
            Self::Blend { .. } => ModeKind::Blend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModeKind {
    Single,
    Split,
    Blend,
}

impl ModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Split => "SPLIT",
            Self::Blend => "BLEND",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub total_volume: Volume,
    pub mode: AllocationMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TankCapacity {
    pub tank_id: TankId,
    pub name: String,
    pub capacity: Volume,
}

/// 已解析的混合目标：酒批及其当前所在的罐
#[derive(Debug, Clone)]
pub struct BlendTarget {
    pub lot: Lot,
    pub tank_id: TankId,
}

/// 待入罐批次的特征，用于混合兼容性校验
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingProfile {
    pub recipe_id: Option<RecipeId>,
    pub yeast_strain: Option<String>,
    pub style: Option<String>,
    pub phase: Option<BatchPhase>,
    pub brewed_at: Option<DateTime<Utc>>,
}

/// 规划所需的只读快照
#[derive(Debug, Clone)]
pub struct PlanningSnapshot {
    pub tanks: BTreeMap<TankId, TankCapacity>,
    pub availability: BTreeMap<TankId, bool>,
    pub blend_target: Option<BlendTarget>,
    pub incoming: IncomingProfile,
    pub blending: BlendingConfig,
    pub tolerance: f64,
    pub now: DateTime<Utc>,
}

/// 通过校验的分配方案
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub mode: ModeKind,
    pub allocations: Vec<PlannedAllocation>,
    pub target_lot_id: Option<LotId>,
    pub total_volume: Volume,
}

impl AllocationPlan {
    pub fn tank_ids(&self) -> Vec<TankId> {
        self.allocations.iter().map(|a| a.tank_id).collect()
    }

    pub fn is_multi_tank(&self) -> bool {
        self.allocations.len() > 1
    }
}

/// 校验分配请求
pub fn plan(
    request: &AllocationRequest,
    snapshot: &PlanningSnapshot,
) -> Result<AllocationPlan, AllocationError> {
    check_inputs(request)?;

    let (allocations, target) = resolve_selection(request, snapshot)?;

    if let AllocationMode::Split { .. } = request.mode {
        let remainder = remaining_volume(request.total_volume, &allocations);
        if remainder.abs() > snapshot.tolerance {
            return Err(AllocationError::VolumeMismatch { remainder });
        }
    }

    for allocation in &allocations {
        let tank = snapshot.tanks.get(&allocation.tank_id).ok_or_else(|| {
            AllocationError::SelectionRequired(format!("tank {} is not a known vessel", allocation.tank_id))
        })?;
        let requested = match target {
            Some(target) => target.lot.volume + allocation.volume,
            None => allocation.volume,
        };
        if !requested.fits_within(tank.capacity) {
            return Err(AllocationError::CapacityExceeded {
                tank_id: tank.tank_id,
                tank_name: tank.name.clone(),
                capacity: tank.capacity.as_liters(),
                requested: requested.as_liters(),
            });
        }
    }

    if let Some(allocation) = allocations
        .iter()
        .find(|a| !snapshot.availability.get(&a.tank_id).copied().unwrap_or(false))
    {
        return Err(AllocationError::TankUnavailable {
            tank_id: allocation.tank_id,
        });
    }

    if let Some(target) = target {
        check_blend_rules(&target.lot, snapshot)?;
    }

    Ok(AllocationPlan {
        mode: request.mode.kind(),
        allocations,
        target_lot_id: target.map(|t| t.lot.id),
        total_volume: request.total_volume,
    })
}

fn check_inputs(request: &AllocationRequest) -> Result<(), AllocationError> {
    if !request.total_volume.is_valid_quantity() {
        return Err(AllocationError::validation(format!(
            "total volume must be positive, got {}",
            request.total_volume.as_liters()
        )));
    }
    if let AllocationMode::Split { allocations } = &request.mode {
        let mut seen = BTreeSet::new();
        for allocation in allocations {
            if !allocation.volume.is_valid_quantity() {
                return Err(AllocationError::validation(format!(
                    "allocation for tank {} must be positive",
                    allocation.tank_id
                )));
            }
            if !seen.insert(allocation.tank_id) {
                return Err(AllocationError::validation(format!(
                    "tank {} appears more than once",
                    allocation.tank_id
                )));
            }
        }
    }
    Ok(())
}

/// 解析出具体的罐与分配量
///
/// 空选择、未知罐、未解析的混合目标会让后续规则无从计算，因此最先报告。
fn resolve_selection<'a>(
    request: &AllocationRequest,
    snapshot: &'a PlanningSnapshot,
) -> Result<(Vec<PlannedAllocation>, Option<&'a BlendTarget>), AllocationError> {
    let known = |tank_id: &TankId| -> Result<(), AllocationError> {
        if snapshot.tanks.contains_key(tank_id) {
            Ok(())
        } else {
            Err(AllocationError::SelectionRequired(format!(
                "tank {} is not a known vessel",
                tank_id
            )))
        }
    };

    match &request.mode {
        AllocationMode::Single { tank_id } => {
            known(tank_id)?;
            Ok((
                vec![PlannedAllocation {
                    tank_id: *tank_id,
                    volume: request.total_volume,
                }],
                None,
            ))
        }
        AllocationMode::Split { allocations } => {
            if allocations.is_empty() {
                return Err(AllocationError::SelectionRequired(
                    "split needs at least one tank".to_string(),
                ));
            }
            for allocation in allocations {
                known(&allocation.tank_id)?;
            }
            Ok((allocations.clone(), None))
        }
        AllocationMode::Blend { target_lot_id } => {
            let target = snapshot
                .blend_target
                .as_ref()
                .filter(|t| t.lot.id == *target_lot_id && snapshot.tanks.contains_key(&t.tank_id))
                .ok_or_else(|| {
                    AllocationError::SelectionRequired(format!(
                        "blend target lot {} has no resolvable tank",
                        target_lot_id
                    ))
                })?;
            Ok((
                vec![PlannedAllocation {
                    tank_id: target.tank_id,
                    volume: request.total_volume,
                }],
                Some(target),
            ))
        }
    }
}

/// 所有启用的规则取逻辑与，按 recipe、yeast、phase、style、age 的顺序报告第一个失败项
fn check_blend_rules(lot: &Lot, snapshot: &PlanningSnapshot) -> Result<(), AllocationError> {
    let rules = &snapshot.blending;
    let incoming = &snapshot.incoming;
    let fail = |rule: BlendRule| -> Result<(), AllocationError> {
        Err(AllocationError::BlendIncompatible { rule })
    };

    if rules.require_recipe_match && lot.profile.recipe_id != incoming.recipe_id {
        return fail(BlendRule::Recipe);
    }
    if rules.require_yeast_match
        && !same_text(lot.profile.yeast_strain.as_deref(), incoming.yeast_strain.as_deref())
    {
        return fail(BlendRule::Yeast);
    }
    if rules.require_phase_match && incoming.phase.is_some_and(|phase| phase != lot.phase) {
        return fail(BlendRule::Phase);
    }
    if rules.require_style_match
        && !same_text(lot.profile.style.as_deref(), incoming.style.as_deref())
    {
        return fail(BlendRule::Style);
    }
    if let Some(max_days) = rules.max_age_difference_days {
        let incoming_at = incoming.brewed_at.unwrap_or(snapshot.now);
        let age_days = (lot.created_at - incoming_at).num_days().abs();
        if age_days > max_days {
            return fail(BlendRule::Age);
        }
    }
    Ok(())
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        (None, None) => true,
        _ => false,
    }
}

/// 平均分配到所有选中的罐，不考虑单罐容量
pub fn split_equally(total: Volume, tank_ids: &[TankId]) -> Vec<PlannedAllocation> {
    if tank_ids.is_empty() {
        return Vec::new();
    }
    let share = Volume::liters(total.as_liters() / tank_ids.len() as f64);
    tank_ids
        .iter()
        .map(|tank_id| PlannedAllocation {
            tank_id: *tank_id,
            volume: share,
        })
        .collect()
}

/// 新加入拆分方案的罐的默认分配量，至少 1 升
pub fn default_allocation(total: Volume, already_allocated: Volume, tank_capacity: Volume) -> Volume {
    (total - already_allocated)
        .min(tank_capacity)
        .max(Volume::liters(1.0))
}

/// 带符号的剩余量：正数表示分配不足，负数表示超量
pub fn remaining_volume(total: Volume, allocations: &[PlannedAllocation]) -> f64 {
    let allocated: Volume = allocations.iter().map(|a| a.volume).sum();
    (total - allocated).as_liters()
}
