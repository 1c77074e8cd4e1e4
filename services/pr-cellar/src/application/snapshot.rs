//! 规划快照
//!
//! 在命令所在的事务内读取罐容量、可用性与混合目标，交给纯函数规划器。

use std::collections::{BTreeMap, BTreeSet};

use brewops_common::TenantId;
use chrono::Utc;

use crate::config::PlanningPolicy;
use crate::domain::entities::{Tank, TankAssignment};
use crate::domain::enums::{BatchPhase, TankStatus};
use crate::domain::services::{
    check_availability, AllocationMode, BlendTarget, IncomingProfile, PlanningSnapshot,
    TankCapacity,
};
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::value_objects::{LotId, TankId, TimeWindow};
use crate::error::{AllocationError, AllocationResult};

pub struct SnapshotRequest<'a> {
    pub tenant_id: TenantId,
    pub phase: BatchPhase,
    pub window: TimeWindow,
    pub mode: &'a AllocationMode,
    pub incoming: IncomingProfile,
    /// 这些酒批自身的占罐不算冲突
    pub ignore_lots: BTreeSet<LotId>,
}

pub async fn build_snapshot(
    uow: &dyn UnitOfWork,
    request: SnapshotRequest<'_>,
    policy: &PlanningPolicy,
) -> AllocationResult<PlanningSnapshot> {
    let mut ignore_lots = request.ignore_lots;
    let mut windows: BTreeMap<TankId, TimeWindow> = BTreeMap::new();

    let (tank_ids, blend_target) = match request.mode {
        AllocationMode::Single { tank_id } => (vec![*tank_id], None),
        AllocationMode::Split { allocations } => {
            (allocations.iter().map(|a| a.tank_id).collect(), None)
        }
        AllocationMode::Blend { target_lot_id } => {
            let lot = uow
                .lots()
                .find_by_id(target_lot_id, &request.tenant_id)
                .await?
                .ok_or_else(|| AllocationError::not_found(format!("lot {}", target_lot_id)))?;
            ignore_lots.insert(lot.id);

            let holding = open_assignment_of(uow, &lot.id, &request.tenant_id).await?;
            match holding.filter(|_| lot.is_open()) {
                Some(assignment) => {
                    // 混入后原占罐的时间窗会扩展到覆盖新的窗口
                    windows.insert(assignment.tank_id, assignment.window.span(&request.window));
                    let tank_id = assignment.tank_id;
                    (vec![tank_id], Some(BlendTarget { lot, tank_id }))
                }
                None => (Vec::new(), None),
            }
        }
    };

    let tanks = load_tanks(uow, &tank_ids, &request.tenant_id).await?;
    for tank in &tanks {
        if !tank.supports(request.phase) {
            return Err(AllocationError::validation(format!(
                "tank {} cannot host {}",
                tank.name, request.phase
            )));
        }
    }

    let open = uow
        .assignments()
        .find_open_by_tanks(&tank_ids, &request.tenant_id)
        .await?;

    let mut availability = BTreeMap::new();
    for tank in &tanks {
        let window = windows.get(&tank.id).copied().unwrap_or(request.window);
        let free = check_availability(&[tank.id], &window, &open, &ignore_lots)
            .get(&tank.id)
            .copied()
            .unwrap_or(false);
        availability.insert(tank.id, free && tank.status != TankStatus::Maintenance);
    }

    Ok(PlanningSnapshot {
        tanks: tanks
            .iter()
            .map(|t| {
                (
                    t.id,
                    TankCapacity {
                        tank_id: t.id,
                        name: t.name.clone(),
                        capacity: t.capacity,
                    },
                )
            })
            .collect(),
        availability,
        blend_target,
        incoming: request.incoming,
        blending: policy.blending.clone(),
        tolerance: policy.tolerance,
        now: Utc::now(),
    })
}

/// 按 ID 加载罐，任何一个不存在都视为错误
pub async fn load_tanks(
    uow: &dyn UnitOfWork,
    tank_ids: &[TankId],
    tenant_id: &TenantId,
) -> AllocationResult<Vec<Tank>> {
    if tank_ids.is_empty() {
        return Ok(Vec::new());
    }
    let tanks = uow.tanks().find_by_ids(tank_ids, tenant_id).await?;
    let found: BTreeSet<TankId> = tanks.iter().map(|t| t.id).collect();
    let missing: Vec<String> = tank_ids
        .iter()
        .filter(|id| !found.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AllocationError::not_found(format!(
            "tanks not found: {}",
            missing.join(", ")
        )));
    }

    // 保持调用方给出的顺序
    let mut by_id: BTreeMap<TankId, Tank> = tanks.into_iter().map(|t| (t.id, t)).collect();
    Ok(tank_ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// 酒批当前仍未关闭的占罐记录
pub async fn open_assignment_of(
    uow: &dyn UnitOfWork,
    lot_id: &LotId,
    tenant_id: &TenantId,
) -> AllocationResult<Option<TankAssignment>> {
    Ok(uow
        .assignments()
        .find_by_lot(lot_id, tenant_id)
        .await?
        .into_iter()
        .find(|a| a.is_open()))
}
