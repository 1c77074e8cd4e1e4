//! 排罐查询服务
//!
//! 只读事务，不修改任何数据。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use brewops_domain_core::Volume;

use crate::config::PlanningPolicy;
use crate::domain::entities::{Batch, Tank};
use crate::domain::services::{
    check_availability, default_allocation, filter_candidates, planner, remaining_volume,
    split_equally, AllocationMode, AllocationRequest, CandidateFilter, IncomingProfile,
    PlannedAllocation, TankSnapshot,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::value_objects::{LotId, TimeWindow};
use crate::error::{AllocationError, AllocationResult};

use super::queries::*;
use super::snapshot::{build_snapshot, load_tanks, open_assignment_of, SnapshotRequest};

pub struct CellarQueryService {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    policy: PlanningPolicy,
}

impl CellarQueryService {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, policy: PlanningPolicy) -> Self {
        Self {
            uow_factory,
            policy,
        }
    }

    /// 候选罐
    pub async fn list_candidate_tanks(
        &self,
        query: CandidateTanksQuery,
    ) -> AllocationResult<Vec<Tank>> {
        let window = match query.window_start {
            Some(start) => Some(self.policy.window(start, query.window_end)?),
            None => None,
        };

        let uow = self.uow_factory.begin_read_only().await?;
        let result = async {
            let tanks = uow
                .tanks()
                .list_by_capability(query.phase, &query.tenant_id)
                .await?;
            let ids: Vec<_> = tanks.iter().map(|t| t.id).collect();
            let open = uow
                .assignments()
                .find_open_by_tanks(&ids, &query.tenant_id)
                .await?;

            let snapshots = tanks
                .into_iter()
                .map(|tank| TankSnapshot {
                    open_assignments: open.iter().filter(|a| a.tank_id == tank.id).cloned().collect(),
                    tank,
                })
                .collect();
            let filter = CandidateFilter {
                phase: query.phase,
                exclude_needs_cip: query.exclude_needs_cip,
                exclude_occupied: query.exclude_occupied,
                window,
            };
            Ok::<_, AllocationError>(filter_candidates(snapshots, &filter))
        }
        .await;
        close(uow, result).await
    }

    /// 各罐在时间窗内是否空闲
    pub async fn check_availability(
        &self,
        query: AvailabilityQuery,
    ) -> AllocationResult<AvailabilityMap> {
        let window = TimeWindow::new(query.window_start, query.window_end)?;
        if query.tank_ids.is_empty() {
            return Ok(AvailabilityMap::new());
        }

        let uow = self.uow_factory.begin_read_only().await?;
        let result = async {
            load_tanks(uow.as_ref(), &query.tank_ids, &query.tenant_id).await?;
            let open = uow
                .assignments()
                .find_open_by_tanks(&query.tank_ids, &query.tenant_id)
                .await?;
            Ok::<_, AllocationError>(check_availability(
                &query.tank_ids,
                &window,
                &open,
                &BTreeSet::new(),
            ))
        }
        .await;
        close(uow, result).await
    }

    /// 在罐酒批，用作混合目标
    pub async fn list_active_lots(
        &self,
        query: ActiveLotsQuery,
    ) -> AllocationResult<Vec<ActiveLotView>> {
        let uow = self.uow_factory.begin_read_only().await?;
        let result = async {
            let lots = uow.lots().list_open(query.phase, &query.tenant_id).await?;

            let mut holdings = Vec::with_capacity(lots.len());
            for lot in lots {
                if let Some(assignment) =
                    open_assignment_of(uow.as_ref(), &lot.id, &query.tenant_id).await?
                {
                    holdings.push((lot, assignment.tank_id));
                }
            }

            let tank_ids: Vec<_> = holdings
                .iter()
                .map(|(_, tank_id)| *tank_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let names: BTreeMap<_, _> = uow
                .tanks()
                .find_by_ids(&tank_ids, &query.tenant_id)
                .await?
                .into_iter()
                .map(|t| (t.id, t.name))
                .collect();

            let mut views: Vec<ActiveLotView> = holdings
                .into_iter()
                .map(|(lot, tank_id)| ActiveLotView {
                    id: lot.id,
                    lot_code: lot.lot_code.clone(),
                    phase: lot.phase,
                    tank_id,
                    tank_name: names.get(&tank_id).cloned().unwrap_or_default(),
                    total_volume: lot.volume,
                    batch_count: lot.contributions.len(),
                })
                .collect();
            views.sort_by(|a, b| a.tank_name.cmp(&b.tank_name).then(a.lot_code.cmp(&b.lot_code)));
            Ok::<_, AllocationError>(views)
        }
        .await;
        close(uow, result).await
    }

    /// 规划试算：返回方案或被拒原因，不写库
    pub async fn preview_plan(&self, query: PreviewPlanQuery) -> AllocationResult<PlanPreview> {
        if query.batch_ids.is_empty() {
            return Err(AllocationError::validation("at least one batch is required"));
        }
        if !query.phase.is_tank_phase() {
            return Err(AllocationError::validation(format!(
                "{} does not occupy a tank",
                query.phase
            )));
        }
        let window = self.policy.window(query.window_start, query.window_end)?;

        let uow = self.uow_factory.begin_read_only().await?;
        let result = self.preview_in(uow.as_ref(), &query, window).await;
        close(uow, result).await
    }

    async fn preview_in(
        &self,
        uow: &dyn UnitOfWork,
        query: &PreviewPlanQuery,
        window: TimeWindow,
    ) -> AllocationResult<PlanPreview> {
        let mut batches: Vec<Batch> = Vec::with_capacity(query.batch_ids.len());
        for batch_id in &query.batch_ids {
            let batch = uow
                .batches()
                .find_by_id(batch_id, &query.tenant_id)
                .await?
                .ok_or_else(|| AllocationError::not_found(format!("batch {}", batch_id)))?;
            batches.push(batch);
        }
        let total = query
            .total_volume
            .unwrap_or_else(|| batches.iter().map(|b| b.volume).sum());

        // 转罐试算时，批次自己当前占用的酒批不算冲突
        let mut ignore_lots: BTreeSet<LotId> = BTreeSet::new();
        for batch in &batches {
            for lot in uow
                .lots()
                .find_open_by_batch(&batch.id, &query.tenant_id)
                .await?
            {
                if lot.phase != query.phase {
                    ignore_lots.insert(lot.id);
                }
            }
        }

        let mode = self.resolve_mode(uow, query, total).await?;
        let primary = batches
            .first()
            .ok_or_else(|| AllocationError::validation("at least one batch is required"))?;
        let snapshot = build_snapshot(
            uow,
            SnapshotRequest {
                tenant_id: query.tenant_id,
                phase: query.phase,
                window,
                mode: &mode,
                incoming: IncomingProfile {
                    recipe_id: primary.recipe_id,
                    yeast_strain: primary.yeast_strain.clone(),
                    style: primary.style.clone(),
                    phase: Some(query.phase),
                    brewed_at: primary.brewed_at,
                },
                ignore_lots,
            },
            &self.policy,
        )
        .await?;

        let request = AllocationRequest {
            total_volume: total,
            mode: mode.clone(),
        };
        let requested = match &mode {
            AllocationMode::Split { allocations } => allocations.clone(),
            _ => Vec::new(),
        };

        Ok(match planner::plan(&request, &snapshot) {
            Ok(plan) => PlanPreview {
                total_volume: total,
                remaining_volume: remaining_volume(total, &plan.allocations),
                allocations: plan.allocations,
                valid: true,
                rejection: None,
            },
            Err(error) => PlanPreview {
                total_volume: total,
                remaining_volume: remaining_volume(total, &requested),
                allocations: requested,
                valid: false,
                rejection: Some(PlanRejection {
                    code: error.code().to_string(),
                    message: error.to_string(),
                    details: error.details(),
                }),
            },
        })
    }

    /// 补齐拆分草稿中的体积：平均分配，或按剩余量与罐容量取默认值
    async fn resolve_mode(
        &self,
        uow: &dyn UnitOfWork,
        query: &PreviewPlanQuery,
        total: Volume,
    ) -> AllocationResult<AllocationMode> {
        Ok(match &query.mode {
            PreviewMode::Single { tank_id } => AllocationMode::Single { tank_id: *tank_id },
            PreviewMode::Blend { target_lot_id } => AllocationMode::Blend {
                target_lot_id: *target_lot_id,
            },
            PreviewMode::Split { drafts } => {
                let tank_ids: Vec<_> = drafts.iter().map(|d| d.tank_id).collect();
                if query.split_equally {
                    AllocationMode::Split {
                        allocations: split_equally(total, &tank_ids),
                    }
                } else {
                    let capacities: BTreeMap<_, _> =
                        load_tanks(uow, &tank_ids, &query.tenant_id)
                            .await?
                            .into_iter()
                            .map(|t| (t.id, t.capacity))
                            .collect();
                    let mut allocated = Volume::ZERO;
                    let mut allocations = Vec::with_capacity(drafts.len());
                    for draft in drafts {
                        let volume = match draft.volume {
                            Some(volume) => volume,
                            None => {
                                let capacity =
                                    capacities.get(&draft.tank_id).copied().unwrap_or(Volume::ZERO);
                                default_allocation(total, allocated, capacity)
                            }
                        };
                        allocated += volume;
                        allocations.push(PlannedAllocation {
                            tank_id: draft.tank_id,
                            volume,
                        });
                    }
                    AllocationMode::Split { allocations }
                }
            }
        })
    }
}

/// 结束只读事务
async fn close<T>(uow: Box<dyn UnitOfWork>, result: AllocationResult<T>) -> AllocationResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(error) => {
            let _ = uow.rollback().await;
            Err(error)
        }
    }
}
