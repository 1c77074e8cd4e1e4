//! 转罐编排集成测试
//!
//! 通过内存 Unit of Work 驱动完整命令：规划、写入、转罐、推进、取消。

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{day, liters, Cellar};
use pr_cellar::application::*;
use pr_cellar::domain::enums::{
    AssignmentStatus, BatchPhase, LotStatus, TankStatus, TankType, TransferStatus, TransferType,
};
use pr_cellar::domain::services::{AllocationMode, PlannedAllocation};
use pr_cellar::domain::value_objects::{BatchId, BlendRule, Readings, TankId};
use pr_cellar::error::AllocationError;

fn orchestrator(cellar: &Cellar) -> TransferOrchestrator {
    TransferOrchestrator::new(cellar.store.factory(), cellar.policy())
}

fn plan_cmd(cellar: &Cellar, batch_ids: Vec<BatchId>, mode: AllocationMode, start: u32, end: u32) -> PlanAndCommitCommand {
    PlanAndCommitCommand {
        tenant_id: cellar.tenant_id,
        user_id: None,
        batch_ids,
        window_start: day(start),
        window_end: Some(day(end)),
        mode,
        readings: Readings::default(),
        notes: None,
    }
}

fn single(tank_id: TankId) -> AllocationMode {
    AllocationMode::Single { tank_id }
}

fn transfer_cmd(cellar: &Cellar, batch_id: BatchId, to: BatchPhase, mode: Option<AllocationMode>, stay: bool) -> TransferPhaseCommand {
    TransferPhaseCommand {
        tenant_id: cellar.tenant_id,
        user_id: None,
        batch_id,
        to_phase: to,
        window_start: day(15),
        window_end: Some(day(25)),
        mode,
        stay_in_same_tank: stay,
        source_lot_id: None,
        source_tank_id: None,
        measured_loss: None,
        readings: Readings::default(),
        notes: None,
    }
}

fn advance_cmd(cellar: &Cellar, batch_id: BatchId, to: BatchPhase) -> AdvancePhaseCommand {
    AdvancePhaseCommand {
        tenant_id: cellar.tenant_id,
        user_id: None,
        batch_id,
        to_phase: to,
        measured_volume: None,
    }
}

// ============================================================================
// 首次入罐
// ============================================================================

#[tokio::test]
async fn test_single_allocation_moves_brewed_batch_into_fermentation() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-101", 500.0, BatchPhase::Brewing);

    let outcome = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(outcome.assignments[0].tank_id, fv1.id);
    assert_eq!(outcome.assignments[0].status, AssignmentStatus::Planned);
    assert!(outcome.transfers.is_empty());

    let state = cellar.store.state();
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Fermenting);
    let lots = state.lots_of(batch.id);
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].lot_code, "B-101-F");
    assert!(lots[0].volume.approx_eq(liters(500.0), 0.01));
}

#[tokio::test]
async fn test_split_writes_parent_children_and_split_transfers() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 400.0);
    let fv2 = cellar.tank("FV2", TankType::Fermenter, 400.0);
    let batch = cellar.batch("B-102", 500.0, BatchPhase::Brewing);

    let mode = AllocationMode::Split {
        allocations: vec![
            PlannedAllocation { tank_id: fv1.id, volume: liters(300.0) },
            PlannedAllocation { tank_id: fv2.id, volume: liters(200.0) },
        ],
    };
    let outcome = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], mode, 1, 15))
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 2);
    assert!(outcome.assignments.iter().all(|a| a.is_split_source));
    assert_eq!(outcome.transfers.len(), 2);
    assert!(outcome
        .transfers
        .iter()
        .all(|t| t.transfer_type == TransferType::Split && t.status == TransferStatus::Completed));

    let state = cellar.store.state();
    let lots = state.lots_of(batch.id);
    assert_eq!(lots.len(), 3);
    let parent = lots.iter().find(|l| l.parent_lot_id.is_none()).unwrap();
    let children: Vec<_> = lots.iter().filter(|l| l.parent_lot_id == Some(parent.id)).collect();
    assert_eq!(children.len(), 2);
    let child_total: f64 = children.iter().map(|l| l.volume.as_liters()).sum();
    assert!((child_total - 500.0).abs() < 0.01);
}

#[tokio::test]
async fn test_split_volume_mismatch_writes_nothing() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 400.0);
    let fv2 = cellar.tank("FV2", TankType::Fermenter, 400.0);
    let batch = cellar.batch("B-103", 500.0, BatchPhase::Brewing);

    let mode = AllocationMode::Split {
        allocations: vec![
            PlannedAllocation { tank_id: fv1.id, volume: liters(300.0) },
            PlannedAllocation { tank_id: fv2.id, volume: liters(150.0) },
        ],
    };
    let err = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], mode, 1, 15))
        .await
        .unwrap_err();

    match err {
        AllocationError::VolumeMismatch { remainder } => assert!((remainder - 50.0).abs() < 1e-9),
        other => panic!("unexpected error {:?}", other),
    }
    let state = cellar.store.state();
    assert!(state.lots.is_empty());
    assert!(state.assignments.is_empty());
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Brewing);
}

#[tokio::test]
async fn test_capacity_exceeded_names_the_tank() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 400.0);
    let batch = cellar.batch("B-104", 500.0, BatchPhase::Brewing);

    let err = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap_err();

    match err {
        AllocationError::CapacityExceeded { tank_id, capacity, requested, .. } => {
            assert_eq!(tank_id, fv1.id);
            assert_eq!(capacity, 400.0);
            assert_eq!(requested, 500.0);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_default_window_past_calendar_end_is_a_validation_error() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-108", 500.0, BatchPhase::Brewing);

    let mut cmd = plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15);
    cmd.window_start = "+262142-12-30T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
    cmd.window_end = None;
    let err = orchestrator(&cellar).plan_and_commit(cmd).await.unwrap_err();

    assert!(matches!(err, AllocationError::Validation(_)));
    assert!(cellar.store.state().assignments_on(fv1.id).is_empty());
}

#[tokio::test]
async fn test_overlapping_window_is_rejected_but_back_to_back_is_not() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let first = cellar.batch("B-105", 500.0, BatchPhase::Brewing);
    let second = cellar.batch("B-106", 500.0, BatchPhase::Brewing);
    let third = cellar.batch("B-107", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let err = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![second.id], single(fv1.id), 10, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::TankUnavailable { tank_id } if tank_id == fv1.id));

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![third.id], single(fv1.id), 15, 29))
        .await
        .unwrap();
    assert_eq!(cellar.store.state().assignments_on(fv1.id).len(), 2);
}

#[tokio::test]
async fn test_reserving_a_planned_batch_twice_is_a_duplicate() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let fv2 = cellar.tank("FV2", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-108", 500.0, BatchPhase::Planned);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
    assert_eq!(cellar.store.state().batches[&batch.id].phase, BatchPhase::Planned);

    let err = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv2.id), 1, 15))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::DuplicatePlan { batch_id, .. } if batch_id == batch.id));
}

#[tokio::test]
async fn test_blend_adds_volume_to_target_lot() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let first = cellar.batch("B-109", 500.0, BatchPhase::Brewing);
    let second = cellar.batch("B-110", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    let seeded = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
    let target_lot_id = seeded.lot_id.unwrap();

    let blended = orchestrator
        .plan_and_commit(plan_cmd(
            &cellar,
            vec![second.id],
            AllocationMode::Blend { target_lot_id },
            2,
            16,
        ))
        .await
        .unwrap();
    assert_eq!(blended.lot_id, Some(target_lot_id));
    assert_eq!(blended.transfers.len(), 1);
    assert_eq!(blended.transfers[0].transfer_type, TransferType::Blend);

    let state = cellar.store.state();
    let lot = &state.lots[&target_lot_id];
    assert!(lot.is_blend_result);
    assert!(lot.volume.approx_eq(liters(1000.0), 0.01));
    assert!(lot.contains_batch(second.id));
    let assignment = state.assignments_on(fv1.id)[0];
    assert!(assignment.is_blend_target);
    assert!(assignment.planned_volume.approx_eq(liters(1000.0), 0.01));
    assert_eq!(assignment.window.end(), day(16));
}

#[tokio::test]
async fn test_blend_with_different_yeast_is_incompatible() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let first = cellar.batch("B-111", 500.0, BatchPhase::Brewing);
    let mut other = cellar.batch("B-112", 500.0, BatchPhase::Brewing);
    other.yeast_strain = Some("WLP001".to_string());
    let other = cellar.store.insert_batch(other);
    let orchestrator = orchestrator(&cellar);

    let seeded = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let err = orchestrator
        .plan_and_commit(plan_cmd(
            &cellar,
            vec![other.id],
            AllocationMode::Blend { target_lot_id: seeded.lot_id.unwrap() },
            1,
            15,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::BlendIncompatible { rule: BlendRule::Yeast }));
}

#[tokio::test]
async fn test_multi_batch_plan_creates_one_blended_lot() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let first = cellar.batch("B-113", 500.0, BatchPhase::Brewing);
    let second = cellar.batch("B-114", 400.0, BatchPhase::Brewing);

    let outcome = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![first.id, second.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let state = cellar.store.state();
    let lot = &state.lots[&outcome.lot_id.unwrap()];
    assert_eq!(lot.contributions.len(), 2);
    assert!(lot.volume.approx_eq(liters(900.0), 0.01));
    assert_eq!(state.batches[&second.id].phase, BatchPhase::Fermenting);
}

// ============================================================================
// 阶段转罐
// ============================================================================

#[tokio::test]
async fn test_transfer_to_conditioning_releases_source_tank() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let bbt = cellar.tank("BBT1", TankType::Brite, 600.0);
    let batch = cellar.batch("B-120", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let mut cmd = transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, Some(single(bbt.id)), false);
    cmd.measured_loss = Some(liters(20.0));
    let outcome = orchestrator.transfer_phase(cmd).await.unwrap();

    assert_eq!(outcome.transfers.len(), 1);
    let transfer = &outcome.transfers[0];
    assert_eq!(transfer.transfer_type, TransferType::FermentToCondition);
    assert_eq!(transfer.source_tank_id, Some(fv1.id));
    assert_eq!(transfer.destination_tank_id, bbt.id);
    assert!(transfer.volume.approx_eq(liters(480.0), 0.01));
    assert!(transfer.loss.approx_eq(liters(20.0), 0.01));

    let state = cellar.store.state();
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Conditioning);
    assert_eq!(state.tanks[&fv1.id].status, TankStatus::Cleaning);
    assert!(state.tanks[&fv1.id].needs_cip);
    assert_eq!(state.tanks[&bbt.id].status, TankStatus::Occupied);

    let source = state.assignments_on(fv1.id)[0];
    assert_eq!(source.status, AssignmentStatus::Completed);
    assert!(source.actual_end.is_some());
    let destination = state.assignments_on(bbt.id)[0];
    assert_eq!(destination.status, AssignmentStatus::Active);

    let open: Vec<_> = state.lots_of(batch.id).into_iter().filter(|l| l.is_open()).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].phase, BatchPhase::Conditioning);
    assert_eq!(open[0].status, LotStatus::Active);
    assert!(open[0].volume.approx_eq(liters(480.0), 0.01));
}

#[tokio::test]
async fn test_transfer_into_tank_holding_another_lot_is_unavailable() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let fv2 = cellar.tank("FV2", TankType::Fermenter, 600.0);
    let bbt = cellar.tank("BBT1", TankType::Brite, 600.0);
    let first = cellar.batch("B-124", 500.0, BatchPhase::Brewing);
    let other = cellar.batch("B-125", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![other.id], single(fv2.id), 1, 3))
        .await
        .unwrap();
    let mut early = transfer_cmd(&cellar, other.id, BatchPhase::Conditioning, Some(single(bbt.id)), false);
    early.window_start = day(3);
    early.window_end = Some(day(5));
    orchestrator.transfer_phase(early).await.unwrap();

    let err = orchestrator
        .transfer_phase(transfer_cmd(&cellar, first.id, BatchPhase::Conditioning, Some(single(bbt.id)), false))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TANK_UNAVAILABLE");
    assert!(matches!(err, AllocationError::TankUnavailable { tank_id } if tank_id == bbt.id));

    let state = cellar.store.state();
    assert_eq!(state.batches[&first.id].phase, BatchPhase::Fermenting);
    assert_eq!(state.assignments_on(fv1.id)[0].status, AssignmentStatus::Planned);
    assert_eq!(state.assignments_on(bbt.id).len(), 1);
}

#[tokio::test]
async fn test_transfer_with_future_window_starts_no_later_than_now() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let bbt = cellar.tank("BBT1", TankType::Brite, 600.0);
    let batch = cellar.batch("B-126", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let planned_start = Utc::now() + Duration::days(30);
    let mut cmd = transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, Some(single(bbt.id)), false);
    cmd.window_start = planned_start;
    cmd.window_end = None;
    orchestrator.transfer_phase(cmd).await.unwrap();

    let state = cellar.store.state();
    let destination = state.assignments_on(bbt.id)[0];
    assert_eq!(destination.status, AssignmentStatus::Active);
    assert_eq!(destination.window.start(), planned_start);
    assert!(destination.actual_start.unwrap() <= Utc::now());
}

#[tokio::test]
async fn test_stay_in_unitank_records_tank_to_tank_transfer() {
    let cellar = Cellar::new();
    let uni = cellar.tank("UNI1", TankType::Unitank, 600.0);
    let batch = cellar.batch("B-121", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    let planned = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(uni.id), 1, 15))
        .await
        .unwrap();

    let outcome = orchestrator
        .transfer_phase(transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, None, true))
        .await
        .unwrap();

    assert_eq!(outcome.lot_id, planned.lot_id);
    let transfer = &outcome.transfers[0];
    assert_eq!(transfer.transfer_type, TransferType::TankToTank);
    assert_eq!(transfer.source_tank_id, Some(uni.id));
    assert_eq!(transfer.destination_tank_id, uni.id);
    assert_eq!(transfer.source_lot_id, Some(transfer.destination_lot_id));

    let state = cellar.store.state();
    let on_tank = state.assignments_on(uni.id);
    assert_eq!(on_tank.len(), 2);
    assert_eq!(on_tank.iter().filter(|a| a.status == AssignmentStatus::Active).count(), 1);
    assert_eq!(state.lots[&planned.lot_id.unwrap()].phase, BatchPhase::Conditioning);
    assert_eq!(state.tanks[&uni.id].status, TankStatus::Occupied);
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Conditioning);
}

#[tokio::test]
async fn test_stay_in_fermenter_without_conditioning_capability_fails() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-122", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let err = orchestrator
        .transfer_phase(transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, None, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Validation(_)));
    assert_eq!(cellar.store.state().batches[&batch.id].phase, BatchPhase::Fermenting);
}

#[tokio::test]
async fn test_transfer_needs_destination_or_stay() {
    let cellar = Cellar::new();
    let batch = cellar.batch("B-123", 500.0, BatchPhase::Fermenting);

    let err = orchestrator(&cellar)
        .transfer_phase(transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, None, false))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::SelectionRequired(_)));
}

#[tokio::test]
async fn test_transfer_cannot_skip_phases() {
    let cellar = Cellar::new();
    let bbt = cellar.tank("BBT1", TankType::Brite, 600.0);
    let batch = cellar.batch("B-124", 500.0, BatchPhase::Fermenting);

    let err = orchestrator(&cellar)
        .transfer_phase(transfer_cmd(&cellar, batch.id, BatchPhase::Ready, Some(single(bbt.id)), false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::InvalidTransition { from: BatchPhase::Fermenting, to: BatchPhase::Ready }
    ));
}

// ============================================================================
// 阶段推进、取消、入罐、CIP
// ============================================================================

#[tokio::test]
async fn test_packaging_empties_tank_and_cip_makes_it_available() {
    let cellar = Cellar::new();
    let uni = cellar.tank("UNI1", TankType::Unitank, 600.0);
    let batch = cellar.batch("B-130", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(uni.id), 1, 15))
        .await
        .unwrap();
    orchestrator
        .transfer_phase(transfer_cmd(&cellar, batch.id, BatchPhase::Conditioning, None, true))
        .await
        .unwrap();
    let mut to_ready = transfer_cmd(&cellar, batch.id, BatchPhase::Ready, None, true);
    to_ready.window_start = day(25);
    to_ready.window_end = Some(day(29));
    orchestrator.transfer_phase(to_ready).await.unwrap();

    let outcome = orchestrator
        .advance_phase(advance_cmd(&cellar, batch.id, BatchPhase::Packaging))
        .await
        .unwrap();
    assert_eq!(outcome.tanks.len(), 1);

    let state = cellar.store.state();
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Packaging);
    assert_eq!(state.tanks[&uni.id].status, TankStatus::Cleaning);
    assert!(state.assignments_on(uni.id).iter().all(|a| !a.is_open()));
    assert!(state.lots_of(batch.id).iter().all(|l| !l.is_open()));

    orchestrator
        .complete_cip(CompleteCipCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            tank_id: uni.id,
        })
        .await
        .unwrap();
    let state = cellar.store.state();
    assert_eq!(state.tanks[&uni.id].status, TankStatus::Available);
    assert!(!state.tanks[&uni.id].needs_cip);
}

#[tokio::test]
async fn test_cip_on_available_tank_is_invalid() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);

    let err = orchestrator(&cellar)
        .complete_cip(CompleteCipCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            tank_id: fv1.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidState(_)));
}

#[tokio::test]
async fn test_reserved_batch_walks_through_brewing_and_starts() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let fv2 = cellar.tank("FV2", TankType::Fermenter, 1200.0);
    let batch = cellar.batch("B-131", 1000.0, BatchPhase::Planned);
    let orchestrator = orchestrator(&cellar);

    let mode = AllocationMode::Split {
        allocations: vec![
            PlannedAllocation { tank_id: fv1.id, volume: liters(500.0) },
            PlannedAllocation { tank_id: fv2.id, volume: liters(500.0) },
        ],
    };
    let planned = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], mode, 1, 15))
        .await
        .unwrap();
    assert!(planned.transfers.iter().all(|t| t.status == TransferStatus::Planned));

    let err = orchestrator
        .advance_phase(advance_cmd(&cellar, batch.id, BatchPhase::Fermenting))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidTransition { .. }));

    orchestrator
        .advance_phase(advance_cmd(&cellar, batch.id, BatchPhase::Brewing))
        .await
        .unwrap();
    let fermenting = orchestrator
        .advance_phase(advance_cmd(&cellar, batch.id, BatchPhase::Fermenting))
        .await
        .unwrap();
    assert_eq!(fermenting.transfers.len(), 2);
    assert!(fermenting.transfers.iter().all(|t| t.status == TransferStatus::Completed));

    let assignment_id = planned.assignments[0].id;
    let started = orchestrator
        .start_assignment(StartAssignmentCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            assignment_id,
            started_at: Some(day(1)),
        })
        .await
        .unwrap();
    assert_eq!(started.assignments[0].status, AssignmentStatus::Active);
    assert_eq!(started.assignments[0].actual_start, Some(day(1)));
    // 子酒批与拆分父酒批一同激活
    assert_eq!(started.lots.len(), 2);
    assert!(started.lots.iter().all(|l| l.status == LotStatus::Active));

    let state = cellar.store.state();
    assert_eq!(state.tanks[&planned.assignments[0].tank_id].status, TankStatus::Occupied);
}

#[tokio::test]
async fn test_measured_volume_is_recorded_when_brewing_starts() {
    let cellar = Cellar::new();
    let batch = cellar.batch("B-132", 500.0, BatchPhase::Planned);

    let mut cmd = advance_cmd(&cellar, batch.id, BatchPhase::Brewing);
    cmd.measured_volume = Some(liters(480.0));
    orchestrator(&cellar).advance_phase(cmd).await.unwrap();

    let state = cellar.store.state();
    assert_eq!(state.batches[&batch.id].volume, liters(480.0));
    assert!(state.batches[&batch.id].brewed_at.is_some());
}

#[tokio::test]
async fn test_fermenting_without_a_plan_requires_selection() {
    let cellar = Cellar::new();
    let batch = cellar.batch("B-133", 500.0, BatchPhase::Brewing);

    let err = orchestrator(&cellar)
        .advance_phase(advance_cmd(&cellar, batch.id, BatchPhase::Fermenting))
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::SelectionRequired(_)));
}

#[tokio::test]
async fn test_cancel_frees_the_window_for_another_batch() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-134", 500.0, BatchPhase::Planned);
    let next = cellar.batch("B-135", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap();

    let cancelled = orchestrator
        .cancel_batch(CancelBatchCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            batch_id: batch.id,
            reason: Some("boil-over".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.batches[0].phase, BatchPhase::Cancelled);
    assert!(cancelled.lots.iter().all(|l| l.status == LotStatus::Cancelled));
    assert!(cancelled.assignments.iter().all(|a| a.status == AssignmentStatus::Cancelled));

    orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![next.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_withdraws_contribution_from_blend() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let first = cellar.batch("B-136", 600.0, BatchPhase::Brewing);
    let second = cellar.batch("B-137", 400.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    let seeded = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
    let target_lot_id = seeded.lot_id.unwrap();
    orchestrator
        .plan_and_commit(plan_cmd(
            &cellar,
            vec![second.id],
            AllocationMode::Blend { target_lot_id },
            1,
            15,
        ))
        .await
        .unwrap();

    orchestrator
        .cancel_batch(CancelBatchCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            batch_id: second.id,
            reason: None,
        })
        .await
        .unwrap();

    let state = cellar.store.state();
    let lot = &state.lots[&target_lot_id];
    assert!(lot.is_open());
    assert!(!lot.contains_batch(second.id));
    assert!(lot.volume.approx_eq(liters(600.0), 0.01));
    assert!(state.assignments_on(fv1.id)[0].planned_volume.approx_eq(liters(600.0), 0.01));
    assert_eq!(state.batches[&first.id].phase, BatchPhase::Fermenting);
}

#[tokio::test]
async fn test_cancelling_the_blended_batch_restores_the_target_window() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 1200.0);
    let first = cellar.batch("B-139", 600.0, BatchPhase::Brewing);
    let second = cellar.batch("B-139A", 400.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    let seeded = orchestrator
        .plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15))
        .await
        .unwrap();
    let target_lot_id = seeded.lot_id.unwrap();
    orchestrator
        .plan_and_commit(plan_cmd(
            &cellar,
            vec![second.id],
            AllocationMode::Blend { target_lot_id },
            3,
            20,
        ))
        .await
        .unwrap();
    let widened = cellar.store.state().assignments_on(fv1.id)[0].window;
    assert_eq!(widened.end(), day(20));

    orchestrator
        .cancel_batch(CancelBatchCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            batch_id: second.id,
            reason: None,
        })
        .await
        .unwrap();

    let state = cellar.store.state();
    let assignment = state.assignments_on(fv1.id)[0];
    assert_eq!(assignment.window.start(), day(1));
    assert_eq!(assignment.window.end(), day(15));
    assert!(!assignment.is_blend_target);
    assert!(assignment.blend_base.is_none());
    assert!(assignment.planned_volume.approx_eq(liters(600.0), 0.01));
}

#[tokio::test]
async fn test_cancelling_a_completed_batch_is_invalid() {
    let cellar = Cellar::new();
    let batch = cellar.batch("B-138", 500.0, BatchPhase::Completed);

    let err = orchestrator(&cellar)
        .cancel_batch(CancelBatchCommand {
            tenant_id: cellar.tenant_id,
            user_id: None,
            batch_id: batch.id,
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::InvalidTransition { .. }));
}

// ============================================================================
// 并发与存储故障
// ============================================================================

#[tokio::test]
async fn test_concurrent_plans_for_one_tank_admit_exactly_one() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let first = cellar.batch("B-140", 500.0, BatchPhase::Brewing);
    let second = cellar.batch("B-141", 500.0, BatchPhase::Brewing);
    let orchestrator = orchestrator(&cellar);

    let (a, b) = tokio::join!(
        orchestrator.plan_and_commit(plan_cmd(&cellar, vec![first.id], single(fv1.id), 1, 15)),
        orchestrator.plan_and_commit(plan_cmd(&cellar, vec![second.id], single(fv1.id), 5, 20)),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(loser, AllocationError::ConcurrentModification(_)));
    assert_eq!(loser.code(), "CONCURRENT_MODIFICATION");
    assert_eq!(cellar.store.state().assignments_on(fv1.id).len(), 1);
}

#[tokio::test]
async fn test_storage_failure_rolls_back_and_is_retryable() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-142", 500.0, BatchPhase::Brewing);
    cellar.store.fail_next_commit();

    let err = orchestrator(&cellar)
        .plan_and_commit(plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15))
        .await
        .unwrap_err();

    assert!(matches!(err, AllocationError::Storage(_)));
    assert!(err.to_problem_details().retryable);
    let state = cellar.store.state();
    assert!(state.lots.is_empty());
    assert_eq!(state.batches[&batch.id].phase, BatchPhase::Brewing);
}

#[tokio::test]
async fn test_other_tenants_cannot_see_the_batch() {
    let cellar = Cellar::new();
    let fv1 = cellar.tank("FV1", TankType::Fermenter, 600.0);
    let batch = cellar.batch("B-143", 500.0, BatchPhase::Brewing);

    let mut cmd = plan_cmd(&cellar, vec![batch.id], single(fv1.id), 1, 15);
    cmd.tenant_id = brewops_common::TenantId::new();
    let err = orchestrator(&cellar).plan_and_commit(cmd).await.unwrap_err();
    assert!(matches!(err, AllocationError::NotFound(_)));
}
