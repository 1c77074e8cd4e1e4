//! HTTP 处理函数

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::dto::*;
use super::extractors::TenantContext;
use super::state::AppState;
use crate::application::CompleteCipCommand;
use crate::domain::value_objects::{AssignmentId, BatchId, TankId};
use crate::error::AllocationResult;

pub async fn list_candidate_tanks(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(params): Query<CandidateTanksParams>,
) -> AllocationResult<impl IntoResponse> {
    let tanks = state
        .queries
        .list_candidate_tanks(params.into_query(ctx.tenant_id))
        .await?;
    Ok(Json(tanks))
}

pub async fn check_availability(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(body): Json<AvailabilityRequest>,
) -> AllocationResult<impl IntoResponse> {
    let (start, end) = (body.window_start, body.window_end);
    let map = state
        .queries
        .check_availability(body.into_query(ctx.tenant_id))
        .await?;
    Ok(Json(AvailabilityResponse::new(start, end, map)))
}

pub async fn complete_cip(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(tank_id): Path<TankId>,
) -> AllocationResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .complete_cip(CompleteCipCommand {
            tenant_id: ctx.tenant_id,
            user_id: ctx.user_id,
            tank_id,
        })
        .await?;
    Ok(Json(outcome))
}

pub async fn list_active_lots(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(params): Query<ActiveLotsParams>,
) -> AllocationResult<impl IntoResponse> {
    let lots = state
        .queries
        .list_active_lots(params.into_query(ctx.tenant_id))
        .await?;
    Ok(Json(lots))
}

pub async fn preview_plan(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(body): Json<PreviewRequest>,
) -> AllocationResult<impl IntoResponse> {
    let preview = state
        .queries
        .preview_plan(body.into_query(ctx.tenant_id))
        .await?;
    Ok(Json(preview))
}

pub async fn plan_and_commit(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(batch_id): Path<BatchId>,
    Json(body): Json<AllocationRequestBody>,
) -> AllocationResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .plan_and_commit(body.into_command(batch_id, ctx.tenant_id, ctx.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn transfer_phase(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(batch_id): Path<BatchId>,
    Json(body): Json<TransferRequestBody>,
) -> AllocationResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .transfer_phase(body.into_command(batch_id, ctx.tenant_id, ctx.user_id))
        .await?;
    Ok(Json(outcome))
}

pub async fn advance_phase(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(batch_id): Path<BatchId>,
    Json(body): Json<AdvancePhaseBody>,
) -> AllocationResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .advance_phase(body.into_command(batch_id, ctx.tenant_id, ctx.user_id))
        .await?;
    Ok(Json(outcome))
}

/// 请求体可省略
pub async fn cancel_batch(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(batch_id): Path<BatchId>,
    body: Option<Json<CancelBatchBody>>,
) -> AllocationResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .orchestrator
        .cancel_batch(body.into_command(batch_id, ctx.tenant_id, ctx.user_id))
        .await?;
    Ok(Json(outcome))
}

pub async fn start_assignment(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(assignment_id): Path<AssignmentId>,
    body: Option<Json<StartAssignmentBody>>,
) -> AllocationResult<impl IntoResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = state
        .orchestrator
        .start_assignment(body.into_command(assignment_id, ctx.tenant_id, ctx.user_id))
        .await?;
    Ok(Json(outcome))
}
