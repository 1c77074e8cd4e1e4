//! 路由

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

/// 业务路由，运维端点由启动器统一挂载
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tanks/candidates", get(handlers::list_candidate_tanks))
        .route("/api/v1/tanks/availability", post(handlers::check_availability))
        .route("/api/v1/tanks/{id}/cip-complete", post(handlers::complete_cip))
        .route("/api/v1/lots/active", get(handlers::list_active_lots))
        .route("/api/v1/plans/preview", post(handlers::preview_plan))
        .route("/api/v1/batches/{id}/allocations", post(handlers::plan_and_commit))
        .route("/api/v1/batches/{id}/transfers", post(handlers::transfer_phase))
        .route("/api/v1/batches/{id}/phase", post(handlers::advance_phase))
        .route("/api/v1/batches/{id}/cancel", post(handlers::cancel_batch))
        .route("/api/v1/assignments/{id}/start", post(handlers::start_assignment))
        .with_state(state)
}
