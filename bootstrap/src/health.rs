//! 健康检查与指标端点
//!
//! `/health` 只表示进程存活，`/ready` 检查数据库，`/metrics` 输出 Prometheus 文本。

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use brewops_adapter_postgres::check_connection;
use brewops_telemetry::HealthStatus;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use tracing::warn;

#[derive(Clone)]
struct HealthState {
    pool: Option<PgPool>,
    metrics: Option<PrometheusHandle>,
}

/// 构建运维端点路由
///
/// `pool` 为空时 `/ready` 只报告进程状态。
pub fn health_routes(pool: Option<PgPool>, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
        .route("/metrics", get(render_metrics))
        .with_state(HealthState { pool, metrics })
}

async fn liveness() -> impl IntoResponse {
    let mut status = HealthStatus::new();
    status.add_check("process", true, None);
    (StatusCode::OK, Json(status))
}

async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    let mut status = HealthStatus::new();

    if let Some(pool) = &state.pool {
        match check_connection(pool).await {
            Ok(()) => status.add_check("postgres", true, None),
            Err(e) => {
                warn!(error = %e, "Readiness check failed");
                status.add_check("postgres", false, Some(e.to_string()));
            }
        }
    }

    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn render_metrics(State(state): State<HealthState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
