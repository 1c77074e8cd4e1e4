//! 服务启动器
//!
//! 提供统一的 HTTP 服务启动模式

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use brewops_config::AppConfig;
use brewops_errors::AppResult;
use brewops_telemetry::init_metrics;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::health::health_routes;
use crate::infrastructure::Infrastructure;
use crate::runtime::{init_runtime, shutdown_signal};

/// 运行 HTTP 服务
///
/// 负责：加载配置，初始化日志和指标，创建基础设施，调用 `router_builder`
/// 构建业务路由，挂载运维端点，最后监听并处理 graceful shutdown。
///
/// ```ignore
/// brewops_bootstrap::run_http("config", |infra| async move {
///     infra.run_migrations(&migrations()).await?;
///     Ok(api::router(AppState::from_infrastructure(&infra)))
/// })
/// .await
/// ```
pub async fn run_http<F, Fut>(
    config_dir: &str,
    router_builder: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(Infrastructure) -> Fut,
    Fut: Future<Output = AppResult<Router>>,
{
    let config = AppConfig::load(config_dir)?;
    init_runtime(&config);

    info!("Starting {} service", config.app_name);

    let metrics = if config.telemetry.metrics_enabled {
        match init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Metrics exporter unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let infra = Infrastructure::from_config(config.clone()).await?;
    let pool = infra.postgres_pool();

    let app = router_builder(infra)
        .await?
        .merge(health_routes(Some(pool), metrics))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "HTTP server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service stopped");
    Ok(())
}
