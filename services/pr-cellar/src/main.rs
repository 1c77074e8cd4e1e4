//! 酒窖排罐服务入口

use std::sync::Arc;

use pr_cellar::api::{router, AppState};
use pr_cellar::config::PlanningPolicy;
use pr_cellar::infrastructure::persistence::{migrations, PostgresUnitOfWorkFactory};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 本地开发读取 .env，生产环境不存在该文件
    dotenvy::dotenv().ok();

    brewops_bootstrap::run_http("config", |infra| async move {
        infra.run_migrations(&migrations()).await?;

        let policy = PlanningPolicy::from(&infra.config().planning);
        info!(
            tolerance = policy.tolerance,
            default_window_days = policy.default_window_days,
            "Planning policy loaded"
        );

        let uow_factory = Arc::new(PostgresUnitOfWorkFactory::new(infra.transaction_manager()));
        Ok(router(AppState::new(uow_factory, policy)))
    })
    .await
}
