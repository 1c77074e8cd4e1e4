//! 基础设施资源管理

use std::time::Duration;

use brewops_adapter_postgres::{
    Migration, MigrationManager, PostgresConfig, TransactionManager, create_pool,
};
use brewops_config::AppConfig;
use brewops_errors::AppResult;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::info;

use crate::retry::{StartupBackoff, retry_startup};

/// 基础设施资源容器
///
/// 由 bootstrap 统一初始化，服务通过它拿到连接池和事务管理器。
#[derive(Clone)]
pub struct Infrastructure {
    config: AppConfig,
    postgres_pool: PgPool,
    transaction_manager: TransactionManager,
}

impl Infrastructure {
    /// 从配置创建基础设施资源，数据库未就绪时按配置重连
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let database = &config.database;
        let pg_config = PostgresConfig::new(database.url.expose_secret(), config.app_name.clone())
            .with_pool_size(database.min_connections, database.max_connections)
            .with_acquire_timeout(Duration::from_secs(database.acquire_timeout_secs));
        let postgres_pool = retry_startup(
            StartupBackoff::from_database(database),
            "postgres",
            || create_pool(&pg_config),
        )
        .await?;

        let transaction_manager = TransactionManager::new(postgres_pool.clone())
            .with_lock_timeout(Duration::from_millis(database.lock_timeout_ms));

        Ok(Self {
            config,
            postgres_pool,
            transaction_manager,
        })
    }

    /// 执行服务自带的迁移脚本
    pub async fn run_migrations(&self, migrations: &[Migration]) -> AppResult<()> {
        if !self.config.database.run_migrations {
            info!("Automatic migrations disabled, skipping");
            return Ok(());
        }

        let result = MigrationManager::new(self.postgres_pool.clone())
            .migrate(migrations)
            .await?;
        info!(
            applied = result.applied_count(),
            skipped = result.skipped,
            "Database migrations finished"
        );
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn postgres_pool(&self) -> PgPool {
        self.postgres_pool.clone()
    }

    pub fn transaction_manager(&self) -> TransactionManager {
        self.transaction_manager.clone()
    }
}
