//! 事务入口
//!
//! 写命令一律 SERIALIZABLE，并给行锁等待设上限；查询走只读快照。

use std::time::Duration;

use brewops_errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

/// 事务用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// 读写，SERIALIZABLE
    Command,
    /// 只读，REPEATABLE READ 快照
    Snapshot,
}

impl TxMode {
    /// 必须是事务中的第一条语句
    pub fn set_transaction_sql(&self) -> &'static str {
        match self {
            TxMode::Command => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ WRITE",
            TxMode::Snapshot => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
        }
    }
}

/// `SET LOCAL lock_timeout` 语句，零表示不设上限
fn lock_timeout_sql(timeout: Duration) -> Option<String> {
    let millis = timeout.as_millis();
    (millis > 0).then(|| format!("SET LOCAL lock_timeout = '{}ms'", millis))
}

#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
    lock_timeout: Duration,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: Duration::ZERO,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self, mode: TxMode) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(mode.set_transaction_sql())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to set transaction mode: {}", e)))?;

        if mode == TxMode::Command {
            if let Some(sql) = lock_timeout_sql(self.lock_timeout) {
                sqlx::query(&sql)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| AppError::database(format!("Failed to set lock timeout: {}", e)))?;
            }
        }

        debug!(?mode, "Transaction started");
        Ok(tx)
    }
}
