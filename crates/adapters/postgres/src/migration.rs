//! 内嵌迁移
//!
//! 脚本随二进制发布（`include_str!`）。启动时在 advisory lock 下按版本执行未应用的脚本，
//! 已应用脚本被改动过则拒绝启动。

use std::collections::BTreeMap;

use brewops_errors::{AppError, AppResult};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{info, warn};

/// 多实例同时启动时串行执行迁移
const MIGRATION_LOCK_KEY: i64 = 0x6272_6577_6f70_73;

const HISTORY_TABLE: &str = "_migrations";

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = fnv1a(&sql);
        Self {
            version,
            name: name.into(),
            sql,
            checksum,
        }
    }
}

/// FNV-1a，跨进程、跨版本稳定
fn fnv1a(text: &str) -> String {
    let hash = text.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    format!("{:016x}", hash)
}

/// 计算待执行的迁移，按版本升序
///
/// `applied` 为已记录的版本与校验和。
pub fn pending<'a>(
    applied: &BTreeMap<i64, String>,
    migrations: &'a [Migration],
) -> AppResult<Vec<&'a Migration>> {
    let mut sorted: Vec<&Migration> = migrations.iter().collect();
    sorted.sort_by_key(|m| m.version);
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].version == pair[1].version) {
        return Err(AppError::internal(format!(
            "Migration version {} is defined twice",
            pair[0].version
        )));
    }

    let mut todo = Vec::new();
    for migration in sorted {
        match applied.get(&migration.version) {
            Some(checksum) if *checksum != migration.checksum => {
                return Err(AppError::internal(format!(
                    "Migration {} ({}) was modified after it was applied",
                    migration.version, migration.name
                )));
            }
            Some(_) => {}
            None => todo.push(migration),
        }
    }
    Ok(todo)
}

#[derive(Debug, Clone, Default)]
pub struct MigrationResult {
    pub applied: Vec<i64>,
    pub skipped: usize,
}

impl MigrationResult {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

pub struct MigrationManager {
    pool: PgPool,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self, migrations: &[Migration]) -> AppResult<MigrationResult> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {}", e)))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                checksum VARCHAR(64) NOT NULL
            )",
            HISTORY_TABLE
        ))
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database(format!("Failed to create migration table: {}", e)))?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to take migration lock: {}", e)))?;

        let outcome = apply_pending(&mut conn, migrations).await;

        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to release migration lock");
        }
        outcome
    }
}

async fn apply_pending(
    conn: &mut PoolConnection<Postgres>,
    migrations: &[Migration],
) -> AppResult<MigrationResult> {
    let applied: BTreeMap<i64, String> =
        sqlx::query_as::<_, (i64, String)>(&format!("SELECT version, checksum FROM {}", HISTORY_TABLE))
            .fetch_all(&mut **conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to read migration history: {}", e)))?
            .into_iter()
            .collect();

    let todo = pending(&applied, migrations)?;
    let mut result = MigrationResult {
        applied: Vec::with_capacity(todo.len()),
        skipped: migrations.len() - todo.len(),
    };

    for migration in todo {
        let mut tx = sqlx::Connection::begin(&mut **conn)
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;

        // 脚本含多条语句，走简单查询协议
        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!(
                    "Failed to apply migration {}: {}",
                    migration.version, e
                ))
            })?;
        sqlx::query(&format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            HISTORY_TABLE
        ))
        .bind(migration.version)
        .bind(&migration.name)
        .bind(&migration.checksum)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to record migration: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit migration: {}", e)))?;

        info!(version = migration.version, name = %migration.name, "Migration applied");
        result.applied.push(migration.version);
    }
    Ok(result)
}
