//! PostgreSQL Unit of Work 实现

use std::sync::Arc;

use async_trait::async_trait;
use brewops_adapter_postgres::{TransactionManager, TxMode};
use brewops_errors::{AppError, AppResult};
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

use super::tx_repositories::{
    SharedTx, TxBatchRepository, TxLotRepository, TxTankAssignmentRepository, TxTankRepository,
    TxTransferRepository,
};
use crate::domain::repositories::{
    BatchRepository, LotRepository, TankAssignmentRepository, TankRepository, TransferRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

/// Postgres Unit of Work 工厂
///
/// 写命令使用 SERIALIZABLE 事务，查询使用只读事务。
pub struct PostgresUnitOfWorkFactory {
    transactions: TransactionManager,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(transactions: TransactionManager) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.transactions.begin(TxMode::Command).await?;
        Ok(Box::new(PostgresUnitOfWork::new(tx)))
    }

    async fn begin_read_only(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.transactions.begin(TxMode::Snapshot).await?;
        Ok(Box::new(PostgresUnitOfWork::new(tx)))
    }
}

/// Postgres Unit of Work 实现
pub struct PostgresUnitOfWork {
    tx: SharedTx,
    tank_repo: TxTankRepository,
    batch_repo: TxBatchRepository,
    lot_repo: TxLotRepository,
    assignment_repo: TxTankAssignmentRepository,
    transfer_repo: TxTransferRepository,
}

impl PostgresUnitOfWork {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            tx: tx.clone(),
            tank_repo: TxTankRepository::new(tx.clone()),
            batch_repo: TxBatchRepository::new(tx.clone()),
            lot_repo: TxLotRepository::new(tx.clone()),
            assignment_repo: TxTankAssignmentRepository::new(tx.clone()),
            transfer_repo: TxTransferRepository::new(tx),
        }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    fn tanks(&self) -> &dyn TankRepository {
        &self.tank_repo
    }

    fn batches(&self) -> &dyn BatchRepository {
        &self.batch_repo
    }

    fn lots(&self) -> &dyn LotRepository {
        &self.lot_repo
    }

    fn assignments(&self) -> &dyn TankAssignmentRepository {
        &self.assignment_repo
    }

    fn transfers(&self) -> &dyn TransferRepository {
        &self.transfer_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        // 串行化冲突可能在提交时才报出
        tx.commit().await.map_err(super::error_mapper::map_sqlx_error)?;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))?;

        Ok(())
    }
}
