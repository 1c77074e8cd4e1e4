//! Unit of Work
//!
//! 一次命令中的所有读写共享同一个事务：可用性检查、规划与写入看到的是同一份数据。

use async_trait::async_trait;
use brewops_errors::AppResult;

use crate::domain::repositories::{
    BatchRepository, LotRepository, TankAssignmentRepository, TankRepository, TransferRepository,
};

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn tanks(&self) -> &dyn TankRepository;

    fn batches(&self) -> &dyn BatchRepository;

    fn lots(&self) -> &dyn LotRepository;

    fn assignments(&self) -> &dyn TankAssignmentRepository;

    fn transfers(&self) -> &dyn TransferRepository;

    /// 提交事务
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// 开始可写事务（SERIALIZABLE）
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;

    /// 开始只读事务，用于查询
    async fn begin_read_only(&self) -> AppResult<Box<dyn UnitOfWork>>;
}
