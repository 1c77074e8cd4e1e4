//! 转罐记录仓储接口

use async_trait::async_trait;
use brewops_common::TenantId;
use brewops_errors::AppResult;

use crate::domain::entities::Transfer;
use crate::domain::value_objects::BatchId;

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn save(&self, transfer: &Transfer) -> AppResult<()>;

    async fn update(&self, transfer: &Transfer) -> AppResult<()>;

    async fn find_by_batch(&self, batch_id: &BatchId, tenant_id: &TenantId) -> AppResult<Vec<Transfer>>;
}
