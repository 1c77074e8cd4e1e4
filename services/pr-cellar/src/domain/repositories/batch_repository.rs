//! 批次仓储接口

use async_trait::async_trait;
use brewops_common::TenantId;
use brewops_errors::AppResult;

use crate::domain::entities::Batch;
use crate::domain::value_objects::BatchId;

#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn find_by_id(&self, id: &BatchId, tenant_id: &TenantId) -> AppResult<Option<Batch>>;

    async fn update(&self, batch: &Batch) -> AppResult<()>;
}
