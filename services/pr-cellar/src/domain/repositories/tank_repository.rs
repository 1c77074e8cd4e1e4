//! 罐仓储接口

use async_trait::async_trait;
use brewops_common::TenantId;
use brewops_errors::AppResult;

use crate::domain::entities::Tank;
use crate::domain::enums::BatchPhase;
use crate::domain::value_objects::TankId;

#[async_trait]
pub trait TankRepository: Send + Sync {
    async fn find_by_id(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>>;

    /// 批量查找，未知的 ID 不出现在结果中
    async fn find_by_ids(&self, ids: &[TankId], tenant_id: &TenantId) -> AppResult<Vec<Tank>>;

    /// 查找并加行锁
    async fn lock(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>>;

    /// 具备某阶段能力的所有罐
    async fn list_by_capability(
        &self,
        phase: BatchPhase,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Tank>>;

    async fn update(&self, tank: &Tank) -> AppResult<()>;
}
