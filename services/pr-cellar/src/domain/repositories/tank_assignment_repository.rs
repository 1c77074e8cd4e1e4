//! 占罐记录仓储接口

use async_trait::async_trait;
use brewops_common::TenantId;
use brewops_errors::AppResult;

use crate::domain::entities::TankAssignment;
use crate::domain::value_objects::{AssignmentId, LotId, TankId};

#[async_trait]
pub trait TankAssignmentRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
        tenant_id: &TenantId,
    ) -> AppResult<Option<TankAssignment>>;

    /// 新建；与已有 PLANNED/ACTIVE 记录时间窗重叠时返回冲突
    async fn save(&self, assignment: &TankAssignment) -> AppResult<()>;

    async fn update(&self, assignment: &TankAssignment) -> AppResult<()>;

    async fn find_by_lot(&self, lot_id: &LotId, tenant_id: &TenantId) -> AppResult<Vec<TankAssignment>>;

    /// 这些罐上仍为 PLANNED/ACTIVE 的占罐记录
    async fn find_open_by_tanks(
        &self,
        tank_ids: &[TankId],
        tenant_id: &TenantId,
    ) -> AppResult<Vec<TankAssignment>>;
}
