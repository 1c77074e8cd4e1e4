//! 酒批仓储接口

use async_trait::async_trait;
use brewops_common::{TenantId, UserId};
use brewops_errors::AppResult;

use crate::domain::entities::Lot;
use crate::domain::enums::BatchPhase;
use crate::domain::value_objects::{BatchId, LotId, Readings};

#[async_trait]
pub trait LotRepository: Send + Sync {
    async fn find_by_id(&self, id: &LotId, tenant_id: &TenantId) -> AppResult<Option<Lot>>;

    async fn save(&self, lot: &Lot) -> AppResult<()>;

    async fn update(&self, lot: &Lot) -> AppResult<()>;

    /// 含有该批次贡献且仍未关闭的酒批
    async fn find_open_by_batch(
        &self,
        batch_id: &BatchId,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>>;

    /// 未关闭的酒批，可按阶段过滤
    async fn list_open(
        &self,
        phase: Option<BatchPhase>,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>>;

    /// 记录比重/温度读数
    async fn add_reading(
        &self,
        lot_id: &LotId,
        tenant_id: &TenantId,
        readings: &Readings,
        recorded_by: Option<UserId>,
    ) -> AppResult<()>;

    async fn list_readings(&self, lot_id: &LotId, tenant_id: &TenantId) -> AppResult<Vec<Readings>>;
}
