//! 事务内仓储
//!
//! 所有仓储共享同一个事务，而不是直接使用连接池。

use std::sync::Arc;

use async_trait::async_trait;
use brewops_common::{TenantId, UserId};
use brewops_errors::{AppError, AppResult};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error_mapper::map_sqlx_error;
use super::rows::{
    blend_base_column, capabilities_column, contributions_column, AssignmentRow, BatchRow, LotRow,
    ReadingRow, TankRow, TransferRow,
};
use crate::domain::entities::{Batch, Lot, Tank, TankAssignment, Transfer};
use crate::domain::enums::BatchPhase;
use crate::domain::repositories::{
    BatchRepository, LotRepository, TankAssignmentRepository, TankRepository, TransferRepository,
};
use crate::domain::value_objects::{AssignmentId, BatchId, LotId, Readings, TankId};

/// 共享事务
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
        }

        impl $name {
            pub fn new(tx: SharedTx) -> Self {
                Self { tx }
            }
        }
    };
}

define_tx_repo!(TxTankRepository);
define_tx_repo!(TxBatchRepository);
define_tx_repo!(TxLotRepository);
define_tx_repo!(TxTankAssignmentRepository);
define_tx_repo!(TxTransferRepository);

const TANK_COLUMNS: &str = "id, tenant_id, name, tank_type, capacity, status, capabilities, \
     needs_cip, created_at, created_by, updated_at, updated_by";

const BATCH_COLUMNS: &str = "id, tenant_id, batch_number, recipe_id, recipe_name, style, \
     yeast_strain, volume, phase, brewed_at, created_at, created_by, updated_at, updated_by";

const LOT_COLUMNS: &str = "id, tenant_id, lot_code, phase, status, volume, parent_lot_id, \
     split_ratio, is_blend_result, recipe_id, recipe_name, style, yeast_strain, contributions, \
     created_at, created_by, updated_at, updated_by";

const ASSIGNMENT_COLUMNS: &str = "id, tenant_id, tank_id, lot_id, batch_id, phase, \
     planned_start, planned_end, actual_start, actual_end, status, planned_volume, \
     is_blend_target, is_split_source, blend_base, notes, created_at, created_by, updated_at, \
     updated_by";

const TRANSFER_COLUMNS: &str = "id, tenant_id, batch_id, source_lot_id, source_tank_id, \
     destination_lot_id, destination_tank_id, transfer_type, volume, loss, status, executed_at, \
     notes, created_at, created_by, updated_at, updated_by";

fn user_uuid(user: &Option<UserId>) -> Option<Uuid> {
    user.as_ref().map(|u| u.0)
}

#[async_trait]
impl TankRepository for TxTankRepository {
    async fn find_by_id(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, TankRow>(&format!(
            "SELECT {} FROM tanks WHERE id = $1 AND tenant_id = $2",
            TANK_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TankRow::into_tank).transpose()
    }

    async fn find_by_ids(&self, ids: &[TankId], tenant_id: &TenantId) -> AppResult<Vec<Tank>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let uuids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, TankRow>(&format!(
            "SELECT {} FROM tanks WHERE id = ANY($1) AND tenant_id = $2 ORDER BY name",
            TANK_COLUMNS
        ))
        .bind(&uuids)
        .bind(tenant_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TankRow::into_tank).collect()
    }

    async fn lock(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, TankRow>(&format!(
            "SELECT {} FROM tanks WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
            TANK_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TankRow::into_tank).transpose()
    }

    async fn list_by_capability(
        &self,
        phase: BatchPhase,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Tank>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, TankRow>(&format!(
            "SELECT {} FROM tanks WHERE tenant_id = $1 AND $2 = ANY(capabilities) ORDER BY name",
            TANK_COLUMNS
        ))
        .bind(tenant_id.0)
        .bind(phase.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TankRow::into_tank).collect()
    }

    async fn update(&self, tank: &Tank) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            r#"
            UPDATE tanks
            SET status = $3, capabilities = $4, needs_cip = $5, updated_at = $6, updated_by = $7
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(tank.id.0)
        .bind(tank.tenant_id.0)
        .bind(tank.status.as_str())
        .bind(capabilities_column(tank))
        .bind(tank.needs_cip)
        .bind(tank.audit_info.updated_at)
        .bind(user_uuid(&tank.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Tank {} not found", tank.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl BatchRepository for TxBatchRepository {
    async fn find_by_id(&self, id: &BatchId, tenant_id: &TenantId) -> AppResult<Option<Batch>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1 AND tenant_id = $2",
            BATCH_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(BatchRow::into_batch).transpose()
    }

    async fn update(&self, batch: &Batch) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            r#"
            UPDATE batches
            SET volume = $3, phase = $4, brewed_at = $5, updated_at = $6, updated_by = $7
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(batch.id.0)
        .bind(batch.tenant_id.0)
        .bind(batch.volume.as_liters())
        .bind(batch.phase.as_str())
        .bind(batch.brewed_at)
        .bind(batch.audit_info.updated_at)
        .bind(user_uuid(&batch.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Batch {} not found", batch.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl LotRepository for TxLotRepository {
    async fn find_by_id(&self, id: &LotId, tenant_id: &TenantId) -> AppResult<Option<Lot>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE id = $1 AND tenant_id = $2",
            LOT_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(LotRow::into_lot).transpose()
    }

    async fn save(&self, lot: &Lot) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            r#"
            INSERT INTO lots (id, tenant_id, lot_code, phase, status, volume, parent_lot_id,
                              split_ratio, is_blend_result, recipe_id, recipe_name, style,
                              yeast_strain, contributions, created_at, created_by, updated_at, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(lot.id.0)
        .bind(lot.tenant_id.0)
        .bind(&lot.lot_code)
        .bind(lot.phase.as_str())
        .bind(lot.status.as_str())
        .bind(lot.volume.as_liters())
        .bind(lot.parent_lot_id.map(|id| id.0))
        .bind(lot.split_ratio)
        .bind(lot.is_blend_result)
        .bind(lot.profile.recipe_id.map(|id| id.0))
        .bind(&lot.profile.recipe_name)
        .bind(&lot.profile.style)
        .bind(&lot.profile.yeast_strain)
        .bind(contributions_column(lot))
        .bind(lot.created_at)
        .bind(user_uuid(&lot.audit_info.created_by))
        .bind(lot.audit_info.updated_at)
        .bind(user_uuid(&lot.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, lot: &Lot) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            r#"
            UPDATE lots
            SET phase = $3, status = $4, volume = $5, is_blend_result = $6, contributions = $7,
                updated_at = $8, updated_by = $9
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(lot.id.0)
        .bind(lot.tenant_id.0)
        .bind(lot.phase.as_str())
        .bind(lot.status.as_str())
        .bind(lot.volume.as_liters())
        .bind(lot.is_blend_result)
        .bind(contributions_column(lot))
        .bind(lot.audit_info.updated_at)
        .bind(user_uuid(&lot.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Lot {} not found", lot.id)));
        }
        Ok(())
    }

    async fn find_open_by_batch(
        &self,
        batch_id: &BatchId,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        // 贡献列表以 JSONB 存储，用包含运算符匹配批次
        let probe = serde_json::json!([{ "batch_id": batch_id.0 }]);
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots \
             WHERE tenant_id = $1 AND contributions @> $2::jsonb \
               AND status IN ('PLANNED', 'ACTIVE') \
             ORDER BY created_at, lot_code",
            LOT_COLUMNS
        ))
        .bind(tenant_id.0)
        .bind(Json(probe))
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LotRow::into_lot).collect()
    }

    async fn list_open(
        &self,
        phase: Option<BatchPhase>,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots \
             WHERE tenant_id = $1 AND status IN ('PLANNED', 'ACTIVE') \
               AND ($2::text IS NULL OR phase = $2) \
             ORDER BY lot_code",
            LOT_COLUMNS
        ))
        .bind(tenant_id.0)
        .bind(phase.map(|p| p.as_str()))
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LotRow::into_lot).collect()
    }

    async fn add_reading(
        &self,
        lot_id: &LotId,
        tenant_id: &TenantId,
        readings: &Readings,
        recorded_by: Option<UserId>,
    ) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            r#"
            INSERT INTO lot_readings (id, tenant_id, lot_id, gravity, temperature_c, recorded_at, recorded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(tenant_id.0)
        .bind(lot_id.0)
        .bind(readings.gravity)
        .bind(readings.temperature_c)
        .bind(chrono::Utc::now())
        .bind(user_uuid(&recorded_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_readings(&self, lot_id: &LotId, tenant_id: &TenantId) -> AppResult<Vec<Readings>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, ReadingRow>(
            r#"
            SELECT gravity, temperature_c FROM lot_readings
            WHERE lot_id = $1 AND tenant_id = $2
            ORDER BY recorded_at
            "#,
        )
        .bind(lot_id.0)
        .bind(tenant_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Readings::from).collect())
    }
}

#[async_trait]
impl TankAssignmentRepository for TxTankAssignmentRepository {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
        tenant_id: &TenantId,
    ) -> AppResult<Option<TankAssignment>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM tank_assignments WHERE id = $1 AND tenant_id = $2",
            ASSIGNMENT_COLUMNS
        ))
        .bind(id.0)
        .bind(tenant_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn save(&self, assignment: &TankAssignment) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            r#"
            INSERT INTO tank_assignments (id, tenant_id, tank_id, lot_id, batch_id, phase,
                                          planned_start, planned_end, actual_start, actual_end,
                                          status, planned_volume, is_blend_target, is_split_source,
                                          blend_base, notes, created_at, created_by, updated_at,
                                          updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                    $19, $20)
            "#,
        )
        .bind(assignment.id.0)
        .bind(assignment.tenant_id.0)
        .bind(assignment.tank_id.0)
        .bind(assignment.lot_id.0)
        .bind(assignment.batch_id.0)
        .bind(assignment.phase.as_str())
        .bind(assignment.window.start())
        .bind(assignment.window.end())
        .bind(assignment.actual_start)
        .bind(assignment.actual_end)
        .bind(assignment.status.as_str())
        .bind(assignment.planned_volume.as_liters())
        .bind(assignment.is_blend_target)
        .bind(assignment.is_split_source)
        .bind(blend_base_column(assignment))
        .bind(&assignment.notes)
        .bind(assignment.audit_info.created_at)
        .bind(user_uuid(&assignment.audit_info.created_by))
        .bind(assignment.audit_info.updated_at)
        .bind(user_uuid(&assignment.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, assignment: &TankAssignment) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let result = sqlx::query(
            r#"
            UPDATE tank_assignments
            SET planned_start = $3, planned_end = $4, actual_start = $5, actual_end = $6,
                status = $7, planned_volume = $8, is_blend_target = $9, is_split_source = $10,
                blend_base = $11, notes = $12, updated_at = $13, updated_by = $14
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(assignment.id.0)
        .bind(assignment.tenant_id.0)
        .bind(assignment.window.start())
        .bind(assignment.window.end())
        .bind(assignment.actual_start)
        .bind(assignment.actual_end)
        .bind(assignment.status.as_str())
        .bind(assignment.planned_volume.as_liters())
        .bind(assignment.is_blend_target)
        .bind(assignment.is_split_source)
        .bind(blend_base_column(assignment))
        .bind(&assignment.notes)
        .bind(assignment.audit_info.updated_at)
        .bind(user_uuid(&assignment.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Assignment {} not found",
                assignment.id
            )));
        }
        Ok(())
    }

    async fn find_by_lot(&self, lot_id: &LotId, tenant_id: &TenantId) -> AppResult<Vec<TankAssignment>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM tank_assignments WHERE lot_id = $1 AND tenant_id = $2 \
             ORDER BY planned_start",
            ASSIGNMENT_COLUMNS
        ))
        .bind(lot_id.0)
        .bind(tenant_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AssignmentRow::into_assignment).collect()
    }

    async fn find_open_by_tanks(
        &self,
        tank_ids: &[TankId],
        tenant_id: &TenantId,
    ) -> AppResult<Vec<TankAssignment>> {
        if tank_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let uuids: Vec<Uuid> = tank_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM tank_assignments \
             WHERE tank_id = ANY($1) AND tenant_id = $2 AND status IN ('PLANNED', 'ACTIVE') \
             ORDER BY planned_start",
            ASSIGNMENT_COLUMNS
        ))
        .bind(&uuids)
        .bind(tenant_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AssignmentRow::into_assignment).collect()
    }
}

#[async_trait]
impl TransferRepository for TxTransferRepository {
    async fn save(&self, transfer: &Transfer) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        sqlx::query(
            r#"
            INSERT INTO transfers (id, tenant_id, batch_id, source_lot_id, source_tank_id,
                                   destination_lot_id, destination_tank_id, transfer_type, volume,
                                   loss, status, executed_at, notes, created_at, created_by,
                                   updated_at, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(transfer.id.0)
        .bind(transfer.tenant_id.0)
        .bind(transfer.batch_id.0)
        .bind(transfer.source_lot_id.map(|id| id.0))
        .bind(transfer.source_tank_id.map(|id| id.0))
        .bind(transfer.destination_lot_id.0)
        .bind(transfer.destination_tank_id.0)
        .bind(transfer.transfer_type.as_str())
        .bind(transfer.volume.as_liters())
        .bind(transfer.loss.as_liters())
        .bind(transfer.status.as_str())
        .bind(transfer.executed_at)
        .bind(&transfer.notes)
        .bind(transfer.audit_info.created_at)
        .bind(user_uuid(&transfer.audit_info.created_by))
        .bind(transfer.audit_info.updated_at)
        .bind(user_uuid(&transfer.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, transfer: &Transfer) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        // 已完成的转罐记录不可修改
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $3, executed_at = $4, loss = $5, notes = $6, updated_at = $7, updated_by = $8
            WHERE id = $1 AND tenant_id = $2 AND status = 'PLANNED'
            "#,
        )
        .bind(transfer.id.0)
        .bind(transfer.tenant_id.0)
        .bind(transfer.status.as_str())
        .bind(transfer.executed_at)
        .bind(transfer.loss.as_liters())
        .bind(&transfer.notes)
        .bind(transfer.audit_info.updated_at)
        .bind(user_uuid(&transfer.audit_info.updated_by))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Transfer {} is no longer planned",
                transfer.id
            )));
        }
        Ok(())
    }

    async fn find_by_batch(&self, batch_id: &BatchId, tenant_id: &TenantId) -> AppResult<Vec<Transfer>> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE batch_id = $1 AND tenant_id = $2 ORDER BY created_at",
            TRANSFER_COLUMNS
        ))
        .bind(batch_id.0)
        .bind(tenant_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }
}
