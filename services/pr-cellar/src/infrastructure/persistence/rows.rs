//! 数据库行结构与领域实体之间的转换

use std::collections::BTreeSet;
use std::str::FromStr;

use brewops_common::{AuditInfo, TenantId, UserId};
use brewops_domain_core::Volume;
use brewops_errors::AppResult;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::error_mapper::map_decode_error;
use crate::domain::entities::{
    Batch, BlendBase, Lot, LotContribution, LotProfile, Tank, TankAssignment, Transfer,
};
use crate::domain::value_objects::{
    AssignmentId, BatchId, LotId, Readings, RecipeId, TankId, TimeWindow, TransferId,
};

fn parse<T>(column: &str, value: &str) -> AppResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|e: String| map_decode_error(column, e))
}

fn audit(
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
) -> AuditInfo {
    AuditInfo {
        created_at,
        created_by: created_by.map(UserId::from_uuid),
        updated_at,
        updated_by: updated_by.map(UserId::from_uuid),
    }
}

#[derive(sqlx::FromRow)]
pub struct TankRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    tank_type: String,
    capacity: f64,
    status: String,
    capabilities: Vec<String>,
    needs_cip: bool,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl TankRow {
    pub fn into_tank(self) -> AppResult<Tank> {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| parse("capabilities", c))
            .collect::<AppResult<BTreeSet<_>>>()?;
        Ok(Tank {
            id: TankId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            name: self.name,
            tank_type: parse("tank_type", &self.tank_type)?,
            capacity: Volume::liters(self.capacity),
            status: parse("status", &self.status)?,
            capabilities,
            needs_cip: self.needs_cip,
            audit_info: audit(self.created_at, self.created_by, self.updated_at, self.updated_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct BatchRow {
    id: Uuid,
    tenant_id: Uuid,
    batch_number: String,
    recipe_id: Option<Uuid>,
    recipe_name: String,
    style: Option<String>,
    yeast_strain: Option<String>,
    volume: f64,
    phase: String,
    brewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl BatchRow {
    pub fn into_batch(self) -> AppResult<Batch> {
        Ok(Batch {
            id: BatchId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            batch_number: self.batch_number,
            recipe_id: self.recipe_id.map(RecipeId::from_uuid),
            recipe_name: self.recipe_name,
            style: self.style,
            yeast_strain: self.yeast_strain,
            volume: Volume::liters(self.volume),
            phase: parse("phase", &self.phase)?,
            brewed_at: self.brewed_at,
            audit_info: audit(self.created_at, self.created_by, self.updated_at, self.updated_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct LotRow {
    id: Uuid,
    tenant_id: Uuid,
    lot_code: String,
    phase: String,
    status: String,
    volume: f64,
    parent_lot_id: Option<Uuid>,
    split_ratio: Option<f64>,
    is_blend_result: bool,
    recipe_id: Option<Uuid>,
    recipe_name: String,
    style: Option<String>,
    yeast_strain: Option<String>,
    contributions: Json<Vec<LotContribution>>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl LotRow {
    pub fn into_lot(self) -> AppResult<Lot> {
        Ok(Lot {
            id: LotId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            lot_code: self.lot_code,
            phase: parse("phase", &self.phase)?,
            status: parse("status", &self.status)?,
            volume: Volume::liters(self.volume),
            parent_lot_id: self.parent_lot_id.map(LotId::from_uuid),
            split_ratio: self.split_ratio,
            is_blend_result: self.is_blend_result,
            profile: LotProfile {
                recipe_id: self.recipe_id.map(RecipeId::from_uuid),
                recipe_name: self.recipe_name,
                style: self.style,
                yeast_strain: self.yeast_strain,
            },
            contributions: self.contributions.0,
            created_at: self.created_at,
            audit_info: audit(self.created_at, self.created_by, self.updated_at, self.updated_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AssignmentRow {
    id: Uuid,
    tenant_id: Uuid,
    tank_id: Uuid,
    lot_id: Uuid,
    batch_id: Uuid,
    phase: String,
    planned_start: DateTime<Utc>,
    planned_end: DateTime<Utc>,
    actual_start: Option<DateTime<Utc>>,
    actual_end: Option<DateTime<Utc>>,
    status: String,
    planned_volume: f64,
    is_blend_target: bool,
    is_split_source: bool,
    blend_base: Option<Json<BlendBase>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl AssignmentRow {
    pub fn into_assignment(self) -> AppResult<TankAssignment> {
        let window = TimeWindow::new(self.planned_start, self.planned_end)
            .map_err(|e| map_decode_error("planned_end", e))?;
        Ok(TankAssignment {
            id: AssignmentId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            tank_id: TankId::from_uuid(self.tank_id),
            lot_id: LotId::from_uuid(self.lot_id),
            batch_id: BatchId::from_uuid(self.batch_id),
            phase: parse("phase", &self.phase)?,
            window,
            actual_start: self.actual_start,
            actual_end: self.actual_end,
            status: parse("status", &self.status)?,
            planned_volume: Volume::liters(self.planned_volume),
            is_blend_target: self.is_blend_target,
            is_split_source: self.is_split_source,
            blend_base: self.blend_base.map(|base| base.0),
            notes: self.notes,
            audit_info: audit(self.created_at, self.created_by, self.updated_at, self.updated_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct TransferRow {
    id: Uuid,
    tenant_id: Uuid,
    batch_id: Uuid,
    source_lot_id: Option<Uuid>,
    source_tank_id: Option<Uuid>,
    destination_lot_id: Uuid,
    destination_tank_id: Uuid,
    transfer_type: String,
    volume: f64,
    loss: f64,
    status: String,
    executed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl TransferRow {
    pub fn into_transfer(self) -> AppResult<Transfer> {
        Ok(Transfer {
            id: TransferId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            batch_id: BatchId::from_uuid(self.batch_id),
            source_lot_id: self.source_lot_id.map(LotId::from_uuid),
            source_tank_id: self.source_tank_id.map(TankId::from_uuid),
            destination_lot_id: LotId::from_uuid(self.destination_lot_id),
            destination_tank_id: TankId::from_uuid(self.destination_tank_id),
            transfer_type: parse("transfer_type", &self.transfer_type)?,
            volume: Volume::liters(self.volume),
            loss: Volume::liters(self.loss),
            status: parse("status", &self.status)?,
            executed_at: self.executed_at,
            notes: self.notes,
            audit_info: audit(self.created_at, self.created_by, self.updated_at, self.updated_by),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct ReadingRow {
    gravity: Option<f64>,
    temperature_c: Option<f64>,
}

impl From<ReadingRow> for Readings {
    fn from(row: ReadingRow) -> Self {
        Readings {
            gravity: row.gravity,
            temperature_c: row.temperature_c,
        }
    }
}

/// 能力集合按字符串数组存储
pub fn capabilities_column(tank: &Tank) -> Vec<String> {
    tank.capabilities.iter().map(|p| p.as_str().to_string()).collect()
}

pub fn contributions_column(lot: &Lot) -> Json<Vec<LotContribution>> {
    Json(lot.contributions.clone())
}

pub fn blend_base_column(assignment: &TankAssignment) -> Option<Json<BlendBase>> {
    assignment.blend_base.clone().map(Json)
}
