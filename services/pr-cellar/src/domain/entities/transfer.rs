//! 转罐记录
//!
//! 每次阶段转换的审计轨迹，执行后不可修改。

use brewops_domain_core::{
    AggregateRoot, AuditInfo, Entity, TenantId, TenantOwned, UserId, Volume,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::{TransferStatus, TransferType};
use crate::domain::value_objects::{BatchId, LotId, TankId, TransferId};
use crate::error::AllocationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub source_lot_id: Option<LotId>,
    pub source_tank_id: Option<TankId>,
    pub destination_lot_id: LotId,
    pub destination_tank_id: TankId,
    pub transfer_type: TransferType,
    pub volume: Volume,
    pub loss: Volume,
    pub status: TransferStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub audit_info: AuditInfo,
}

/// 一次酒液移动的起止
#[derive(Debug, Clone, Copy)]
pub struct TransferLeg {
    pub source_lot_id: Option<LotId>,
    pub source_tank_id: Option<TankId>,
    pub destination_lot_id: LotId,
    pub destination_tank_id: TankId,
}

impl Transfer {
    fn new(
        tenant_id: TenantId,
        batch_id: BatchId,
        leg: TransferLeg,
        transfer_type: TransferType,
        volume: Volume,
        loss: Volume,
        user_id: Option<UserId>,
    ) -> Self {
        Self {
            id: TransferId::new(),
            tenant_id,
            batch_id,
            source_lot_id: leg.source_lot_id,
            source_tank_id: leg.source_tank_id,
            destination_lot_id: leg.destination_lot_id,
            destination_tank_id: leg.destination_tank_id,
            transfer_type,
            volume,
            loss,
            status: TransferStatus::Planned,
            executed_at: None,
            notes: None,
            audit_info: AuditInfo::new(user_id),
        }
    }

    /// 计划中的转罐（预留）
    pub fn planned(
        tenant_id: TenantId,
        batch_id: BatchId,
        leg: TransferLeg,
        transfer_type: TransferType,
        volume: Volume,
        user_id: Option<UserId>,
    ) -> Self {
        Self::new(
            tenant_id,
            batch_id,
            leg,
            transfer_type,
            volume,
            Volume::ZERO,
            user_id,
        )
    }

    /// 已执行的转罐
    #[allow(clippy::too_many_arguments)]
    pub fn executed(
        tenant_id: TenantId,
        batch_id: BatchId,
        leg: TransferLeg,
        transfer_type: TransferType,
        volume: Volume,
        loss: Volume,
        at: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Self {
        let mut transfer = Self::new(
            tenant_id,
            batch_id,
            leg,
            transfer_type,
            volume,
            loss,
            user_id,
        );
        transfer.status = TransferStatus::Completed;
        transfer.executed_at = Some(at);
        transfer
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn complete(
        &mut self,
        at: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Result<(), AllocationError> {
        if self.status != TransferStatus::Planned {
            return Err(AllocationError::invalid_state(format!(
                "transfer {} is {} and immutable",
                self.id, self.status
            )));
        }
        self.status = TransferStatus::Completed;
        self.executed_at = Some(at);
        self.touch(user_id);
        Ok(())
    }

    pub fn cancel(&mut self, user_id: Option<UserId>) -> Result<(), AllocationError> {
        if self.status != TransferStatus::Planned {
            return Err(AllocationError::invalid_state(format!(
                "transfer {} is {} and immutable",
                self.id, self.status
            )));
        }
        self.status = TransferStatus::Cancelled;
        self.touch(user_id);
        Ok(())
    }
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Transfer {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl AggregateRoot for Transfer {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}
