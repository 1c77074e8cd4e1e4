//! 罐实体

use std::collections::BTreeSet;

use brewops_domain_core::{
    AggregateRoot, AuditInfo, Entity, TenantId, TenantOwned, UserId, Volume,
};
use serde::{Deserialize, Serialize};

use crate::domain::enums::{BatchPhase, TankStatus, TankType};
use crate::domain::value_objects::TankId;
use crate::error::AllocationError;

/// 罐（容器）
///
/// 阶段能力是显式集合，不从罐名推断。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    pub id: TankId,
    pub tenant_id: TenantId,
    pub name: String,
    pub tank_type: TankType,
    pub capacity: Volume,
    pub status: TankStatus,
    pub capabilities: BTreeSet<BatchPhase>,
    pub needs_cip: bool,
    pub audit_info: AuditInfo,
}

impl Tank {
    /// 创建罐，`capabilities` 为空时使用罐型默认能力
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        tank_type: TankType,
        capacity: Volume,
        capabilities: Option<BTreeSet<BatchPhase>>,
    ) -> Result<Self, AllocationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AllocationError::validation("tank name must not be empty"));
        }
        if !capacity.is_valid_quantity() {
            return Err(AllocationError::validation(format!(
                "tank {} capacity must be positive",
                name
            )));
        }

        let capabilities = capabilities.unwrap_or_else(|| tank_type.default_capabilities());
        Self::check_capabilities(tank_type, &capabilities)?;

        Ok(Self {
            id: TankId::new(),
            tenant_id,
            name,
            tank_type,
            capacity,
            status: TankStatus::Available,
            capabilities,
            needs_cip: false,
            audit_info: AuditInfo::default(),
        })
    }

    fn check_capabilities(
        tank_type: TankType,
        capabilities: &BTreeSet<BatchPhase>,
    ) -> Result<(), AllocationError> {
        let permitted = tank_type.permitted_capabilities();
        match capabilities.iter().find(|phase| !permitted.contains(phase)) {
            Some(phase) => Err(AllocationError::validation(format!(
                "a {} cannot host {}",
                tank_type, phase
            ))),
            None => Ok(()),
        }
    }

    pub fn supports(&self, phase: BatchPhase) -> bool {
        self.capabilities.contains(&phase)
    }

    /// 清洗或维修中
    pub fn is_out_of_service(&self) -> bool {
        matches!(self.status, TankStatus::Cleaning | TankStatus::Maintenance)
    }

    /// 能否开始承载酒液
    pub fn ensure_ready_to_fill(&self) -> Result<(), AllocationError> {
        if self.status == TankStatus::Maintenance {
            return Err(AllocationError::invalid_state(format!(
                "tank {} is under maintenance",
                self.name
            )));
        }
        if self.status == TankStatus::Cleaning || self.needs_cip {
            return Err(AllocationError::invalid_state(format!(
                "tank {} must complete CIP before it can be filled",
                self.name
            )));
        }
        Ok(())
    }

    pub fn occupy(&mut self, user_id: Option<UserId>) {
        self.status = TankStatus::Occupied;
        self.touch(user_id);
    }

    /// 排空后进入清洗
    pub fn release_for_cleaning(&mut self, user_id: Option<UserId>) {
        self.status = TankStatus::Cleaning;
        self.needs_cip = true;
        self.touch(user_id);
    }

    /// CIP 完成
    pub fn complete_cip(&mut self, user_id: Option<UserId>) -> Result<(), AllocationError> {
        if self.status != TankStatus::Cleaning {
            return Err(AllocationError::invalid_state(format!(
                "tank {} is {} and not awaiting CIP",
                self.name, self.status
            )));
        }
        self.status = TankStatus::Available;
        self.needs_cip = false;
        self.touch(user_id);
        Ok(())
    }
}

impl Entity for Tank {
    type Id = TankId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Tank {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl AggregateRoot for Tank {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}
