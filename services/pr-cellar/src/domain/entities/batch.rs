//! 批次实体

use brewops_domain_core::{
    AggregateRoot, AuditInfo, Entity, TenantId, TenantOwned, UserId, Volume,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::BatchPhase;
use crate::domain::value_objects::{BatchId, RecipeId};
use crate::error::AllocationError;

/// 批次（一次酿造）
///
/// 离开 BREWING 后体积不可再修改，之后只有阶段和占罐会变化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub tenant_id: TenantId,
    pub batch_number: String,
    pub recipe_id: Option<RecipeId>,
    pub recipe_name: String,
    pub style: Option<String>,
    pub yeast_strain: Option<String>,
    pub volume: Volume,
    pub phase: BatchPhase,
    pub brewed_at: Option<DateTime<Utc>>,
    pub audit_info: AuditInfo,
}

impl Batch {
    pub fn new(
        tenant_id: TenantId,
        batch_number: impl Into<String>,
        recipe_name: impl Into<String>,
        volume: Volume,
    ) -> Self {
        Self {
            id: BatchId::new(),
            tenant_id,
            batch_number: batch_number.into(),
            recipe_id: None,
            recipe_name: recipe_name.into(),
            style: None,
            yeast_strain: None,
            volume,
            phase: BatchPhase::Planned,
            brewed_at: None,
            audit_info: AuditInfo::default(),
        }
    }

    pub fn with_recipe(mut self, recipe_id: RecipeId) -> Self {
        self.recipe_id = Some(recipe_id);
        self
    }

    pub fn with_yeast(mut self, yeast_strain: impl Into<String>) -> Self {
        self.yeast_strain = Some(yeast_strain.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn is_volume_locked(&self) -> bool {
        !matches!(self.phase, BatchPhase::Planned | BatchPhase::Brewing)
    }

    /// 记录出锅实测体积
    pub fn set_measured_volume(
        &mut self,
        volume: Volume,
        user_id: Option<UserId>,
    ) -> Result<(), AllocationError> {
        if self.is_volume_locked() {
            return Err(AllocationError::validation(format!(
                "batch {} volume is locked once brewing has completed",
                self.batch_number
            )));
        }
        if !volume.is_valid_quantity() {
            return Err(AllocationError::validation("measured volume must be positive"));
        }
        self.volume = volume;
        self.touch(user_id);
        Ok(())
    }

    /// 前进一个阶段或取消
    pub fn transition_to(
        &mut self,
        to: BatchPhase,
        user_id: Option<UserId>,
    ) -> Result<(), AllocationError> {
        if !self.phase.can_transition_to(to) {
            return Err(AllocationError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        if to == BatchPhase::Brewing && self.brewed_at.is_none() {
            self.brewed_at = Some(Utc::now());
        }
        self.phase = to;
        self.touch(user_id);
        Ok(())
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Batch {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl AggregateRoot for Batch {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}
