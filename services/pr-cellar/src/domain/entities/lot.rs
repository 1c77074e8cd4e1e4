//! 酒批实体
//!
//! 酒批是真正占罐的单位：可以由多个批次混合而成，也可以是一个批次分装后的一部分。

use brewops_domain_core::{
    AggregateRoot, AuditInfo, Entity, TenantId, TenantOwned, UserId, VOLUME_TOLERANCE, Volume,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::enums::{BatchPhase, LotStatus};
use crate::domain::value_objects::{BatchId, LotId, RecipeId};
use crate::error::AllocationError;

/// 批次对酒批的体积贡献
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotContribution {
    pub batch_id: BatchId,
    pub volume: Volume,
}

/// 酒批的来源描述（取自首个贡献批次）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LotProfile {
    pub recipe_id: Option<RecipeId>,
    pub recipe_name: String,
    pub style: Option<String>,
    pub yeast_strain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub tenant_id: TenantId,
    pub lot_code: String,
    pub phase: BatchPhase,
    pub status: LotStatus,
    pub volume: Volume,
    pub parent_lot_id: Option<LotId>,
    pub split_ratio: Option<f64>,
    pub is_blend_result: bool,
    pub profile: LotProfile,
    pub contributions: Vec<LotContribution>,
    pub created_at: DateTime<Utc>,
    pub audit_info: AuditInfo,
}

impl Lot {
    pub fn new(
        tenant_id: TenantId,
        lot_code: impl Into<String>,
        phase: BatchPhase,
        profile: LotProfile,
        contributions: Vec<LotContribution>,
        user_id: Option<UserId>,
    ) -> Self {
        let volume = contributions.iter().map(|c| c.volume).sum();
        let is_blend_result = contributions.len() > 1;
        let audit_info = AuditInfo::new(user_id);
        Self {
            id: LotId::new(),
            tenant_id,
            lot_code: lot_code.into(),
            phase,
            status: LotStatus::Planned,
            volume,
            parent_lot_id: None,
            split_ratio: None,
            is_blend_result,
            profile,
            contributions,
            created_at: audit_info.created_at,
            audit_info,
        }
    }

    /// 从父酒批按比例拆出子酒批
    pub fn split_child(&self, lot_code: impl Into<String>, volume: Volume) -> Lot {
        let ratio = volume.ratio_of(self.volume);
        let contributions = self
            .contributions
            .iter()
            .map(|c| LotContribution {
                batch_id: c.batch_id,
                volume: c.volume.scale(ratio),
            })
            .collect();

        let mut child = Lot::new(
            self.tenant_id,
            lot_code,
            self.phase,
            self.profile.clone(),
            contributions,
            self.audit_info.created_by,
        );
        child.volume = volume;
        child.status = self.status;
        child.parent_lot_id = Some(self.id);
        child.split_ratio = Some(ratio);
        child.is_blend_result = self.is_blend_result;
        child
    }

    pub fn contribution_total(&self) -> Volume {
        self.contributions.iter().map(|c| c.volume).sum()
    }

    /// 贡献之和与总体积在容差内一致
    pub fn is_conserved(&self) -> bool {
        self.contribution_total()
            .approx_eq(self.volume, VOLUME_TOLERANCE)
    }

    pub fn contains_batch(&self, batch_id: BatchId) -> bool {
        self.contributions.iter().any(|c| c.batch_id == batch_id)
    }

    pub fn batch_ids(&self) -> Vec<BatchId> {
        self.contributions.iter().map(|c| c.batch_id).collect()
    }

    /// 混入新批次
    pub fn blend_in(&mut self, incoming: &[LotContribution], user_id: Option<UserId>) {
        for contribution in incoming {
            match self
                .contributions
                .iter_mut()
                .find(|c| c.batch_id == contribution.batch_id)
            {
                Some(existing) => existing.volume += contribution.volume,
                None => self.contributions.push(*contribution),
            }
            self.volume += contribution.volume;
        }
        self.is_blend_result = self.contributions.len() > 1;
        self.touch(user_id);
    }

    /// 撤回某批次的贡献，返回撤回的体积
    pub fn withdraw(&mut self, batch_id: BatchId, user_id: Option<UserId>) -> Volume {
        let removed: Volume = self
            .contributions
            .iter()
            .filter(|c| c.batch_id == batch_id)
            .map(|c| c.volume)
            .sum();
        self.contributions.retain(|c| c.batch_id != batch_id);
        self.volume = (self.volume - removed).max(Volume::ZERO);
        self.is_blend_result = self.contributions.len() > 1;
        self.touch(user_id);
        removed
    }

    /// 转罐损耗后按比例缩减所有贡献
    pub fn rescale(&mut self, volume: Volume, user_id: Option<UserId>) {
        let ratio = volume.ratio_of(self.volume);
        for contribution in &mut self.contributions {
            contribution.volume = contribution.volume.scale(ratio);
        }
        self.volume = volume;
        self.touch(user_id);
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn activate(&mut self, user_id: Option<UserId>) {
        if self.status == LotStatus::Planned {
            self.status = LotStatus::Active;
            self.touch(user_id);
        }
    }

    pub fn advance_to(&mut self, phase: BatchPhase, user_id: Option<UserId>) {
        self.phase = phase;
        self.touch(user_id);
    }

    pub fn complete(&mut self, user_id: Option<UserId>) {
        self.status = LotStatus::Completed;
        self.touch(user_id);
    }

    pub fn cancel(&mut self, user_id: Option<UserId>) -> Result<(), AllocationError> {
        if !self.is_open() {
            return Err(AllocationError::invalid_state(format!(
                "lot {} is already {}",
                self.lot_code, self.status
            )));
        }
        self.status = LotStatus::Cancelled;
        self.touch(user_id);
        Ok(())
    }
}

impl Entity for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantOwned for Lot {
    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}

impl AggregateRoot for Lot {
    fn audit_info(&self) -> &AuditInfo {
        &self.audit_info
    }

    fn audit_info_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit_info
    }
}
