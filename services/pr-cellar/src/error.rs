//! 排罐错误
//!
//! 每个变体都有稳定的错误码，API 层据此返回 problem+json。

use axum::response::{IntoResponse, Response};
use brewops_errors::{AppError, ProblemDetails};
use serde_json::json;
use thiserror::Error;

use crate::domain::enums::BatchPhase;
use crate::domain::value_objects::{BatchId, BlendRule, TankId};

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Split allocations do not add up to the batch volume (remainder {remainder}L)")]
    VolumeMismatch { remainder: f64 },

    #[error("Tank {tank_name} holds {capacity}L but {requested}L was requested")]
    CapacityExceeded {
        tank_id: TankId,
        tank_name: String,
        capacity: f64,
        requested: f64,
    },

    #[error("Tank {tank_id} is already booked for the requested window")]
    TankUnavailable { tank_id: TankId },

    #[error("Selection required: {0}")]
    SelectionRequired(String),

    #[error("Blend target is incompatible: {rule} rule failed")]
    BlendIncompatible { rule: BlendRule },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Batch {batch_id} already has an allocation for phase {phase}")]
    DuplicatePlan { batch_id: BatchId, phase: BatchPhase },

    #[error("Batch cannot move from {from} to {to}")]
    InvalidTransition { from: BatchPhase, to: BatchPhase },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(AppError),
}

impl AllocationError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::VolumeMismatch { .. } => "VOLUME_MISMATCH",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::TankUnavailable { .. } => "TANK_UNAVAILABLE",
            Self::SelectionRequired(_) => "SELECTION_REQUIRED",
            Self::BlendIncompatible { .. } => "BLEND_INCOMPATIBLE",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::DuplicatePlan { .. } => "DUPLICATE_PLAN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION",
            Self::Storage(AppError::Database(_)) => "STORAGE_UNAVAILABLE",
            Self::Storage(_) => "INTERNAL",
        }
    }

    /// 结构化详情，便于调用方定位具体失败的罐或规则
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::VolumeMismatch { remainder } => Some(json!({
                "remainder": remainder,
                "under_allocated": *remainder > 0.0,
            })),
            Self::CapacityExceeded {
                tank_id,
                tank_name,
                capacity,
                requested,
            } => Some(json!({
                "tank_id": tank_id,
                "tank_name": tank_name,
                "capacity": capacity,
                "requested": requested,
            })),
            Self::TankUnavailable { tank_id } => Some(json!({ "tank_id": tank_id })),
            Self::BlendIncompatible { rule } => Some(json!({ "rule": rule })),
            Self::DuplicatePlan { batch_id, phase } => Some(json!({
                "batch_id": batch_id,
                "phase": phase,
            })),
            Self::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            _ => None,
        }
    }

    /// 是否属于规划规则校验失败（用于指标）
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Self::VolumeMismatch { .. }
                | Self::CapacityExceeded { .. }
                | Self::TankUnavailable { .. }
                | Self::SelectionRequired(_)
                | Self::BlendIncompatible { .. }
        )
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let app_error = AppError::from(self.kind());
        let mut problem = app_error.to_problem_details().with_code(self.code());
        problem.detail = self.to_string();
        if matches!(self, Self::ConcurrentModification(_)) {
            problem.retryable = true;
        }
        match self.details() {
            Some(details) => problem.with_details(details),
            None => problem,
        }
    }

    /// 映射到对应的通用错误类别
    fn kind(&self) -> AllocationErrorKind {
        match self {
            Self::VolumeMismatch { .. }
            | Self::CapacityExceeded { .. }
            | Self::TankUnavailable { .. }
            | Self::BlendIncompatible { .. } => AllocationErrorKind::BusinessRule(self.to_string()),
            Self::SelectionRequired(_) | Self::Validation(_) => {
                AllocationErrorKind::Validation(self.to_string())
            }
            Self::ConcurrentModification(_)
            | Self::DuplicatePlan { .. }
            | Self::InvalidTransition { .. }
            | Self::InvalidState(_) => AllocationErrorKind::Conflict(self.to_string()),
            Self::NotFound(msg) => AllocationErrorKind::NotFound(msg.clone()),
            Self::Forbidden(msg) => AllocationErrorKind::Forbidden(msg.clone()),
            Self::Storage(AppError::Database(msg)) => AllocationErrorKind::Database(msg.clone()),
            Self::Storage(e) => AllocationErrorKind::Internal(e.to_string()),
        }
    }
}

enum AllocationErrorKind {
    BusinessRule(String),
    Validation(String),
    Conflict(String),
    NotFound(String),
    Forbidden(String),
    Database(String),
    Internal(String),
}

impl From<AllocationErrorKind> for AppError {
    fn from(kind: AllocationErrorKind) -> Self {
        match kind {
            AllocationErrorKind::BusinessRule(msg) => AppError::BusinessRule(msg),
            AllocationErrorKind::Validation(msg) => AppError::Validation(msg),
            AllocationErrorKind::Conflict(msg) => AppError::Conflict(msg),
            AllocationErrorKind::NotFound(msg) => AppError::NotFound(msg),
            AllocationErrorKind::Forbidden(msg) => AppError::Forbidden(msg),
            AllocationErrorKind::Database(msg) => AppError::Database(msg),
            AllocationErrorKind::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AppError> for AllocationError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Conflict(msg) => Self::ConcurrentModification(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Forbidden(msg) => Self::Forbidden(msg),
            AppError::Validation(msg) => Self::Validation(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(error: AllocationError) -> Self {
        match error {
            AllocationError::Storage(inner) => inner,
            other => other.kind().into(),
        }
    }
}

impl IntoResponse for AllocationError {
    fn into_response(self) -> Response {
        self.to_problem_details().into_response()
    }
}

pub type AllocationResult<T> = Result<T, AllocationError>;
