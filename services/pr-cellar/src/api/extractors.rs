//! 请求上下文提取器

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use brewops_common::{TenantId, UserId};
use brewops_errors::AppError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// 租户与操作人
///
/// `x-tenant-id` 必填，`x-user-id` 可选。
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = header(parts, TENANT_HEADER)?
            .ok_or_else(|| AppError::unauthorized(format!("Missing {} header", TENANT_HEADER)))?;
        let tenant_id = tenant
            .parse::<TenantId>()
            .map_err(|_| AppError::validation(format!("Invalid {} header", TENANT_HEADER)))?;

        let user_id = match header(parts, USER_HEADER)? {
            Some(value) => Some(
                value
                    .parse::<UserId>()
                    .map_err(|_| AppError::validation(format!("Invalid {} header", USER_HEADER)))?,
            ),
            None => None,
        };

        Ok(Self { tenant_id, user_id })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    match parts.headers.get(name) {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| AppError::validation(format!("Invalid {} header", name))),
        None => Ok(None),
    }
}
