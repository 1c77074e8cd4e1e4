//! 实体基础 trait

use brewops_common::{AuditInfo, TenantId, UserId};

/// 有标识的领域对象
pub trait Entity {
    type Id;

    fn id(&self) -> &Self::Id;
}

/// 归属于某个租户的对象
///
/// 跨租户访问在业务上等同于对象不存在。
pub trait TenantOwned {
    fn tenant_id(&self) -> &TenantId;

    fn belongs_to(&self, tenant_id: &TenantId) -> bool {
        self.tenant_id() == tenant_id
    }
}

/// 聚合根：状态变化统一经 `touch` 记账
pub trait AggregateRoot: Entity + TenantOwned {
    fn audit_info(&self) -> &AuditInfo;
    fn audit_info_mut(&mut self) -> &mut AuditInfo;

    fn touch(&mut self, user_id: Option<UserId>) {
        self.audit_info_mut().update(user_id);
    }

    fn last_modified_by(&self) -> Option<UserId> {
        self.audit_info().updated_by
    }
}
