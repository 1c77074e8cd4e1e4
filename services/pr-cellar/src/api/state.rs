//! 路由共享状态

use std::sync::Arc;

use crate::application::{CellarQueryService, TransferOrchestrator};
use crate::config::PlanningPolicy;
use crate::domain::unit_of_work::UnitOfWorkFactory;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransferOrchestrator>,
    pub queries: Arc<CellarQueryService>,
}

impl AppState {
    /// 命令与查询共用同一个 Unit of Work 工厂和规划策略
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, policy: PlanningPolicy) -> Self {
        Self {
            orchestrator: Arc::new(TransferOrchestrator::new(uow_factory.clone(), policy.clone())),
            queries: Arc::new(CellarQueryService::new(uow_factory, policy)),
        }
    }
}
