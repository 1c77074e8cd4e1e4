//! 应用层

pub mod commands;
pub mod orchestrator;
pub mod queries;
pub mod query_service;
pub mod snapshot;
pub mod writer;

pub use commands::*;
pub use orchestrator::TransferOrchestrator;
pub use queries::*;
pub use query_service::CellarQueryService;
