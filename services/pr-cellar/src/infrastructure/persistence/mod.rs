//! 持久化层

pub mod error_mapper;
pub mod migrations;
pub mod rows;
pub mod tx_repositories;
pub mod unit_of_work;

pub use migrations::migrations;
pub use unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkFactory};
