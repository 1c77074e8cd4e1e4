//! brewops-common - 通用类型和工具库

pub mod types;

pub use types::*;
