//! pr-cellar - 酒窖罐位与酒批分配服务
//!
//! 为批次规划发酵罐/清酒罐的占用，执行阶段转罐，并保证体积守恒、
//! 罐容量与时间窗互斥。

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
