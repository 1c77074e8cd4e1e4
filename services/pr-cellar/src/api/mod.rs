//! HTTP 接口层

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::router;
pub use state::AppState;
