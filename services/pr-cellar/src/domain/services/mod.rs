//! 领域服务

pub mod availability;
pub mod planner;
pub mod tank_registry;

pub use availability::{check_availability, first_conflict};
pub use planner::*;
pub use tank_registry::{filter_candidates, CandidateFilter, TankSnapshot};
