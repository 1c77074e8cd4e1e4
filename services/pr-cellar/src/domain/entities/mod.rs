//! 领域实体

mod batch;
mod lot;
mod tank;
mod tank_assignment;
mod transfer;

pub use batch::*;
pub use lot::*;
pub use tank::*;
pub use tank_assignment::*;
pub use transfer::*;
