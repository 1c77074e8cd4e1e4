//! 仓储接口

mod batch_repository;
mod lot_repository;
mod tank_assignment_repository;
mod tank_repository;
mod transfer_repository;

pub use batch_repository::BatchRepository;
pub use lot_repository::LotRepository;
pub use tank_assignment_repository::TankAssignmentRepository;
pub use tank_repository::TankRepository;
pub use transfer_repository::TransferRepository;
