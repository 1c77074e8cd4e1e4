//! 值对象

mod blending;
mod ids;
mod readings;
mod time_window;

pub use blending::*;
pub use ids::*;
pub use readings::*;
pub use time_window::*;
