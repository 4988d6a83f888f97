pub mod neighbor;
pub mod objective;
pub mod occupancy;
pub mod optimizer;

pub use optimizer::{AnnealingStats, Annealer};
