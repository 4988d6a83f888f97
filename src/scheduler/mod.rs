pub mod conflict;
pub mod error;
pub mod greedy;
pub mod plan;
pub mod ranking;
pub mod reallocation;
pub mod state;
pub mod summary;


pub use conflict::{LoadMetric, PenaltyMode, ScoreWeights};
pub use error::SchedulerError;
pub use greedy::Scheduler;
pub use plan::{Allocation, Assignment, Plan, PlanFile, WindowFit};
pub use ranking::RankingMethod;
pub use state::AntennaId;
pub use summary::RunSummary;
