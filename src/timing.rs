//! Timing rules shared by the builder, the scheduler, the annealer and the
//! validator. All timestamps are UNIX seconds.

pub type Timestamp = i64;

/// Shortest task an antenna may be given, and the shortest usable window.
pub const MIN_TASK_DURATION: i64 = 300;
/// Idle time between two tasks of the same satellite on one antenna.
pub const SAME_SATELLITE_GAP: i64 = 300;
/// Idle time between tasks of different satellites on one antenna.
pub const CROSS_SATELLITE_GAP: i64 = 600;
/// How far back the reallocation search looks from a failing pass.
pub const REALLOCATION_HORIZON: i64 = 600;
pub const MAX_ANTENNAS_PER_STATION: usize = 20;

pub fn required_gap(previous_satellite: &str, next_satellite: &str) -> i64 {
    if previous_satellite == next_satellite {
        SAME_SATELLITE_GAP
    } else {
        CROSS_SATELLITE_GAP
    }
}
