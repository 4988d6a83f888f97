use std::fmt;

use serde::Serialize;
use strum_macros::Display;

use crate::dataset::PassKey;
use crate::scheduler::AntennaId;
use crate::timing::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DurationIssue {
    TooShort { duration: i64 },
    OutsideWindow { window_start: Timestamp, window_end: Timestamp },
    /// The pass has no usable window at the assigned station.
    NoWindow,
    /// Only sub-minimum records exist for the pass at the assigned station.
    ShortRecordAssigned { longest_record: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationViolation {
    pub pass: PassKey,
    pub station: String,
    pub antenna: AntennaId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub issue: DurationIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationCheck {
    pub assignments: usize,
    pub total_records: usize,
    pub short_records: usize,
    pub correctly_rejected: usize,
    pub anomalies: usize,
    pub violations: Vec<DurationViolation>,
    /// Percentage of assignments without a duration violation.
    pub pass_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpacingIssue {
    Overlap,
    GapTooShort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingViolation {
    pub station: String,
    pub antenna: AntennaId,
    pub previous: PassKey,
    pub next: PassKey,
    pub previous_end: Timestamp,
    pub next_start: Timestamp,
    /// Negative for overlaps.
    pub measured_gap: i64,
    pub required_gap: i64,
    pub issue: SpacingIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingCheck {
    pub antennas: usize,
    pub pairs: usize,
    pub overlaps: usize,
    pub gap_conflicts: usize,
    pub violations: Vec<SpacingViolation>,
    /// Percentage of consecutive pairs without a violation.
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub duration: DurationCheck,
    pub spacing: SpacingCheck,
}

impl ValidationReport {
    pub fn violation_count(&self) -> usize {
        self.duration.violations.len() + self.spacing.violations.len()
    }

    pub fn is_clean(&self) -> bool {
        self.violation_count() == 0
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.duration;
        writeln!(f, "Duration check: {:.1}% passed", d.pass_rate)?;
        writeln!(
            f,
            "  {} assignments, {} raw records ({} short, {} correctly rejected, {} anomalies)",
            d.assignments, d.total_records, d.short_records, d.correctly_rejected, d.anomalies
        )?;
        for v in &d.violations {
            writeln!(
                f,
                "  ! {} at {} {} [{}, {}]: {}",
                v.pass, v.station, v.antenna, v.start, v.end, v.issue
            )?;
        }

        let s = &self.spacing;
        writeln!(f, "Spacing check: {:.1}% passed", s.pass_rate)?;
        writeln!(
            f,
            "  {} antennas, {} pairs ({} overlaps, {} gap conflicts)",
            s.antennas, s.pairs, s.overlaps, s.gap_conflicts
        )?;
        for v in &s.violations {
            writeln!(
                f,
                "  ! {} {}: {} -> {} gap {}s (required {}s): {}",
                v.station, v.antenna, v.previous, v.next, v.measured_gap, v.required_gap, v.issue
            )?;
        }
        Ok(())
    }
}
