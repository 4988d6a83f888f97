//! Read-only audit of a plan against the timing rules.

pub mod report;

pub use report::{
    DurationCheck, DurationIssue, DurationViolation, SpacingCheck, SpacingIssue,
    SpacingViolation, ValidationReport,
};

use crate::dataset::Availability;
use crate::scheduler::Plan;
use crate::timing::{required_gap, MIN_TASK_DURATION};

pub fn validate_plan(availability: &Availability, plan: &Plan) -> ValidationReport {
    let report = ValidationReport {
        duration: check_durations(availability, plan),
        spacing: check_spacing(availability, plan),
    };
    if report.is_clean() {
        log::info!("Validation passed");
    } else {
        log::warn!("Validation found {} violations", report.violation_count());
    }
    report
}

fn percent(good: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        good as f64 / total as f64 * 100.0
    }
}

fn check_durations(availability: &Availability, plan: &Plan) -> DurationCheck {
    let mut violations = Vec::new();
    let mut failing_assignments = 0;
    let mut anomalous_records = 0;

    let assignments = plan.sorted_by_start();
    for a in &assignments {
        let pass = availability.pass(a.pass);
        let violation = |issue| DurationViolation {
            pass: pass.key.clone(),
            station: availability.station(a.station).name.clone(),
            antenna: a.antenna,
            start: a.start,
            end: a.end,
            issue,
        };
        let before = violations.len();

        match pass.window(a.station) {
            Some(window) => {
                if a.duration() < MIN_TASK_DURATION {
                    violations.push(violation(DurationIssue::TooShort {
                        duration: a.duration(),
                    }));
                }
                if !window.contains(a.start, a.end) {
                    violations.push(violation(DurationIssue::OutsideWindow {
                        window_start: window.start,
                        window_end: window.end,
                    }));
                }
            }
            None => {
                let short: Vec<i64> = availability
                    .short_records
                    .iter()
                    .filter(|r| r.pass == a.pass && r.station == a.station)
                    .map(|r| r.end - r.start)
                    .collect();
                match short.iter().max() {
                    Some(&longest_record) => {
                        anomalous_records += short.len();
                        violations.push(violation(DurationIssue::ShortRecordAssigned {
                            longest_record,
                        }));
                    }
                    None => violations.push(violation(DurationIssue::NoWindow)),
                }
            }
        }

        if violations.len() > before {
            failing_assignments += 1;
        }
    }

    let anomalies = violations
        .iter()
        .filter(|v| matches!(v.issue, DurationIssue::ShortRecordAssigned { .. }))
        .count();
    let short_records = availability.short_records.len();
    DurationCheck {
        assignments: assignments.len(),
        total_records: availability.stats.total_records,
        short_records,
        correctly_rejected: short_records - anomalous_records,
        anomalies,
        violations,
        pass_rate: percent(assignments.len() - failing_assignments, assignments.len()),
    }
}

fn check_spacing(availability: &Availability, plan: &Plan) -> SpacingCheck {
    let lanes = plan.lanes();
    let mut violations = Vec::new();
    let mut pairs = 0;

    for ((station, antenna), lane) in &lanes {
        for pair in lane.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            pairs += 1;
            let prev_key = &availability.pass(prev.pass).key;
            let next_key = &availability.pass(next.pass).key;
            let required = required_gap(&prev_key.satellite, &next_key.satellite);
            let measured = next.start - prev.end;

            let issue = if next.start < prev.end {
                SpacingIssue::Overlap
            } else if measured < required {
                SpacingIssue::GapTooShort
            } else {
                continue;
            };
            violations.push(SpacingViolation {
                station: availability.station(*station).name.clone(),
                antenna: *antenna,
                previous: prev_key.clone(),
                next: next_key.clone(),
                previous_end: prev.end,
                next_start: next.start,
                measured_gap: measured,
                required_gap: required,
                issue,
            });
        }
    }

    let overlaps = violations
        .iter()
        .filter(|v| v.issue == SpacingIssue::Overlap)
        .count();
    SpacingCheck {
        antennas: lanes.len(),
        pairs,
        overlaps,
        gap_conflicts: violations.len() - overlaps,
        pass_rate: percent(pairs - violations.len(), pairs),
        violations,
    }
}
