use crate::config::BandPreference;
use crate::dataset::{Availability, Pass, PassId, Phase, StationId};
use crate::scheduler::{AntennaId, Assignment, Plan, WindowFit};
use crate::timing::{required_gap, Timestamp, MIN_TASK_DURATION};

const SHORT_TASK_PENALTY: f64 = 1000.0;
const GAP_PENALTY: f64 = 500.0;
const OVERLAP_PENALTY: f64 = 2000.0;

/// Assignments of a plan laid out per antenna, with the aggregates the
/// objective needs kept up to date on every insert and removal.
#[derive(Debug, Clone)]
pub struct Occupancy<'a> {
    availability: &'a Availability,
    bands: &'a BandPreference,
    slots: Vec<Option<Assignment>>,
    /// `[station][antenna]`, each lane sorted by start.
    lanes: Vec<Vec<Vec<PassId>>>,
    lane_penalty: Vec<Vec<f64>>,
    station_busy: Vec<i64>,
    assigned: usize,
}

impl<'a> Occupancy<'a> {
    pub fn new(availability: &'a Availability, bands: &'a BandPreference, plan: &Plan) -> Self {
        let slots = (0..availability.passes.len())
            .map(|idx| plan.assignment(PassId(idx)).cloned())
            .collect();
        Self::from_slots(availability, bands, slots)
    }

    pub fn from_slots(
        availability: &'a Availability,
        bands: &'a BandPreference,
        slots: Vec<Option<Assignment>>,
    ) -> Self {
        let mut occupancy = Self {
            availability,
            bands,
            slots: vec![None; slots.len()],
            lanes: availability
                .stations
                .iter()
                .map(|s| vec![Vec::new(); s.antenna_count])
                .collect(),
            lane_penalty: availability
                .stations
                .iter()
                .map(|s| vec![0.0; s.antenna_count])
                .collect(),
            station_busy: vec![0; availability.stations.len()],
            assigned: 0,
        };
        for assignment in slots.into_iter().flatten() {
            occupancy.insert(assignment);
        }
        occupancy
    }

    pub fn slots(&self) -> &[Option<Assignment>] {
        &self.slots
    }

    pub fn assignment(&self, pass: PassId) -> Option<&Assignment> {
        self.slots[pass.index()].as_ref()
    }

    pub fn assigned(&self) -> usize {
        self.assigned
    }

    pub fn station_busy(&self) -> &[i64] {
        &self.station_busy
    }

    pub fn penalty(&self) -> f64 {
        self.lane_penalty.iter().flatten().sum()
    }

    pub fn assigned_passes(&self) -> Vec<PassId> {
        self.slots
            .iter()
            .flatten()
            .map(|a| a.pass)
            .collect()
    }

    pub fn tasks_on(&self, station: StationId) -> Vec<PassId> {
        self.lanes[station.index()].iter().flatten().copied().collect()
    }

    pub fn insert(&mut self, assignment: Assignment) {
        let (s, a) = (assignment.station.index(), assignment.antenna.index());
        let start = assignment.start;
        let lane = &self.lanes[s][a];
        let position = lane.partition_point(|id| self.start_of(*id) <= start);

        self.station_busy[s] += assignment.duration();
        self.assigned += 1;
        let pass = assignment.pass;
        self.slots[pass.index()] = Some(assignment);
        self.lanes[s][a].insert(position, pass);
        self.refresh_lane(s, a);
    }

    pub fn remove(&mut self, pass: PassId) -> Option<Assignment> {
        let assignment = self.slots[pass.index()].take()?;
        let (s, a) = (assignment.station.index(), assignment.antenna.index());
        self.lanes[s][a].retain(|id| *id != pass);
        self.station_busy[s] -= assignment.duration();
        self.assigned -= 1;
        self.refresh_lane(s, a);
        Some(assignment)
    }

    /// Earliest placement of `pass` on the given antenna that keeps the gap
    /// rule towards every task in the lane except those in `ignore`.
    pub fn place(
        &self,
        pass: &Pass,
        station: StationId,
        antenna: AntennaId,
        ignore: &[PassId],
    ) -> Option<Assignment> {
        let window = *pass.window(station)?;
        let lane = self.lanes[station.index()].get(antenna.index())?;
        let others: Vec<&Assignment> = lane
            .iter()
            .filter(|id| !ignore.contains(id))
            .filter_map(|id| self.assignment(*id))
            .collect();

        let mut starts = vec![window.start];
        for other in &others {
            let satellite = &self.availability.pass(other.pass).key.satellite;
            let ready = other.end + required_gap(satellite, &pass.key.satellite);
            if ready > window.start {
                starts.push(ready);
            }
        }
        starts.sort_unstable();

        let start = starts.into_iter().find(|&start| {
            let end = task_end(pass.key.phase, window.end, start);
            start + MIN_TASK_DURATION <= window.end
                && others.iter().all(|o| self.compatible(pass, start, end, o))
        })?;
        let end = task_end(pass.key.phase, window.end, start);
        Some(Assignment {
            pass: pass.id,
            station,
            antenna,
            start,
            end,
            fit: WindowFit::classify(&window, start, end),
            band_matched: self.bands.matches(
                pass.key.phase,
                self.availability.station(station).band.as_deref(),
            ),
        })
    }

    fn compatible(&self, pass: &Pass, start: Timestamp, end: Timestamp, other: &Assignment) -> bool {
        let satellite = &self.availability.pass(other.pass).key.satellite;
        let gap = required_gap(satellite, &pass.key.satellite);
        if end <= other.start {
            other.start - end >= gap
        } else if other.end <= start {
            start - other.end >= gap
        } else {
            false
        }
    }

    fn start_of(&self, pass: PassId) -> Timestamp {
        self.slots[pass.index()].as_ref().map_or(Timestamp::MAX, |a| a.start)
    }

    fn refresh_lane(&mut self, station: usize, antenna: usize) {
        let lane: Vec<&Assignment> = self.lanes[station][antenna]
            .iter()
            .filter_map(|id| self.slots[id.index()].as_ref())
            .collect();

        let mut penalty = 0.0;
        for task in &lane {
            if task.duration() < MIN_TASK_DURATION {
                penalty += SHORT_TASK_PENALTY;
            }
        }
        for pair in lane.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.start < prev.end {
                penalty += OVERLAP_PENALTY;
                continue;
            }
            let gap = required_gap(
                &self.availability.pass(prev.pass).key.satellite,
                &self.availability.pass(next.pass).key.satellite,
            );
            if next.start - prev.end < gap {
                penalty += GAP_PENALTY;
            }
        }
        self.lane_penalty[station][antenna] = penalty;
    }
}

fn task_end(phase: Phase, window_end: Timestamp, start: Timestamp) -> Timestamp {
    match phase {
        Phase::Climb => start + MIN_TASK_DURATION,
        Phase::Operation => window_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{availability, record, station};
    use crate::scheduler::Allocation;

    fn assigned(pass: usize, antenna: usize, start: i64, end: i64) -> Allocation {
        Allocation::Assigned(Assignment {
            pass: PassId(pass),
            station: StationId(0),
            antenna: AntennaId::from_index(antenna).unwrap(),
            start,
            end,
            fit: WindowFit::Inner,
            band_matched: true,
        })
    }

    #[test]
    fn test_penalty_tracks_lane_changes() {
        let availability = availability(vec![station(
            "CM",
            2,
            vec![
                record("X", 1, Phase::Climb, 0, 1000),
                record("Y", 1, Phase::Climb, 0, 2000),
            ],
        )]);
        let bands = BandPreference::default();
        let plan = Plan::from_allocations(vec![assigned(0, 0, 0, 300), assigned(1, 0, 200, 500)]);
        let mut occupancy = Occupancy::new(&availability, &bands, &plan);
        assert_eq!(occupancy.penalty(), 2000.0);
        assert_eq!(occupancy.station_busy(), &[600]);

        let moved = occupancy.remove(PassId(1)).unwrap();
        assert_eq!(occupancy.penalty(), 0.0);
        let mut next = moved.clone();
        next.start = 700;
        next.end = 1000;
        occupancy.insert(next);
        // 400 s after a different satellite.
        assert_eq!(occupancy.penalty(), 500.0);
        assert_eq!(occupancy.tasks_on(StationId(0)), vec![PassId(0), PassId(1)]);
    }

    #[test]
    fn test_place_respects_both_neighbours() {
        let availability = availability(vec![station(
            "CM",
            1,
            vec![
                record("X", 1, Phase::Climb, 0, 400),
                record("X", 2, Phase::Climb, 2000, 2400),
                record("Y", 1, Phase::Climb, 0, 3000),
            ],
        )]);
        let bands = BandPreference::default();
        let plan = Plan::from_allocations(vec![
            assigned(0, 0, 0, 300),
            assigned(1, 0, 2000, 2300),
            Allocation::Unresolved,
        ]);
        let occupancy = Occupancy::new(&availability, &bands, &plan);
        let antenna = AntennaId::from_index(0).unwrap();

        // Between the two X tasks there is 900..1200 needing 600 s on both sides:
        // 900 + 300 = 1200, 2000 - 1200 = 800 >= 600.
        let placed = occupancy
            .place(availability.pass(PassId(2)), StationId(0), antenna, &[])
            .unwrap();
        assert_eq!((placed.start, placed.end), (900, 1200));

        // Ignoring the first task frees the window start.
        let placed = occupancy
            .place(availability.pass(PassId(2)), StationId(0), antenna, &[PassId(0)])
            .unwrap();
        assert_eq!(placed.start, 0);
    }
}
