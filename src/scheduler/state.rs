use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::dataset::{PassId, StationId};
use crate::scheduler::error::SchedulerError;
use crate::timing::{Timestamp, MAX_ANTENNAS_PER_STATION};

/// Index of an antenna within its station, zero based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntennaId(u8);

impl AntennaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Build an id from a plan file or a report, range-checked against the
    /// station's bank by the caller.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < MAX_ANTENNAS_PER_STATION).then_some(Self(index as u8))
    }
}

impl fmt::Display for AntennaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ant{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastTask {
    pub pass: PassId,
    pub end: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AntennaState {
    pub task_count: u32,
    pub busy_seconds: i64,
    pub last: Option<LastTask>,
}

impl AntennaState {
    pub fn is_idle(&self) -> bool {
        self.last.is_none()
    }

    pub fn last_end(&self) -> Option<Timestamp> {
        self.last.map(|l| l.end)
    }

    fn commit(&mut self, pass: PassId, start: Timestamp, end: Timestamp) {
        self.task_count += 1;
        self.busy_seconds += end - start;
        self.last = Some(LastTask { pass, end });
    }
}

/// The antennas of one station. Its size is checked once on construction,
/// so every `AntennaId` it hands out is in range.
#[derive(Debug, Clone, PartialEq)]
pub struct AntennaBank {
    antennas: Vec<AntennaState>,
}

impl AntennaBank {
    pub fn new(station: &str, count: usize) -> Result<Self, SchedulerError> {
        if count == 0 || count > MAX_ANTENNAS_PER_STATION {
            return Err(SchedulerError::AntennaCount {
                station: station.to_string(),
                count,
                max: MAX_ANTENNAS_PER_STATION,
            });
        }
        Ok(Self {
            antennas: vec![AntennaState::default(); count],
        })
    }

    pub fn len(&self) -> usize {
        self.antennas.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AntennaId, &AntennaState)> {
        self.antennas
            .iter()
            .enumerate()
            .map(|(idx, state)| (AntennaId(idx as u8), state))
    }
}

impl Index<AntennaId> for AntennaBank {
    type Output = AntennaState;

    fn index(&self, id: AntennaId) -> &AntennaState {
        &self.antennas[id.index()]
    }
}

impl IndexMut<AntennaId> for AntennaBank {
    fn index_mut(&mut self, id: AntennaId) -> &mut AntennaState {
        &mut self.antennas[id.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationState {
    pub id: StationId,
    pub antennas: AntennaBank,
}

impl StationState {
    pub fn task_count(&self) -> u32 {
        self.antennas.iter().map(|(_, a)| a.task_count).sum()
    }

    pub fn busy_seconds(&self) -> i64 {
        self.antennas.iter().map(|(_, a)| a.busy_seconds).sum()
    }
}

/// Mutable per-antenna bookkeeping of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    stations: Vec<StationState>,
}

impl SchedulerState {
    pub fn new<'a>(
        stations: impl IntoIterator<Item = (StationId, &'a str, usize)>,
    ) -> Result<Self, SchedulerError> {
        let stations = stations
            .into_iter()
            .map(|(id, name, count)| {
                Ok(StationState {
                    id,
                    antennas: AntennaBank::new(name, count)?,
                })
            })
            .collect::<Result<Vec<_>, SchedulerError>>()?;
        Ok(Self { stations })
    }

    pub fn station(&self, id: StationId) -> &StationState {
        &self.stations[id.index()]
    }

    pub fn stations(&self) -> &[StationState] {
        &self.stations
    }

    /// Record a task on an antenna and return the antenna's prior state.
    pub fn commit(
        &mut self,
        station: StationId,
        antenna: AntennaId,
        pass: PassId,
        start: Timestamp,
        end: Timestamp,
    ) -> AntennaState {
        let slot = &mut self.stations[station.index()].antennas[antenna];
        let previous = slot.clone();
        slot.commit(pass, start, end);
        previous
    }

    pub(crate) fn restore(
        &mut self,
        station: StationId,
        antenna: AntennaId,
        previous: AntennaState,
    ) {
        self.stations[station.index()].antennas[antenna] = previous;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub step: usize,
    pub station: StationId,
    pub antenna: AntennaId,
    pub previous: AntennaState,
}

/// Undo log of commits, ordered by processing step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn record(
        &mut self,
        step: usize,
        station: StationId,
        antenna: AntennaId,
        previous: AntennaState,
    ) {
        debug_assert!(self.entries.last().map_or(true, |e| e.step <= step));
        self.entries.push(JournalEntry {
            step,
            station,
            antenna,
            previous,
        });
    }

    /// Undo, on `state`, every commit made at or after `step`. The journal
    /// itself is left unchanged.
    pub fn rewind(&self, state: &mut SchedulerState, step: usize) {
        for entry in self.entries.iter().rev().take_while(|e| e.step >= step) {
            state.restore(entry.station, entry.antenna, entry.previous.clone());
        }
    }

    /// Replace every entry at or after `step` with `replacement`.
    pub fn splice_from(&mut self, step: usize, replacement: Vec<JournalEntry>) {
        let keep = self.entries.partition_point(|e| e.step < step);
        self.entries.truncate(keep);
        self.entries.extend(replacement);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SchedulerState {
        SchedulerState::new([(StationId(0), "CM", 2), (StationId(1), "KS", 1)]).unwrap()
    }

    #[test]
    fn test_bank_rejects_out_of_range_counts() {
        assert!(AntennaBank::new("CM", 0).is_err());
        assert!(AntennaBank::new("CM", 21).is_err());
        let bank = AntennaBank::new("CM", 20).unwrap();
        assert_eq!(bank.len(), 20);
        assert_eq!(AntennaId::from_index(20), None);
    }

    #[test]
    fn test_commit_updates_counters() {
        let mut state = state();
        let ant = AntennaId(1);
        let previous = state.commit(StationId(0), ant, PassId(3), 100, 400);
        assert!(previous.is_idle());

        let antenna = &state.station(StationId(0)).antennas[ant];
        assert_eq!(antenna.task_count, 1);
        assert_eq!(antenna.busy_seconds, 300);
        assert_eq!(antenna.last_end(), Some(400));
        assert_eq!(state.station(StationId(0)).task_count(), 1);
    }

    #[test]
    fn test_journal_rewind() {
        let mut state = state();
        let mut journal = Journal::default();
        let ant = AntennaId(0);

        let prev = state.commit(StationId(0), ant, PassId(0), 0, 300);
        journal.record(0, StationId(0), ant, prev);
        let after_first = state.clone();
        let prev = state.commit(StationId(0), ant, PassId(1), 900, 1200);
        journal.record(1, StationId(0), ant, prev);
        let prev = state.commit(StationId(1), ant, PassId(2), 950, 1300);
        journal.record(2, StationId(1), ant, prev);

        let mut scratch = state.clone();
        journal.rewind(&mut scratch, 1);
        assert_eq!(scratch, after_first);

        journal.splice_from(1, Vec::new());
        assert_eq!(journal.len(), 1);
    }
}
