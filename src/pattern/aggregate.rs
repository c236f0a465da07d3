//! Per-frame evaluation of every active pattern against the train.

use smallvec::SmallVec;

use super::{PatternEntry, PatternTable, MAX_PATTERNS};

/// A pattern after evaluation at the current location and speed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternStatus {
    /// The entry with invalid targets replaced by the maximum speed.
    pub entry: PatternEntry,
    /// Speed the pattern permits at the current location [km/h].
    pub permitted_speed: i32,
    /// Location where braking for this pattern must begin [m].
    pub start_location: f64,
}

/// Speed a pattern permits at `location`.
///
/// Past the end location the pattern is flat at its target.
pub fn permitted_speed(
    table: &PatternTable,
    max_speed: i32,
    target_speed: i32,
    end_location: f64,
    location: f64,
) -> i32 {
    if end_location <= location {
        target_speed.clamp(0, max_speed.max(0))
    } else {
        table.speed_for_distance(table.braking_distance(target_speed) + end_location - location)
    }
}

/// Location where braking must begin so `speed` falls to the target by the
/// end location. Invalid patterns never start.
pub fn start_location(table: &PatternTable, entry: &PatternEntry, speed: f64) -> f64 {
    let speed = speed.abs();
    if !entry.valid {
        f64::INFINITY
    } else if speed <= entry.target_speed as f64 {
        entry.end_location
    } else {
        table.braking_distance(entry.target_speed) - table.braking_distance(speed as i32)
            + entry.end_location
    }
}

/// Every pattern of one device, evaluated for the current frame.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    statuses: SmallVec<[PatternStatus; MAX_PATTERNS]>,
}

impl PatternSet {
    pub fn evaluate(
        entries: &[PatternEntry],
        table: &PatternTable,
        max_speed: i32,
        speed: f64,
        location: f64,
    ) -> Self {
        let statuses = entries
            .iter()
            .map(|entry| {
                let mut entry = *entry;
                if !entry.valid {
                    entry.target_speed = max_speed;
                }
                PatternStatus {
                    permitted_speed: permitted_speed(
                        table,
                        max_speed,
                        entry.target_speed,
                        entry.end_location,
                        location,
                    ),
                    start_location: start_location(table, &entry, speed),
                    entry,
                }
            })
            .collect();
        Self { statuses }
    }

    pub fn statuses(&self) -> &[PatternStatus] {
        &self.statuses
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Index of the lowest permitted speed; the first one wins ties.
    pub fn binding_index(&self) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (i, status) in self.statuses.iter().enumerate() {
            match best {
                Some((_, speed)) if status.permitted_speed >= speed => {}
                _ => best = Some((i, status.permitted_speed)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn binding(&self) -> Option<&PatternStatus> {
        self.binding_index().map(|i| &self.statuses[i])
    }

    /// Lowest permitted speed, or 0 when nothing has been evaluated.
    pub fn permitted_speed(&self) -> i32 {
        self.binding().map_or(0, |status| status.permitted_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{collect_patterns, DecelerationProfile};

    fn table() -> PatternTable {
        PatternTable::build(220, &DecelerationProfile::uniform(3.0 / 3.6))
    }

    #[test]
    fn nothing_registered_still_permits_max_speed() {
        let table = table();
        let list = collect_patterns(std::iter::empty(), 220);
        let set = PatternSet::evaluate(&list, &table, 220, 100.0, 50.0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.permitted_speed(), 220);
        assert!(set.statuses()[0].entry.valid);
    }

    #[test]
    fn invalid_entries_take_the_maximum_speed() {
        let table = table();
        let list = collect_patterns([PatternEntry::default()], 220);
        let set = PatternSet::evaluate(&list, &table, 220, 100.0, 0.0);
        let status = set.statuses()[0];
        assert_eq!(status.entry.target_speed, 220);
        assert!(status.start_location.is_infinite());
    }

    #[test]
    fn stop_pattern_permits_less_as_the_signal_nears() {
        let table = table();
        let list = collect_patterns([PatternEntry::new(0, 600.0)], 220);
        let far = PatternSet::evaluate(&list, &table, 220, 100.0, 0.0);
        let near = PatternSet::evaluate(&list, &table, 220, 100.0, 400.0);
        assert!(near.permitted_speed() < far.permitted_speed());
        assert_eq!(far.binding_index(), Some(0));

        // 463 m of braking from 100 km/h ends at the signal.
        let start = far.statuses()[0].start_location;
        assert!((start - (600.0 - 463.0)).abs() < 0.5);

        let past = PatternSet::evaluate(&list, &table, 220, 0.0, 610.0);
        assert_eq!(past.permitted_speed(), 0);
    }

    #[test]
    fn slow_train_starts_at_the_end_location() {
        let table = table();
        let entry = PatternEntry::new(80, 900.0);
        assert_eq!(start_location(&table, &entry, -60.0), 900.0);
    }

    #[test]
    fn first_minimum_binds() {
        let table = table();
        let list = collect_patterns([PatternEntry::new(70, 0.0), PatternEntry::new(70, 0.0)], 220);
        let set = PatternSet::evaluate(&list, &table, 220, 50.0, 10.0);
        assert_eq!(set.binding_index(), Some(0));
        assert_eq!(set.permitted_speed(), 70);
    }
}
