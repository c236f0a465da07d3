//! Registries that turn beacon data into pattern entries.
//!
//! Each registry owns one category of restriction and exposes its current
//! entries; the device collects them in a fixed order every frame.

use crate::config::AtcKind;
use crate::numeric::get_clamped;

use super::PatternEntry;

/// Target-speed field that clears a user pattern slot instead of setting it.
pub const CLEAR_SENTINEL: i32 = 999;

/// Section boundaries reported by digital ATC beacons.
#[derive(Clone, Debug, Default)]
pub struct DigitalSectionRegistry {
    reported_at: f64,
    boundaries: Vec<f64>,
    /// Number of open sections ahead, fed by the cab signal.
    pub open_sections: i32,
    red_signal_location: f64,
}

impl DigitalSectionRegistry {
    /// Record the distance to one section boundary ahead.
    ///
    /// A report from a new (whole-metre) location starts a fresh list.
    pub fn register(&mut self, location: f64, distance: f64) {
        if (location - self.reported_at) as i64 != 0 {
            self.reported_at = location;
            self.boundaries.clear();
        }
        self.boundaries.push(self.reported_at + distance);
    }

    /// Recompute the red-signal location from the open-section count.
    pub fn update(&mut self) {
        self.red_signal_location = get_clamped(&self.boundaries, self.open_sections as i64);
    }

    pub fn red_signal_location(&self) -> f64 {
        self.red_signal_location
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn entry(&self) -> PatternEntry {
        PatternEntry::new(0, self.red_signal_location)
    }
}

/// Stop signal tracked by ATS-P, including its immediate-stop latches.
#[derive(Clone, Debug)]
pub struct StopSignalSection {
    red_signal_location: f64,
    /// Immediate stop requested with the emergency brake.
    pub immediate_emergency: bool,
    /// Immediate stop requested with the service brake.
    pub immediate_service: bool,
    /// Either immediate stop has been seen since the last signal was passed.
    pub immediate_latched: bool,
    /// The section pattern was exceeded.
    pub pattern_contact: bool,
    pub release_confirmed: bool,
    entry: PatternEntry,
}

/// Beyond this distance from the signal an immediate stop is not requested [m].
const IMMEDIATE_STOP_RANGE: f64 = 50.0;

impl Default for StopSignalSection {
    /// No signal recorded yet: the pattern stays invalid until a beacon.
    fn default() -> Self {
        Self {
            red_signal_location: f64::NEG_INFINITY,
            immediate_emergency: false,
            immediate_service: false,
            immediate_latched: false,
            pattern_contact: false,
            release_confirmed: false,
            entry: PatternEntry::default(),
        }
    }
}

impl StopSignalSection {
    pub fn record(&mut self, location: f64, distance: f64) {
        self.red_signal_location = location + distance;
    }

    pub fn record_immediate_emergency(&mut self, location: f64, distance: f64) {
        self.record(location, distance);
        if distance < IMMEDIATE_STOP_RANGE {
            self.immediate_emergency = true;
            self.release_confirmed = false;
        }
    }

    pub fn record_immediate_service(&mut self, location: f64, distance: f64) {
        self.record(location, distance);
        if distance < IMMEDIATE_STOP_RANGE {
            self.immediate_service = true;
            self.release_confirmed = false;
        }
    }

    /// Place the section pattern relative to the train.
    pub fn update(&mut self, location: f64) {
        let signal = self.red_signal_location;
        if location <= signal {
            let margin = if self.immediate_latched {
                IMMEDIATE_STOP_RANGE
            } else {
                10.0
            };
            self.entry = PatternEntry::new(10, signal - margin);
        } else if location <= signal + IMMEDIATE_STOP_RANGE {
            self.entry = PatternEntry::new(15, signal);
        } else {
            self.entry.valid = false;
            self.immediate_latched = false;
            self.release_confirmed = false;
        }
    }

    pub fn red_signal_location(&self) -> f64 {
        self.red_signal_location
    }

    pub fn entry(&self) -> PatternEntry {
        self.entry
    }
}

/// Station sub-patterns in list order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StationPattern {
    Branch = 0,
    Manual = 1,
    End = 2,
}

/// Station-stop patterns armed by a departure signal at stop.
#[derive(Clone, Debug, Default)]
pub struct StationRegistry {
    armed: [bool; 3],
    entries: [PatternEntry; 3],
    arrival_marked: bool,
}

impl StationRegistry {
    /// Departure signal reported; a stop aspect arms the sub-patterns the
    /// protocol uses.
    pub fn arm(&mut self, kind: AtcKind, signal: i32) {
        if kind.is_analog() || signal != 0 {
            return;
        }
        self.armed[StationPattern::Branch as usize] =
            matches!(kind, AtcKind::AtcNs | AtcKind::KsAtc);
        self.armed[StationPattern::Manual as usize] = true;
        self.armed[StationPattern::End as usize] = matches!(kind, AtcKind::KsAtc | AtcKind::DsAtc);
    }

    pub fn register_branch(&mut self, location: f64, distance: i32) {
        self.register(StationPattern::Branch, location, distance, Some(70));
    }

    pub fn register_manual(&mut self, kind: AtcKind, location: f64, distance: i32) {
        let target = match kind {
            AtcKind::AtcNs => Some(30),
            AtcKind::KsAtc => Some(15),
            AtcKind::DsAtc => Some(75),
            _ => None,
        };
        self.register(StationPattern::Manual, location, distance, target);
    }

    pub fn register_end(&mut self, location: f64, distance: i32) {
        self.register(StationPattern::End, location, distance, Some(0));
    }

    fn register(&mut self, which: StationPattern, location: f64, distance: i32, target: Option<i32>) {
        let i = which as usize;
        let entry = &mut self.entries[i];
        entry.end_location = location + distance as f64;
        if let Some(target) = target {
            entry.target_speed = target;
        }
        entry.valid = self.armed[i];
    }

    pub fn mark_arrival(&mut self) {
        self.arrival_marked = true;
    }

    /// Clear every sub-pattern once the train has stopped at the station
    /// with the brake applied.
    pub fn check_stopped(&mut self, speed: f64, brake_handle: i32) {
        if self.arrival_marked && speed == 0.0 && brake_handle > 0 {
            self.armed = [false; 3];
            for entry in &mut self.entries {
                entry.valid = false;
            }
            self.arrival_marked = false;
        }
    }

    pub fn is_armed(&self, which: StationPattern) -> bool {
        self.armed[which as usize]
    }

    pub fn entries(&self) -> &[PatternEntry; 3] {
        &self.entries
    }
}

/// Independently addressable speed restrictions.
#[derive(Clone, Debug)]
pub struct UserPatternRegistry<const N: usize> {
    entries: [PatternEntry; N],
}

impl<const N: usize> Default for UserPatternRegistry<N> {
    fn default() -> Self {
        Self {
            entries: [PatternEntry::default(); N],
        }
    }
}

impl<const N: usize> UserPatternRegistry<N> {
    /// Set or clear `slot` from a beacon value of `distance * 1000 + target`.
    ///
    /// A target field of 999 clears the slot. Unknown slots are ignored.
    pub fn register(&mut self, slot: usize, location: f64, optional: i32) {
        let Some(entry) = self.entries.get_mut(slot) else {
            return;
        };
        let distance = (optional / 1000).max(0);
        let target = optional % 1000;
        if target == CLEAR_SENTINEL {
            entry.valid = false;
        } else {
            *entry = PatternEntry::new(target, location + distance as f64);
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.valid = false;
        }
    }

    pub fn is_valid(&self, slot: usize) -> bool {
        self.entries.get(slot).is_some_and(|entry| entry.valid)
    }

    pub fn entries(&self) -> &[PatternEntry; N] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_reports_from_a_new_location_replace_the_list() {
        let mut sections = DigitalSectionRegistry::default();
        sections.register(100.0, 400.0);
        sections.register(100.4, 1200.0);
        assert_eq!(sections.boundaries(), &[500.0, 1300.0]);

        sections.open_sections = 1;
        sections.update();
        assert_eq!(sections.red_signal_location(), 1300.0);

        sections.open_sections = 9;
        sections.update();
        assert_eq!(sections.red_signal_location(), 1300.0);

        sections.register(2000.0, 300.0);
        assert_eq!(sections.boundaries(), &[2300.0]);
    }

    #[test]
    fn stop_signal_pattern_moves_with_the_train() {
        let mut section = StopSignalSection::default();
        section.record(0.0, 600.0);
        section.update(100.0);
        assert_eq!(section.entry(), PatternEntry::new(10, 590.0));

        section.update(620.0);
        assert_eq!(section.entry(), PatternEntry::new(15, 600.0));

        section.update(700.0);
        assert!(!section.entry().valid);
    }

    #[test]
    fn stop_signal_pattern_waits_for_a_beacon() {
        let mut section = StopSignalSection::default();
        section.update(0.0);
        assert!(!section.entry().valid);
    }

    #[test]
    fn immediate_stop_only_within_range() {
        let mut section = StopSignalSection::default();
        section.record_immediate_emergency(0.0, 80.0);
        assert!(!section.immediate_emergency);
        section.record_immediate_emergency(0.0, 30.0);
        assert!(section.immediate_emergency);

        section.immediate_latched = true;
        section.update(0.0);
        assert_eq!(section.entry().end_location, -20.0);
    }

    #[test]
    fn station_patterns_follow_protocol_kind() {
        let mut station = StationRegistry::default();
        station.arm(AtcKind::DsAtc, 0);
        assert!(!station.is_armed(StationPattern::Branch));
        assert!(station.is_armed(StationPattern::Manual));
        assert!(station.is_armed(StationPattern::End));

        station.register_branch(1000.0, 200);
        station.register_manual(AtcKind::DsAtc, 1000.0, 500);
        station.register_end(1000.0, 800);
        let entries = station.entries();
        assert!(!entries[0].valid);
        assert_eq!(entries[1], PatternEntry::new(75, 1500.0));
        assert_eq!(entries[2], PatternEntry::new(0, 1800.0));
    }

    #[test]
    fn station_ignores_proceed_aspect_and_analog_kinds() {
        let mut station = StationRegistry::default();
        station.arm(AtcKind::AtcNs, 3);
        station.arm(AtcKind::Atc1, 0);
        station.register_manual(AtcKind::AtcNs, 0.0, 100);
        assert!(!station.entries()[1].valid);
    }

    #[test]
    fn station_clears_after_stopping_with_brake() {
        let mut station = StationRegistry::default();
        station.arm(AtcKind::KsAtc, 0);
        station.register_end(0.0, 300);
        station.mark_arrival();

        station.check_stopped(2.0, 4);
        assert!(station.entries()[2].valid);
        station.check_stopped(0.0, 0);
        assert!(station.entries()[2].valid);
        station.check_stopped(0.0, 4);
        assert!(!station.entries()[2].valid);
        assert!(!station.is_armed(StationPattern::End));
    }

    #[test]
    fn user_pattern_set_then_cleared_by_sentinel() {
        let mut users = UserPatternRegistry::<3>::default();
        users.register(0, 250.0, 800 * 1000 + 80);
        assert!(users.is_valid(0));
        assert_eq!(users.entries()[0], PatternEntry::new(80, 1050.0));

        users.register(0, 300.0, 999);
        assert!(!users.is_valid(0));
    }

    #[test]
    fn user_pattern_negative_distance_clamps_to_zero() {
        let mut users = UserPatternRegistry::<5>::default();
        users.register(4, 120.0, -2000);
        assert_eq!(users.entries()[4], PatternEntry::new(0, 120.0));
        users.register(7, 0.0, 1045);
        users.clear(4);
        assert!(!users.is_valid(4));
    }
}
