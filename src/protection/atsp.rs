//! ATS-P: stop-signal and speed-restriction patterns braked at a single
//! standard notch, with approach warning and immediate-stop latches.

use std::iter;

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::config::{ProtectionConfig, SPEED_LIMIT};
use crate::onboard::beacon::{AtspBeacon, BeaconData, BeaconQueue};
use crate::onboard::frame::FrameContext;
use crate::pattern::aggregate::permitted_speed;
use crate::pattern::registry::{StopSignalSection, UserPatternRegistry};
use crate::pattern::{collect_patterns, DecelerationProfile, PatternSet, PatternTable};

use super::{Chime, Chimes};

/// Speed restriction slots of ATS-P.
pub const ATSP_USER_PATTERNS: usize = 5;

/// The approach pattern sits this far below each pattern's target [km/h].
const APPROACH_MARGIN: i32 = 5;
/// Look-ahead time of the approach pattern [s].
const APPROACH_TIME: f64 = 5.5;
/// Look-ahead distance of the approach pattern [m].
const APPROACH_DISTANCE: f64 = 50.0;
/// Steepest grade compensation accepted [m/s²].
const MAX_GRADE_CORRECTION: f64 = -0.035;

const STATUS_INTERVAL_MS: f64 = 1000.0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AtspIndicators {
    pub active: bool,
    pub approach: bool,
    pub brake: bool,
    pub release: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AtspOutput {
    pub brake_notch: i32,
    pub indicators: AtspIndicators,
    pub chimes: Chimes,
}

#[derive(Clone, Debug)]
pub struct AtsP {
    config: ProtectionConfig,
    enabled: bool,
    max_speed: i32,
    max_notch: i32,
    standard_notch: i32,
    grade_correction: f64,
    table: PatternTable,
    section: StopSignalSection,
    users: UserPatternRegistry<ATSP_USER_PATTERNS>,
    patterns: PatternSet,
    beacons: BeaconQueue,
    brake_notch: i32,
    approach_lamp: bool,
    /// Speed and brake handle of the last frame, for the reset key.
    speed: f64,
    brake_handle: i32,
    status_time: f64,
    chimes: Chimes,
}

impl AtsP {
    pub fn new(config: &ProtectionConfig) -> Self {
        let max_speed = config.atsp.max_speed.clamp(0, SPEED_LIMIT);
        Self {
            enabled: config.atsp.enabled,
            max_speed,
            max_notch: config.max_brake_notch(),
            standard_notch: config.standard_notch(config.atsp.deceleration),
            grade_correction: 0.0,
            table: PatternTable::build(max_speed, &DecelerationProfile::atsp(config, 0.0)),
            section: StopSignalSection::default(),
            users: UserPatternRegistry::default(),
            patterns: PatternSet::default(),
            beacons: BeaconQueue::default(),
            brake_notch: 0,
            approach_lamp: false,
            speed: 0.0,
            brake_handle: 0,
            status_time: 0.0,
            chimes: Chimes::new(),
            config: config.clone(),
        }
    }

    pub fn initialize(&mut self) {
        *self = Self::new(&self.config);
    }

    pub fn start(&mut self) {
        if !self.enabled {
            self.initialize();
            self.enabled = true;
            self.chimes.push(Chime::AtspBell);
            info!("ATS-P cut in");
        }
    }

    pub fn stop(&mut self) {
        if self.enabled {
            self.initialize();
            self.enabled = false;
            info!("ATS-P cut out");
        }
    }

    pub fn push_beacon(&mut self, beacon: BeaconData) {
        self.beacons.push(beacon);
    }

    /// Brake release key. Works only at standstill with the brake handle at
    /// full service; the immediate emergency stop needs the emergency handle.
    pub fn press_reset(&mut self) {
        let brake_notches = self.config.vehicle.brake_notches;
        if self.speed != 0.0 || self.brake_handle < brake_notches {
            return;
        }
        let section = &mut self.section;
        let mut cleared = false;
        if section.immediate_emergency && self.brake_handle > brake_notches {
            section.immediate_emergency = false;
            cleared = true;
        }
        if section.immediate_service {
            section.immediate_service = false;
            cleared = true;
        }
        if section.pattern_contact {
            section.pattern_contact = false;
            cleared = true;
        }
        if cleared && !section.immediate_emergency {
            section.release_confirmed = true;
            info!("ATS-P brake released by the driver");
        }
    }

    pub fn take_chimes(&mut self) -> Chimes {
        std::mem::take(&mut self.chimes)
    }

    pub fn elapse(&mut self, frame: &FrameContext) -> AtspOutput {
        self.speed = frame.speed;
        self.brake_handle = frame.handles.brake;

        let pending: SmallVec<[BeaconData; 8]> = self.beacons.drain().collect();
        for beacon in pending {
            self.apply_beacon(&beacon, frame.location);
        }

        if !self.enabled {
            self.brake_notch = 0;
            self.approach_lamp = false;
            return AtspOutput {
                chimes: self.take_chimes(),
                ..Default::default()
            };
        }

        self.section.update(frame.location);
        let sources =
            iter::once(self.section.entry()).chain(self.users.entries().iter().copied());
        let list = collect_patterns(sources, self.max_speed);
        self.patterns =
            PatternSet::evaluate(&list, &self.table, self.max_speed, frame.speed, frame.location);

        let approaching = self.patterns.statuses().iter().any(|status| {
            self.is_approaching(
                status.entry.target_speed,
                status.entry.end_location,
                frame.speed,
                frame.location,
            )
        });
        self.check_section(frame.speed);
        self.brake_notch = self.brake(frame.speed);

        let approach = approaching || self.brake_notch != 0;
        if approach != self.approach_lamp {
            self.approach_lamp = approach;
            self.chimes.push(Chime::AtspBell);
        }
        self.log_status(frame);

        AtspOutput {
            brake_notch: self.brake_notch,
            indicators: AtspIndicators {
                active: true,
                approach,
                brake: self.brake_notch != 0,
                release: self.section.release_confirmed,
            },
            chimes: self.take_chimes(),
        }
    }

    fn apply_beacon(&mut self, beacon: &BeaconData, location: f64) {
        let Some(decoded) = AtspBeacon::decode(beacon) else {
            return;
        };
        match decoded {
            AtspBeacon::StopSignal { distance } => self.section.record(location, distance),
            AtspBeacon::ImmediateEmergency { distance } => {
                self.section.record_immediate_emergency(location, distance)
            }
            AtspBeacon::ImmediateService { distance } => {
                self.section.record_immediate_service(location, distance)
            }
            AtspBeacon::UserPattern { slot, optional } => {
                self.users.register(slot, location, optional)
            }
            AtspBeacon::ClearPattern { slot } => self.users.clear(slot),
            AtspBeacon::Grade { optional } => self.set_grade(optional),
        }
    }

    /// Grade compensation in 1/1000 m/s². Positive values are ignored and
    /// the steepest accepted value is -35.
    fn set_grade(&mut self, optional: i32) {
        self.grade_correction = if optional > 0 {
            0.0
        } else {
            (optional as f64 / 1000.0).max(MAX_GRADE_CORRECTION)
        };
        self.table = PatternTable::build(
            self.max_speed,
            &DecelerationProfile::atsp(&self.config, self.grade_correction),
        );
    }

    /// Whether the train is close enough to a pattern to warn: evaluated at
    /// `target - 5` km/h, 5.5 s or 50 m ahead of the pattern end.
    fn is_approaching(&self, target: i32, end_location: f64, speed: f64, location: f64) -> bool {
        let target = target - APPROACH_MARGIN;
        let speed_abs = speed.abs();
        let by_time = permitted_speed(
            &self.table,
            self.max_speed,
            target,
            end_location - speed / 3.6 * APPROACH_TIME,
            location,
        );
        let by_distance = permitted_speed(
            &self.table,
            self.max_speed,
            target,
            end_location - APPROACH_DISTANCE,
            location,
        );
        speed_abs >= by_time as f64 || speed_abs >= by_distance as f64
    }

    /// Latch pattern contact on the stop-signal pattern and remember any
    /// immediate stop until the signal is passed.
    fn check_section(&mut self, speed: f64) {
        let section_permitted = self
            .patterns
            .statuses()
            .first()
            .map_or(self.max_speed, |status| status.permitted_speed);
        if speed.abs() > section_permitted as f64 && section_permitted != self.max_speed {
            if !self.section.pattern_contact {
                info!("ATS-P pattern contact at {section_permitted} km/h");
            }
            self.section.pattern_contact = true;
            self.section.release_confirmed = false;
        }
        if self.section.immediate_emergency || self.section.immediate_service {
            self.section.immediate_latched = true;
        }
    }

    fn brake(&self, speed: f64) -> i32 {
        let section = &self.section;
        if section.release_confirmed {
            0
        } else if section.immediate_emergency {
            self.max_notch + 1
        } else if section.immediate_service
            || section.pattern_contact
            || speed.abs() > self.patterns.permitted_speed() as f64
        {
            self.standard_notch
        } else {
            0
        }
    }

    fn log_status(&mut self, frame: &FrameContext) {
        if frame.total_ms < self.status_time {
            return;
        }
        self.status_time = frame.total_ms + STATUS_INTERVAL_MS;
        let Some(binding) = self.patterns.binding() else {
            return;
        };
        debug!(
            "ATS-P loc {:.1} m, target {} km/h, end {:.1} m, permitted {} km/h, notch B{}, contact {}, release {}",
            frame.location,
            binding.entry.target_speed,
            binding.entry.end_location,
            binding.permitted_speed,
            self.brake_notch,
            self.section.pattern_contact,
            self.section.release_confirmed,
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn brake_notch(&self) -> i32 {
        self.brake_notch
    }

    pub fn grade_correction(&self) -> f64 {
        self.grade_correction
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    pub fn section(&self) -> &StopSignalSection {
        &self.section
    }

    pub fn users(&self) -> &UserPatternRegistry<ATSP_USER_PATTERNS> {
        &self.users
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }
}
