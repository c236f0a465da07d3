//! The ATC device.
//!
//! Dispatches between the analog and digital variants, owns the beacon
//! queue and the shared brake model, and produces the cab indicators.

use bevy::prelude::*;
use smallvec::{smallvec, SmallVec};

use crate::config::{AtcKind, ProtectionConfig, SPEED_LIMIT};
use crate::control::{BrakeModel, ControlInputs, DecelerationCalibration};
use crate::onboard::beacon::{AtcBeacon, BeaconData, BeaconQueue};
use crate::onboard::frame::FrameContext;
use crate::pattern::{DecelerationProfile, PatternTable};

use super::analog::AnalogAtc;
use super::digital::DigitalAtc;
use super::{Chime, Chimes, SpeedSteps};

/// Interval of the status line in the debug log [ms].
const STATUS_INTERVAL_MS: f64 = 1000.0;

/// Cab indicators of the ATC.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AtcIndicators {
    pub active: bool,
    pub kind: AtcKind,
    /// Stop aspect.
    pub red: bool,
    /// Proceed aspect.
    pub green: bool,
    /// One lamp per cab-signal step.
    pub signal_lamps: SmallVec<[bool; 16]>,
    pub signal_index: i32,
    /// Cab-signal speed on the display [km/h].
    pub atc_speed: i32,
    /// DS-ATC pattern speed ahead of the target [km/h].
    pub preview_speed: Option<i32>,
    pub emergency_lamp: bool,
    pub service_lamp: bool,
    pub confirm_switch: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AtcOutput {
    /// Protection notch units, `max + 1` is emergency.
    pub brake_notch: i32,
    pub indicators: AtcIndicators,
    pub chimes: Chimes,
}

#[derive(Clone, Debug)]
pub struct Atc {
    config: ProtectionConfig,
    enabled: bool,
    kind: AtcKind,
    steps: SpeedSteps,
    max_signal: i32,
    standard_notches: [i32; 4],
    model: BrakeModel,
    table: PatternTable,
    calibration: DecelerationCalibration,
    analog: AnalogAtc,
    digital: DigitalAtc,
    beacons: BeaconQueue,
    brake_notch: i32,
    /// Speed of the last frame; keys and signals arrive between frames.
    speed: f64,
    confirm_switch: bool,
    status_time: f64,
    chimes: Chimes,
}

impl Atc {
    pub fn new(config: &ProtectionConfig) -> Self {
        let max_speed = config.atc.max_speed.clamp(0, SPEED_LIMIT);
        let steps = SpeedSteps::new(config.atc.speed_steps.clone());
        Self {
            enabled: config.atc.enabled,
            kind: config.atc.kind,
            max_signal: steps.signal_for_speed(max_speed),
            steps,
            standard_notches: config.standard_notches(),
            model: BrakeModel::from_config(config),
            table: PatternTable::build(max_speed, &DecelerationProfile::digital_atc(config)),
            calibration: DecelerationCalibration::default(),
            analog: AnalogAtc::default(),
            digital: DigitalAtc::default(),
            beacons: BeaconQueue::default(),
            brake_notch: 0,
            speed: 0.0,
            confirm_switch: false,
            status_time: 0.0,
            chimes: Chimes::new(),
            config: config.clone(),
        }
    }

    /// Reset every timer, registry and queue to the configured start state.
    pub fn initialize(&mut self) {
        *self = Self::new(&self.config);
    }

    /// Cut the ATC in.
    pub fn start(&mut self) {
        if !self.enabled {
            self.initialize();
            self.enabled = true;
            self.chimes.push(Chime::AtcBell);
            info!("ATC cut in ({:?})", self.kind);
        }
    }

    /// Cut the ATC out.
    pub fn stop(&mut self) {
        if self.enabled {
            self.initialize();
            self.enabled = false;
            info!("ATC cut out");
        }
    }

    pub fn push_beacon(&mut self, beacon: BeaconData) {
        self.beacons.push(beacon);
    }

    /// Wayside aspect of the current section.
    pub fn change_signal(&mut self, aspect: i32) {
        if !self.enabled {
            return;
        }
        if self.kind.is_analog() {
            let changed =
                self.analog
                    .change_signal(self.kind, aspect, &self.steps, self.max_signal, self.speed);
            if changed {
                self.chimes.push(Chime::AtcBell);
            }
        } else {
            self.digital.change_signal(aspect);
        }
    }

    /// Confirm key pressed.
    pub fn press_confirm(&mut self) {
        if self.enabled {
            match self.kind {
                AtcKind::Atc1 | AtcKind::Atc2 => self.analog.flags.confirm(self.speed),
                AtcKind::AtcNs => self.digital.flags.confirm(self.speed),
                AtcKind::KsAtc | AtcKind::DsAtc => {}
            }
        }
        if !self.confirm_switch {
            self.confirm_switch = true;
            self.chimes.push(Chime::ConfirmSwitchDown);
        }
    }

    /// Confirm key released.
    pub fn release_confirm(&mut self) {
        if self.confirm_switch {
            self.confirm_switch = false;
            self.chimes.push(Chime::ConfirmSwitchUp);
        }
    }

    /// Chimes raised since the last frame.
    pub fn take_chimes(&mut self) -> Chimes {
        std::mem::take(&mut self.chimes)
    }

    pub fn elapse(&mut self, frame: &FrameContext, ema_accel: f64) -> AtcOutput {
        let raw_notch = self.config.vehicle.notch_from_handle(frame.handles.brake);
        let applied_notch = self.brake_notch.max(raw_notch);
        self.speed = frame.speed;

        let pending: SmallVec<[BeaconData; 8]> = self.beacons.drain().collect();
        for beacon in pending {
            self.apply_beacon(&beacon, frame.location);
        }

        if !self.enabled {
            self.brake_notch = 0;
            return AtcOutput {
                brake_notch: 0,
                indicators: AtcIndicators {
                    kind: self.kind,
                    confirm_switch: self.confirm_switch,
                    ..Default::default()
                },
                chimes: self.take_chimes(),
            };
        }

        let inputs = ControlInputs {
            speed: frame.speed,
            location: frame.location,
            time: frame.total_ms,
            applied_notch,
            ema_accel,
            power_notch: frame.handles.power,
        };
        let max_speed = self.table.max_speed();

        if self.kind.is_analog() {
            self.calibration.observe(&self.model, &inputs);
            self.brake_notch = self.analog.brake(
                self.kind,
                &self.model,
                &self.standard_notches,
                &self.steps,
                max_speed,
                frame.speed,
                frame.total_ms,
                applied_notch,
                self.calibration.correction(),
            );
        } else {
            self.digital.evaluate_patterns(
                &self.table,
                max_speed,
                frame.speed,
                frame.location,
                frame.handles.brake,
            );
            if self
                .digital
                .update_signals(self.kind, &self.steps, &self.table, max_speed, frame.location)
            {
                self.chimes.push(Chime::AtcBell);
            }
            self.brake_notch =
                self.digital
                    .brake(self.kind, &self.model, &inputs, &mut self.calibration);
        }

        self.log_status(frame, ema_accel);
        AtcOutput {
            brake_notch: self.brake_notch,
            indicators: self.indicators(),
            chimes: self.take_chimes(),
        }
    }

    fn apply_beacon(&mut self, beacon: &BeaconData, location: f64) {
        let Some(decoded) = AtcBeacon::decode(beacon) else {
            return;
        };
        match decoded {
            AtcBeacon::LoopCoil { signal } => self.passed_loop(signal),
            AtcBeacon::SectionBoundary { distance } => {
                self.digital.sections.register(location, distance)
            }
            AtcBeacon::DepartureSignal { signal } => self.digital.stations.arm(self.kind, signal),
            AtcBeacon::StationBranch { distance } => {
                self.digital.stations.register_branch(location, distance)
            }
            AtcBeacon::StationManual { distance } => {
                self.digital
                    .stations
                    .register_manual(self.kind, location, distance)
            }
            AtcBeacon::StationEnd { distance } => {
                self.digital.stations.register_end(location, distance)
            }
            AtcBeacon::StationArrival => self.digital.stations.mark_arrival(),
            AtcBeacon::UserPattern { slot, optional } => {
                self.digital.users.register(slot, location, optional)
            }
            AtcBeacon::KindSwitch { code } => self.change_kind(code),
        }
    }

    /// Stop-limit loop coil. A stop aspect latches the emergency brake
    /// (analog and ATC-NS); anything else releases the ATC-NS latch.
    fn passed_loop(&mut self, signal: i32) {
        if !self.enabled {
            return;
        }
        if signal == 0 {
            let latched = match self.kind {
                AtcKind::Atc1 | AtcKind::Atc2 => self.analog.flags.latch_emergency(),
                AtcKind::AtcNs => self.digital.flags.latch_emergency(),
                AtcKind::KsAtc | AtcKind::DsAtc => false,
            };
            if latched {
                info!("ATC-03 stop limit passed, emergency brake latched");
            }
            self.chimes.push(Chime::AtcBell);
        } else if self.kind == AtcKind::AtcNs {
            self.digital.flags.emergency = false;
        }
    }

    /// Switch protocol. Crossing between analog and digital carries the
    /// cab-signal index over as the open-section count and back.
    fn change_kind(&mut self, code: i32) {
        let Some(kind) = AtcKind::from_code(code) else {
            warn!("Ignoring ATC kind switch to unknown code {code}");
            return;
        };
        if kind == self.kind {
            return;
        }
        if kind.is_analog() && !self.kind.is_analog() {
            self.analog.signal = self.digital.sections.open_sections.clamp(0, self.max_signal);
            self.digital.reset();
        } else if !kind.is_analog() && self.kind.is_analog() {
            self.digital.sections.open_sections = self.analog.signal;
            self.analog.reset();
        }
        info!("ATC kind switched from {:?} to {:?}", self.kind, kind);
        self.kind = kind;
    }

    fn indicators(&self) -> AtcIndicators {
        let mut indicators = AtcIndicators {
            active: true,
            kind: self.kind,
            signal_lamps: smallvec![false; self.steps.len()],
            emergency_lamp: self.brake_notch >= self.model.max_notch,
            service_lamp: self.brake_notch > 0,
            confirm_switch: self.confirm_switch,
            ..Default::default()
        };

        let (signal, speed) = if self.kind.is_analog() {
            indicators.red = self.analog.signal == 0;
            (
                self.analog.signal,
                self.steps.display_speed(self.analog.signal),
            )
        } else {
            indicators.red = self.digital.sections.open_sections <= 1;
            match self.kind {
                AtcKind::AtcNs => (self.digital.arrow_signal(), self.digital.arrow_speed()),
                _ => {
                    if self.kind == AtcKind::DsAtc {
                        indicators.preview_speed = Some(self.digital.arrow_speed());
                    }
                    (self.digital.target_signal(), self.digital.target_speed())
                }
            }
        };
        indicators.green = !indicators.red;
        if let Some(lamp) = usize::try_from(signal)
            .ok()
            .and_then(|i| indicators.signal_lamps.get_mut(i))
        {
            *lamp = true;
        }
        indicators.signal_index = signal;
        indicators.atc_speed = speed;
        indicators
    }

    fn log_status(&mut self, frame: &FrameContext, ema_accel: f64) {
        if frame.total_ms < self.status_time {
            return;
        }
        self.status_time = frame.total_ms + STATUS_INTERVAL_MS;

        if self.kind.is_analog() {
            debug!(
                "ATC loc {:.1} m, accel {:.2} km/h/s, target {} km/h, notch B{}, flags {:?}",
                frame.location,
                ema_accel,
                self.steps.enforced_speed(self.kind, self.analog.signal),
                self.brake_notch,
                self.analog.flags,
            );
        } else {
            let patterns = self.digital.patterns();
            let Some(binding) = patterns.binding() else {
                return;
            };
            debug!(
                "ATC loc {:.1} m, accel {:.2} km/h/s, target {} km/h, start {:.1} m, end {:.1} m, permitted {} km/h",
                frame.location,
                ema_accel,
                binding.entry.target_speed,
                binding.start_location,
                binding.entry.end_location,
                binding.permitted_speed,
            );
            debug!(
                "ATC slot {:?}, notch B{}, flags {:?}",
                self.digital.fuzzy().strongest_slot(),
                self.brake_notch,
                self.digital.flags,
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> AtcKind {
        self.kind
    }

    pub fn brake_notch(&self) -> i32 {
        self.brake_notch
    }

    pub fn analog(&self) -> &AnalogAtc {
        &self.analog
    }

    pub fn digital(&self) -> &DigitalAtc {
        &self.digital
    }

    pub fn calibration(&self) -> &DecelerationCalibration {
        &self.calibration
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboard::frame::HandleState;

    fn frame(speed: f64, location: f64, total_ms: f64, brake: i32) -> FrameContext {
        FrameContext {
            speed,
            location,
            elapsed_ms: 50.0,
            total_ms,
            handles: HandleState { power: 0, brake },
        }
    }

    fn beacon(code: i32, signal: i32, distance: f64, optional: i32) -> BeaconData {
        BeaconData {
            code,
            signal,
            distance,
            optional,
        }
    }

    fn config(kind: AtcKind) -> ProtectionConfig {
        let mut config = ProtectionConfig::default();
        config.atc.kind = kind;
        config
    }

    #[test]
    fn analog_stop_aspect_needs_confirmation_at_standstill() {
        let mut atc = Atc::new(&config(AtcKind::Atc1));
        atc.change_signal(5);
        let out = atc.elapse(&frame(200.0, 0.0, 50.0, 0), 0.0);
        assert_eq!(out.brake_notch, 0);
        assert_eq!(out.chimes.as_slice(), &[Chime::AtcBell]);
        assert!(out.indicators.green);
        assert_eq!(out.indicators.atc_speed, 220);
        assert!(out.indicators.signal_lamps[5]);

        atc.change_signal(0);
        let out = atc.elapse(&frame(180.0, 100.0, 100.0, 0), 0.0);
        assert_eq!(out.brake_notch, 9);
        assert!(out.indicators.red);
        assert!(out.indicators.emergency_lamp);

        // Still moving when the key goes down.
        atc.press_confirm();
        let out = atc.elapse(&frame(0.0, 500.0, 150.0, 9), 0.0);
        assert_eq!(out.brake_notch, 9);
        assert_eq!(out.chimes.as_slice(), &[Chime::ConfirmSwitchDown]);

        atc.press_confirm();
        atc.release_confirm();
        let out = atc.elapse(&frame(0.0, 500.0, 200.0, 9), 0.0);
        assert_eq!(out.brake_notch, 0);
        assert_eq!(out.chimes.as_slice(), &[Chime::ConfirmSwitchUp]);
    }

    #[test]
    fn loop_coil_latches_and_releases_ns_emergency() {
        let mut atc = Atc::new(&config(AtcKind::AtcNs));
        atc.push_beacon(beacon(80, 0, 5000.0, 0));
        atc.push_beacon(beacon(70, 0, 0.0, 0));
        let out = atc.elapse(&frame(60.0, 10.0, 50.0, 0), 0.0);
        assert_eq!(out.brake_notch, 9);
        assert!(out.chimes.contains(&Chime::AtcBell));
        assert_eq!(out.indicators.signal_index, 0);

        atc.push_beacon(beacon(70, 3, 0.0, 0));
        let out = atc.elapse(&frame(55.0, 12.0, 100.0, 9), 0.0);
        assert_eq!(out.brake_notch, 0);
    }

    #[test]
    fn kind_switch_carries_signal_across() {
        let mut atc = Atc::new(&config(AtcKind::KsAtc));
        atc.change_signal(3);
        atc.push_beacon(beacon(90, 0, 0.0, 0));
        let out = atc.elapse(&frame(50.0, 0.0, 50.0, 0), 0.0);
        assert_eq!(atc.kind(), AtcKind::Atc1);
        assert_eq!(out.brake_notch, 0);
        assert_eq!(out.indicators.signal_index, 3);
        assert_eq!(out.indicators.atc_speed, 120);

        atc.push_beacon(beacon(90, 0, 0.0, 3));
        atc.elapse(&frame(50.0, 10.0, 100.0, 0), 0.0);
        assert_eq!(atc.kind(), AtcKind::KsAtc);
        assert_eq!(atc.digital().sections.open_sections, 3);
        assert_eq!(atc.analog().signal, 0);
    }

    #[test]
    fn disabled_atc_still_drains_beacons() {
        let mut config = config(AtcKind::Atc1);
        config.atc.enabled = false;
        let mut atc = Atc::new(&config);
        atc.push_beacon(beacon(90, 0, 0.0, 2));
        let out = atc.elapse(&frame(80.0, 0.0, 50.0, 0), 0.0);
        assert_eq!(out.brake_notch, 0);
        assert!(!out.indicators.active);
        assert_eq!(atc.kind(), AtcKind::AtcNs);

        atc.start();
        assert!(atc.is_enabled());
        assert_eq!(atc.kind(), AtcKind::Atc1);
        assert_eq!(atc.take_chimes().as_slice(), &[Chime::AtcBell]);
    }

    #[test]
    fn unknown_beacons_and_kinds_are_ignored() {
        let mut atc = Atc::new(&config(AtcKind::DsAtc));
        atc.push_beacon(beacon(42, 0, 0.0, 0));
        atc.push_beacon(beacon(90, 0, 0.0, 7));
        atc.elapse(&frame(0.0, 0.0, 50.0, 0), 0.0);
        assert_eq!(atc.kind(), AtcKind::DsAtc);
    }
}
