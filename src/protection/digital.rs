//! Digital ATC (ATC-NS / KS-ATC / DS-ATC): section, station and user
//! patterns braked by the predictive fuzzy controller.

use std::iter;

use crate::config::AtcKind;
use crate::control::{BrakeModel, ControlInputs, DecelerationCalibration, FuzzyBrakeController};
use crate::pattern::registry::{DigitalSectionRegistry, StationRegistry, UserPatternRegistry};
use crate::pattern::{collect_patterns, PatternSet, PatternTable};

use super::{ProtectionFlags, SpeedSteps};

/// User restriction slots of digital ATC.
pub const USER_PATTERNS: usize = 3;

/// ATC-NS speed for the 30 km/h service latch.
const SERVICE_LATCH_SPEED: f64 = 30.0;

#[derive(Clone, Debug, Default)]
pub struct DigitalAtc {
    pub sections: DigitalSectionRegistry,
    pub stations: StationRegistry,
    pub users: UserPatternRegistry<USER_PATTERNS>,
    pub flags: ProtectionFlags,
    previous_speed: f64,
    arrow_signal: i32,
    arrow_speed: i32,
    target_signal: i32,
    target_speed: i32,
    patterns: PatternSet,
    fuzzy: FuzzyBrakeController,
}

impl DigitalAtc {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Open-section count from the wayside.
    pub fn change_signal(&mut self, open_sections: i32) {
        self.sections.open_sections = open_sections;
    }

    /// Refresh registries and evaluate every pattern at the train.
    pub fn evaluate_patterns(
        &mut self,
        table: &PatternTable,
        max_speed: i32,
        speed: f64,
        location: f64,
        brake_handle: i32,
    ) {
        self.sections.update();
        self.stations.check_stopped(speed, brake_handle);

        let sources = iter::once(self.sections.entry())
            .chain(self.stations.entries().iter().copied())
            .chain(self.users.entries().iter().copied());
        let list = collect_patterns(sources, max_speed);
        self.patterns = PatternSet::evaluate(&list, table, max_speed, speed, location);
    }

    /// Derive the preview (arrow) and target cab signals from the binding
    /// pattern. Returns `true` when the bell should ring.
    ///
    /// ATC-NS rings on arrow changes, KS/DS on target changes. KS/DS switch
    /// from the arrow to the target once the train is past the point where
    /// braking from the maximum speed to the target would have to start.
    pub fn update_signals(
        &mut self,
        kind: AtcKind,
        steps: &SpeedSteps,
        table: &PatternTable,
        max_speed: i32,
        location: f64,
    ) -> bool {
        let Some(binding) = self.patterns.binding().copied() else {
            return false;
        };
        let permitted = binding.permitted_speed;
        let target = binding.entry.target_speed;

        if kind == AtcKind::AtcNs {
            let previous = self.arrow_signal;
            if self.flags.emergency && !self.flags.release_confirmed {
                self.arrow_signal = 0;
                self.arrow_speed = 0;
            } else {
                self.arrow_signal = steps.signal_for_speed(permitted);
                self.arrow_speed = steps.enforced_speed(kind, self.arrow_signal);
            }
            self.target_signal = steps.signal_for_speed(target);
            self.arrow_signal != previous
        } else {
            let previous = self.target_signal;
            self.arrow_signal = steps.signal_for_speed(permitted);
            self.arrow_speed = permitted;
            let binds_at = table.braking_distance(target) - table.braking_distance(max_speed)
                + binding.entry.end_location;
            if location >= binds_at {
                self.target_signal = steps.signal_for_speed(target);
                self.target_speed = target;
            } else {
                self.target_signal = self.arrow_signal;
                self.target_speed = self.arrow_speed;
            }
            self.target_signal != previous
        }
    }

    /// ATC-NS 30 km/h aspect: latch service when the train slows through
    /// 30 km/h on it, unlatch when it accelerates back through.
    fn check_service_latch(&mut self, kind: AtcKind, speed: f64) {
        let speed = speed.abs();
        if kind == AtcKind::AtcNs {
            if self.target_signal == 1
                && speed <= SERVICE_LATCH_SPEED
                && self.previous_speed > SERVICE_LATCH_SPEED
            {
                self.flags.service = true;
                self.flags.release_confirmed = false;
            } else if speed > SERVICE_LATCH_SPEED && self.previous_speed <= SERVICE_LATCH_SPEED {
                self.flags.service = false;
            }
        }
        self.previous_speed = speed;
    }

    /// Brake notch for this frame. Calibration only runs while the fuzzy
    /// controller is in charge.
    pub fn brake(
        &mut self,
        kind: AtcKind,
        model: &BrakeModel,
        inputs: &ControlInputs,
        calibration: &mut DecelerationCalibration,
    ) -> i32 {
        self.check_service_latch(kind, inputs.speed);
        if let Some(notch) = self.flags.brake_override(model.max_notch) {
            return notch;
        }
        calibration.observe(model, inputs);
        self.fuzzy.select(model, inputs, calibration, &self.patterns)
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn fuzzy(&self) -> &FuzzyBrakeController {
        &self.fuzzy
    }

    pub fn arrow_signal(&self) -> i32 {
        self.arrow_signal
    }

    pub fn arrow_speed(&self) -> i32 {
        self.arrow_speed
    }

    pub fn target_signal(&self) -> i32 {
        self.target_signal
    }

    pub fn target_speed(&self) -> i32 {
        self.target_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtectionConfig;
    use crate::pattern::DecelerationProfile;

    fn setup() -> (SpeedSteps, PatternTable, BrakeModel) {
        let config = ProtectionConfig::default();
        let steps = SpeedSteps::new(config.atc.speed_steps.clone());
        let table = PatternTable::build(config.atc.max_speed, &DecelerationProfile::digital_atc(&config));
        (steps, table, BrakeModel::from_config(&config))
    }

    #[test]
    fn section_pattern_binds_at_the_red_signal() {
        let (steps, table, _) = setup();
        let mut atc = DigitalAtc::default();
        atc.sections.register(0.0, 800.0);
        atc.sections.register(0.0, 2000.0);
        atc.change_signal(0);
        atc.evaluate_patterns(&table, 220, 200.0, 0.0, 0);

        let binding = atc.patterns().binding().copied().expect("binding pattern");
        assert_eq!(binding.entry.target_speed, 0);
        assert_eq!(binding.entry.end_location, 800.0);
        assert_eq!(atc.patterns().len(), 1 + 3 + USER_PATTERNS + 1);

        atc.update_signals(AtcKind::DsAtc, &steps, &table, 220, 0.0);
        assert!(atc.arrow_speed() < 220);
        assert_eq!(atc.arrow_signal(), steps.signal_for_speed(atc.arrow_speed()));
    }

    #[test]
    fn cleared_user_pattern_falls_back_to_max_speed() {
        let (_, table, _) = setup();
        let mut atc = DigitalAtc::default();
        atc.sections.register(0.0, 50_000.0);
        atc.users.register(0, 0.0, 1000 * 1000 + 80);
        atc.evaluate_patterns(&table, 220, 100.0, 0.0, 0);
        assert_eq!(atc.patterns().statuses()[4].entry.target_speed, 80);

        atc.users.register(0, 10.0, 999);
        assert!(!atc.users.is_valid(0));
        atc.evaluate_patterns(&table, 220, 100.0, 10.0, 0);
        let status = atc.patterns().statuses()[4];
        assert_eq!(status.entry.target_speed, 220);
        assert!(status.start_location.is_infinite());
    }

    #[test]
    fn ks_target_switches_at_the_binding_point() {
        let (steps, table, _) = setup();
        let mut atc = DigitalAtc::default();
        atc.sections.register(0.0, 100_000.0);
        atc.users.register(1, 0.0, 5000 * 1000 + 70);
        let binds_at = table.braking_distance(70) - table.braking_distance(220) + 5000.0;

        // Short of the binding point nothing restricts below the maximum.
        atc.evaluate_patterns(&table, 220, 210.0, binds_at - 100.0, 0);
        atc.update_signals(AtcKind::KsAtc, &steps, &table, 220, binds_at - 100.0);
        assert_eq!(atc.target_speed(), 220);
        assert_eq!(atc.target_signal(), 5);

        atc.evaluate_patterns(&table, 220, 210.0, binds_at + 100.0, 0);
        let rang = atc.update_signals(AtcKind::KsAtc, &steps, &table, 220, binds_at + 100.0);
        assert!(atc.arrow_speed() < 220);
        assert_eq!(atc.target_speed(), 70);
        assert_eq!(atc.target_signal(), 2);
        assert!(rang);
    }

    #[test]
    fn ns_arrow_drops_to_zero_under_unconfirmed_emergency() {
        let (steps, table, _) = setup();
        let mut atc = DigitalAtc::default();
        atc.sections.register(0.0, 100_000.0);
        atc.evaluate_patterns(&table, 220, 100.0, 0.0, 0);
        assert!(atc.update_signals(AtcKind::AtcNs, &steps, &table, 220, 0.0));
        assert_eq!(atc.arrow_speed(), 220);

        atc.flags.latch_emergency();
        assert!(atc.update_signals(AtcKind::AtcNs, &steps, &table, 220, 0.0));
        assert_eq!(atc.arrow_signal(), 0);
        assert_eq!(atc.arrow_speed(), 0);
    }

    #[test]
    fn ns_thirty_aspect_latches_service_when_slowing_through() {
        let (steps, table, model) = setup();
        let mut atc = DigitalAtc::default();
        atc.sections.register(0.0, 100_000.0);
        atc.users.register(0, 0.0, 30);
        atc.evaluate_patterns(&table, 220, 35.0, 10.0, 0);
        atc.update_signals(AtcKind::AtcNs, &steps, &table, 220, 10.0);
        assert_eq!(atc.target_signal(), 1);

        let mut calibration = DecelerationCalibration::default();
        let mut inputs = ControlInputs {
            speed: 35.0,
            location: 10.0,
            ..Default::default()
        };
        atc.brake(AtcKind::AtcNs, &model, &inputs, &mut calibration);
        assert!(!atc.flags.service);

        inputs.speed = 29.0;
        assert_eq!(atc.brake(AtcKind::AtcNs, &model, &inputs, &mut calibration), 8);
        assert!(atc.flags.service);

        atc.flags.confirm(29.0);
        assert_eq!(atc.brake(AtcKind::AtcNs, &model, &inputs, &mut calibration), 0);

        inputs.speed = 31.0;
        atc.brake(AtcKind::AtcNs, &model, &inputs, &mut calibration);
        assert!(!atc.flags.service);
    }
}
