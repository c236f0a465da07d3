//! Predictive fuzzy brake control.
//!
//! Every pattern gets its own slot. An idle slot arms when a two-second
//! dead-reckoning estimate reaches the pattern's start location. An armed
//! slot re-decides its notch once per second by predicting where the train
//! would stop on every notch and scoring those predictions:
//!
//! - stops well: the stop falls inside the tolerance band Xe
//! - stops close: how near the stop is to the end location
//! - comfort: time since the last notch change against its size
//! - unsafe / very unsafe: the full-service stop runs into the overrun margin Xo
//!
//! The device command is the highest notch any slot asks for.

use smallvec::SmallVec;

use crate::config::ProtectionConfig;
use crate::numeric::get_clamped;
use crate::pattern::{PatternSet, PatternStatus, MAX_PATTERNS};

use super::membership::{asymptotic, plateau, trapezoid, triangle, widen};

/// Time between decisions of an armed slot [ms].
pub const DECISION_INTERVAL_MS: f64 = 1000.0;
/// Delay from arming to the first decision [ms].
pub const ARMING_DELAY_MS: f64 = 2000.0;
/// Time a notch must be held before calibrating against it [ms].
pub const CALIBRATION_DELAY_MS: f64 = 2000.0;
/// Look-ahead of the arming estimate [s].
const LOOKAHEAD_SECS: f64 = 2.0;
/// Notches either side of the applied one the close-stop search considers.
const SEARCH_SPAN: i32 = 2;

type NotchScores = SmallVec<[f64; 16]>;

/// Brake characteristics and tolerances the controller works with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrakeModel {
    /// Maximum service notch; emergency is one above.
    pub max_notch: i32,
    /// Deceleration at the maximum service notch [km/h/s].
    pub max_deceleration: f64,
    /// Handle-to-brake delay [s].
    pub lever_delay: f64,
    /// Xe [m].
    pub tolerance: f64,
    /// Xo [m].
    pub overrun: f64,
    /// Xk.
    pub widening: f64,
}

impl BrakeModel {
    pub fn from_config(config: &ProtectionConfig) -> Self {
        Self {
            max_notch: config.max_brake_notch(),
            max_deceleration: config.max_deceleration,
            lever_delay: config.lever_delay,
            tolerance: config.atc.tolerance,
            overrun: config.atc.overrun,
            widening: config.atc.widening,
        }
    }

    /// Nominal deceleration of `notch` [m/s²].
    pub fn notch_deceleration(&self, notch: i32) -> f64 {
        (self.max_deceleration / 3.6) * (notch as f64 / self.max_notch as f64)
    }

    pub fn emergency_notch(&self) -> i32 {
        self.max_notch + 1
    }
}

/// What the controller sees of the train this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControlInputs {
    /// [km/h], signed.
    pub speed: f64,
    /// [m]
    pub location: f64,
    /// Total simulated time [ms].
    pub time: f64,
    /// Brake notch currently in effect (protection or driver, whichever is higher).
    pub applied_notch: i32,
    /// Smoothed acceleration [km/h/s].
    pub ema_accel: f64,
    pub power_notch: i32,
}

/// Tracks notch changes and corrects the nominal deceleration against what
/// the train actually does.
#[derive(Clone, Debug, Default)]
pub struct DecelerationCalibration {
    previous_notch: i32,
    due_time: f64,
    last_change_secs: f64,
    last_change_magnitude: i32,
    correction: f64,
}

impl DecelerationCalibration {
    pub fn observe(&mut self, model: &BrakeModel, inputs: &ControlInputs) {
        if inputs.applied_notch != self.previous_notch {
            self.due_time = inputs.time + CALIBRATION_DELAY_MS;
            self.last_change_secs = inputs.time / 1000.0;
            self.last_change_magnitude = (inputs.applied_notch - self.previous_notch).abs();
            self.previous_notch = inputs.applied_notch;
        } else if inputs.time >= self.due_time
            && inputs.applied_notch < model.emergency_notch()
            && inputs.speed != 0.0
            && inputs.power_notch == 0
        {
            self.correction =
                inputs.ema_accel / 3.6 + model.notch_deceleration(inputs.applied_notch);
        }
    }

    /// Amount the nominal deceleration overstates the real one [m/s²].
    pub fn correction(&self) -> f64 {
        self.correction
    }

    /// Seconds since the applied notch last changed.
    pub fn seconds_since_change(&self, time: f64) -> f64 {
        time / 1000.0 - self.last_change_secs
    }

    pub fn last_change_magnitude(&self) -> i32 {
        self.last_change_magnitude
    }
}

/// Predicted stop location on `notch` [m]. A notch that cannot decelerate
/// the train never stops it.
pub fn predict_stop(
    model: &BrakeModel,
    inputs: &ControlInputs,
    correction: f64,
    target_speed: i32,
    notch: i32,
) -> f64 {
    let deceleration = model.notch_deceleration(notch) - correction;
    if deceleration <= 0.0 {
        return f64::INFINITY;
    }
    let v = inputs.speed / 3.6;
    let target = target_speed as f64 / 3.6;
    let mut location = (v * v - target * target) / (2.0 * deceleration) + inputs.location;
    if notch != inputs.applied_notch {
        location += v * model.lever_delay;
    }
    location
}

/// Membership degrees for one decision.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evaluation {
    /// Predicted stop location per notch `0..=max` [m].
    pub predicted: NotchScores,
    pub stops_well: NotchScores,
    pub stops_close: NotchScores,
    pub comfort_good: f64,
    pub comfort_bad: f64,
    pub unsafe_level: f64,
    pub very_unsafe: f64,
}

pub fn evaluate(
    model: &BrakeModel,
    inputs: &ControlInputs,
    calibration: &DecelerationCalibration,
    target_speed: i32,
    end_location: f64,
) -> Evaluation {
    let excess = inputs.speed.abs() - target_speed as f64;
    let tolerance = widen(excess, model.tolerance, model.widening);
    let overrun = widen(excess, model.overrun, model.widening);

    let predicted: NotchScores = (0..=model.max_notch)
        .map(|notch| predict_stop(model, inputs, calibration.correction(), target_speed, notch))
        .collect();
    let stops_well = predicted
        .iter()
        .map(|&x| trapezoid(x, end_location, tolerance))
        .collect();
    let stops_close = predicted
        .iter()
        .map(|&x| asymptotic(x, end_location, tolerance))
        .collect();

    let changed = calibration.last_change_magnitude() as f64;
    let comfort_good = plateau(
        calibration.seconds_since_change(inputs.time),
        1.0 + changed / 2.0,
        changed / 2.0,
    );

    let full_service = get_clamped(&predicted, model.max_notch as i64);
    Evaluation {
        unsafe_level: triangle(full_service, end_location + overrun / 2.0, overrun),
        very_unsafe: plateau(full_service, end_location + 1.5 * overrun, overrun),
        comfort_bad: 1.0 - comfort_good,
        comfort_good,
        predicted,
        stops_well,
        stops_close,
    }
}

/// Pick the notch for an evaluation; the first matching rule wins.
pub fn decide(evaluation: &Evaluation, applied_notch: i32, max_notch: i32) -> i32 {
    if evaluation.very_unsafe > 0.5 {
        return max_notch + 1;
    }
    if evaluation.unsafe_level > 0.5 {
        return max_notch;
    }
    if get_clamped(&evaluation.stops_well, applied_notch as i64) == 1.0
        || evaluation.comfort_good < evaluation.comfort_bad
    {
        return applied_notch.min(max_notch);
    }

    let low = (applied_notch - SEARCH_SPAN).max(0);
    let high = (applied_notch + SEARCH_SPAN).min(max_notch);
    let mut best: Option<(i32, f64)> = None;
    for notch in low..=high {
        let Some(&score) = evaluation.stops_close.get(notch as usize) else {
            continue;
        };
        // Strictly greater keeps the lowest notch on ties.
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((notch, score));
        }
    }
    match best {
        Some((notch, score)) if score != 0.0 => notch,
        _ => applied_notch,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotPhase {
    #[default]
    Idle,
    Armed,
}

/// Controller state for one pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SlotState {
    pub phase: SlotPhase,
    pub previous_target_speed: i32,
    pub previous_end_location: f64,
    /// Next time an armed slot may decide [ms].
    pub decision_time: f64,
    /// Last notch the slot asked for.
    pub notch: i32,
}

/// One slot per pattern; the command is their maximum.
#[derive(Clone, Debug, Default)]
pub struct FuzzyBrakeController {
    slots: SmallVec<[SlotState; MAX_PATTERNS]>,
}

impl FuzzyBrakeController {
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    /// Index of the slot asking for the most brake.
    pub fn strongest_slot(&self) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if best.map_or(true, |(_, notch)| slot.notch > notch) {
                best = Some((i, slot.notch));
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn select(
        &mut self,
        model: &BrakeModel,
        inputs: &ControlInputs,
        calibration: &DecelerationCalibration,
        patterns: &PatternSet,
    ) -> i32 {
        let statuses = patterns.statuses();
        if self.slots.len() != statuses.len() {
            self.slots.resize(statuses.len(), SlotState::default());
        }

        let mut command = 0;
        for (slot, status) in self.slots.iter_mut().zip(statuses) {
            slot.notch = step_slot(slot, model, inputs, calibration, status);
            command = command.max(slot.notch);
        }
        command
    }
}

fn step_slot(
    slot: &mut SlotState,
    model: &BrakeModel,
    inputs: &ControlInputs,
    calibration: &DecelerationCalibration,
    status: &PatternStatus,
) -> i32 {
    let target = status.entry.target_speed;
    let end = status.entry.end_location;

    if inputs.speed.abs() <= target as f64 {
        slot.phase = SlotPhase::Idle;
        return 0;
    }

    if target != slot.previous_target_speed || end != slot.previous_end_location {
        slot.phase = SlotPhase::Idle;
        slot.previous_target_speed = target;
        slot.previous_end_location = end;
    }

    match slot.phase {
        SlotPhase::Idle => {
            let v = inputs.speed / 3.6;
            let a = inputs.ema_accel / 3.6;
            let estimate = inputs.location
                + v * LOOKAHEAD_SECS
                + 0.5 * a * LOOKAHEAD_SECS * LOOKAHEAD_SECS;
            if estimate < status.start_location {
                return 0;
            }
            slot.phase = SlotPhase::Armed;
            slot.decision_time = inputs.time + ARMING_DELAY_MS;
            if inputs.applied_notch == 0 {
                1
            } else {
                inputs.applied_notch
            }
        }
        SlotPhase::Armed => {
            if inputs.time < slot.decision_time {
                return slot.notch;
            }
            let evaluation = evaluate(model, inputs, calibration, target, end);
            slot.decision_time = inputs.time + DECISION_INTERVAL_MS;
            decide(&evaluation, inputs.applied_notch, model.max_notch)
        }
    }
}
