//! Step-wise brake ramp used by analog ATC when the train exceeds the cab
//! signal speed.

use crate::numeric::get_clamped;

use super::fuzzy::{BrakeModel, DECISION_INTERVAL_MS};

/// Raises the brake one notch at a time, at most once per second, until the
/// notch matching the standard deceleration for the current speed is reached.
#[derive(Clone, Debug, Default)]
pub struct RampController {
    next_step_time: f64,
}

impl RampController {
    pub fn reset(&mut self) {
        self.next_step_time = 0.0;
    }

    /// Notch the standard deceleration for `speed` calls for, after correcting
    /// for the measured brake performance.
    pub fn required_notch(
        model: &BrakeModel,
        standard_notches: &[i32; 4],
        speed: f64,
        correction: f64,
    ) -> i32 {
        let speed = speed.abs();
        // Above 110 km/h (including the >160 band) the 111-160 notch applies.
        let band = if speed > 110.0 {
            1
        } else if speed > 70.0 {
            2
        } else {
            3
        };
        let standard = get_clamped(standard_notches, band) as f64;
        let full = model.max_deceleration / 3.6;
        let required = (standard + correction / full * model.max_notch as f64).ceil() as i32;
        required.clamp(0, model.max_notch)
    }

    /// Next notch given the one currently applied [ms for `time`].
    pub fn command(
        &mut self,
        model: &BrakeModel,
        standard_notches: &[i32; 4],
        speed: f64,
        time: f64,
        applied_notch: i32,
        correction: f64,
    ) -> i32 {
        let required = Self::required_notch(model, standard_notches, speed, correction);
        if applied_notch < required && time > self.next_step_time {
            self.next_step_time = time + DECISION_INTERVAL_MS;
            applied_notch + 1
        } else {
            applied_notch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BrakeModel {
        BrakeModel {
            max_notch: 8,
            max_deceleration: 2.7,
            lever_delay: 0.25,
            tolerance: 5.0,
            overrun: 10.0,
            widening: 0.0,
        }
    }

    #[test]
    fn required_notch_follows_speed_band() {
        let model = model();
        let notches = [4, 6, 7, 8];
        assert_eq!(RampController::required_notch(&model, &notches, 200.0, 0.0), 6);
        assert_eq!(RampController::required_notch(&model, &notches, 90.0, 0.0), 7);
        assert_eq!(RampController::required_notch(&model, &notches, -40.0, 0.0), 8);
    }

    #[test]
    fn weak_brakes_raise_the_requirement() {
        let model = model();
        let notches = [4, 6, 7, 8];
        let weak = RampController::required_notch(&model, &notches, 90.0, 0.1);
        assert_eq!(weak, 8);
    }

    #[test]
    fn ramps_one_notch_per_second() {
        let model = model();
        let notches = [4, 6, 7, 8];
        let mut ramp = RampController::default();
        let mut notch = 0;
        let mut time = 50.0;
        let mut steps = Vec::new();
        while time <= 4000.0 {
            let next = ramp.command(&model, &notches, 150.0, time, notch, 0.0);
            if next != notch {
                steps.push(time);
            }
            notch = next;
            time += 50.0;
        }
        assert_eq!(notch, 4);
        assert_eq!(steps, vec![50.0, 1100.0, 2150.0, 3200.0]);
    }

    #[test]
    fn never_steps_down() {
        let model = model();
        let mut ramp = RampController::default();
        assert_eq!(ramp.command(&model, &[4, 6, 7, 8], 150.0, 100.0, 8, 0.0), 8);
    }
}
