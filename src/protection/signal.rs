//! Cab-signal index to speed lookup.

use crate::config::AtcKind;
use crate::numeric::{get_clamped, upper_bound};

/// Speed of every cab-signal index, ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpeedSteps {
    steps: Vec<i32>,
}

impl SpeedSteps {
    pub fn new(steps: Vec<i32>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Highest index whose speed does not exceed `speed`, never below 0.
    pub fn signal_for_speed(&self, speed: i32) -> i32 {
        (upper_bound(&self.steps, 0, self.steps.len(), &speed) as i32 - 1).max(0)
    }

    /// Speed shown on the cab display for `index`.
    pub fn display_speed(&self, index: i32) -> i32 {
        get_clamped(&self.steps, index as i64)
    }

    /// Speed the brake checks against for `index`.
    ///
    /// ATC-1 enforces 5 km/h above the displayed speed from 220 km/h and
    /// 3 km/h above it from 300 km/h.
    pub fn enforced_speed(&self, kind: AtcKind, index: i32) -> i32 {
        let speed = self.display_speed(index);
        match kind {
            AtcKind::Atc1 if speed >= 300 => speed + 3,
            AtcKind::Atc1 if speed >= 220 => speed + 5,
            _ => speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> SpeedSteps {
        SpeedSteps::new(vec![0, 30, 70, 120, 170, 220, 230, 255, 270, 275, 285, 300])
    }

    #[test]
    fn signal_is_the_highest_step_not_above_speed() {
        let steps = steps();
        assert_eq!(steps.signal_for_speed(0), 0);
        assert_eq!(steps.signal_for_speed(69), 1);
        assert_eq!(steps.signal_for_speed(70), 2);
        assert_eq!(steps.signal_for_speed(220), 5);
        assert_eq!(steps.signal_for_speed(999), 11);
        assert_eq!(steps.signal_for_speed(-5), 0);
    }

    #[test]
    fn atc1_adds_margin_only_when_enforcing() {
        let steps = steps();
        assert_eq!(steps.display_speed(5), 220);
        assert_eq!(steps.enforced_speed(AtcKind::Atc1, 5), 225);
        assert_eq!(steps.enforced_speed(AtcKind::Atc1, 11), 303);
        assert_eq!(steps.enforced_speed(AtcKind::Atc1, 4), 170);
        assert_eq!(steps.enforced_speed(AtcKind::Atc2, 5), 220);
        assert_eq!(steps.enforced_speed(AtcKind::AtcNs, 40), 300);
    }
}
