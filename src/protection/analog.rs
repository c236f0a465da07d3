//! Analog ATC (ATC-1 / ATC-2): one cab-signal index, step-wise braking.

use bevy::prelude::*;

use crate::config::AtcKind;
use crate::control::{BrakeModel, RampController};

use super::{ProtectionFlags, SpeedSteps};

/// ATC-2 aspects from this value up encode their index as `aspect % 100 - 2`.
const ATC2_ASPECT_BASE: i32 = 102;

#[derive(Clone, Debug, Default)]
pub struct AnalogAtc {
    /// Current cab-signal index.
    pub signal: i32,
    pub flags: ProtectionFlags,
    ramp: RampController,
}

impl AnalogAtc {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply a new wayside aspect. Returns `true` when the cab signal changed.
    ///
    /// `speed` is the speed of the last frame; a release confirmed at
    /// standstill survives the new latch.
    pub fn change_signal(
        &mut self,
        kind: AtcKind,
        aspect: i32,
        steps: &SpeedSteps,
        max_signal: i32,
        speed: f64,
    ) -> bool {
        let mut signal = aspect;
        if kind == AtcKind::Atc2 && signal >= ATC2_ASPECT_BASE {
            signal = signal % 100 - 2;
        }

        if signal < 0 || signal >= steps.len() as i32 {
            warn!("ATC aspect {aspect} is outside the signal table, latching emergency brake");
            self.flags.emergency = true;
            return false;
        }
        let signal = signal.min(max_signal);

        if signal != 0 {
            self.flags.emergency = false;
        }
        if signal != 1 {
            self.flags.service = false;
        }

        let keep_release = speed == 0.0 && self.flags.release_confirmed;
        if signal == 0 && self.signal != 0 {
            self.flags.emergency = true;
            self.flags.release_confirmed = keep_release;
        }
        if signal == 1 && self.signal != 1 {
            self.flags.service = true;
            self.flags.release_confirmed = keep_release;
        }

        let changed = signal != self.signal;
        self.signal = signal;
        changed
    }

    /// Brake notch for this frame.
    #[allow(clippy::too_many_arguments)]
    pub fn brake(
        &mut self,
        kind: AtcKind,
        model: &BrakeModel,
        standard_notches: &[i32; 4],
        steps: &SpeedSteps,
        max_speed: i32,
        speed: f64,
        time: f64,
        applied_notch: i32,
        correction: f64,
    ) -> i32 {
        if let Some(notch) = self.flags.brake_override(model.max_notch) {
            return notch;
        }
        let speed_abs = speed.abs();
        let limit = steps.enforced_speed(kind, self.signal) as f64;
        if speed_abs > limit || speed_abs > max_speed as f64 {
            self.ramp
                .command(model, standard_notches, speed, time, applied_notch, correction)
        } else {
            0
        }
    }
}
