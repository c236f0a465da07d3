//! Protection devices: ATC (analog and digital variants) and ATS-P.
//!
//! Each device owns its registries, pattern table and beacon queue. The
//! onboard `Train` feeds them one frame at a time and combines their brake
//! commands.

use smallvec::SmallVec;

pub mod analog;
pub mod atc;
pub mod atsp;
pub mod digital;
pub mod signal;

pub use atc::{Atc, AtcIndicators, AtcOutput};
pub use atsp::{AtsP, AtspIndicators, AtspOutput};
pub use signal::SpeedSteps;

/// Audible notifications raised by the devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Chime {
    AtcBell,
    AtspBell,
    /// The ATC brake has just released.
    AtcAirRelease,
    ConfirmSwitchDown,
    ConfirmSwitchUp,
}

pub type Chimes = SmallVec<[Chime; 4]>;

/// Latched brake demands and the driver's release confirmation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtectionFlags {
    /// Emergency brake latched (stop aspect or stop-limit loop).
    pub emergency: bool,
    /// Full service brake latched (30 km/h aspect).
    pub service: bool,
    pub release_confirmed: bool,
}

impl ProtectionFlags {
    /// Notch the latches force, if any. A confirmed release takes precedence.
    pub fn brake_override(&self, max_notch: i32) -> Option<i32> {
        if (self.emergency || self.service) && self.release_confirmed {
            Some(0)
        } else if self.emergency {
            Some(max_notch + 1)
        } else if self.service {
            Some(max_notch)
        } else {
            None
        }
    }

    /// Confirm key: the emergency latch releases at standstill, the service
    /// latch at 30 km/h or below.
    pub fn confirm(&mut self, speed: f64) {
        if speed == 0.0 && self.emergency {
            self.release_confirmed = true;
        }
        if speed.abs() <= 30.0 && self.service {
            self.release_confirmed = true;
        }
    }

    /// Latch the emergency brake, dropping any earlier confirmation.
    /// Returns `false` when it was already latched.
    pub fn latch_emergency(&mut self) -> bool {
        if self.emergency {
            return false;
        }
        self.emergency = true;
        self.release_confirmed = false;
        true
    }
}

/// Watches the ATC command for the moment its brake releases.
#[derive(Clone, Debug, Default)]
pub struct BrakeReleaseDetector {
    applied: bool,
}

impl BrakeReleaseDetector {
    pub fn reset(&mut self) {
        self.applied = false;
    }

    pub fn update(&mut self, atc_notch: i32) -> Option<Chime> {
        let applied = atc_notch > 0;
        let released = applied != self.applied && !applied;
        self.applied = applied;
        released.then_some(Chime::AtcAirRelease)
    }
}
