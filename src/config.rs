//! Protection configuration shared by the ATC and ATS-P devices.
//!
//! Built once at startup (defaults mirror a typical EMU) and handed to the
//! devices by reference. Loading from files is left to the host.

use bevy::prelude::*;
use thiserror::Error;

/// Reasons a configuration cannot drive the protection devices.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("maximum service deceleration must be positive, got {0} km/h/s")]
    NonPositiveDeceleration(f64),
    #[error("ATC band deceleration #{index} must be positive, got {value} km/h/s")]
    NonPositiveBand { index: usize, value: f64 },
    #[error("ATS-P deceleration must be positive, got {0} km/h/s")]
    NonPositiveAtspDeceleration(f64),
    #[error("no service notches above the ATS notch (brake notches {brake_notches}, ATS notch {ats_notch})")]
    NoServiceNotches { brake_notches: i32, ats_notch: i32 },
    #[error("ATC speed steps must be non-empty and ascending")]
    UnorderedSpeedSteps,
    #[error("{device} maximum speed {speed} km/h is outside 1..={limit}")]
    MaxSpeedOutOfRange {
        device: &'static str,
        speed: i32,
        limit: i32,
    },
    #[error("stopping tolerances must be positive (Xe {tolerance} m, Xo {overrun} m)")]
    InvalidTolerance { tolerance: f64, overrun: f64 },
    #[error("lever delay must not be negative, got {0} s")]
    NegativeLeverDelay(f64),
}

/// Highest speed any pattern table is built for.
pub const SPEED_LIMIT: i32 = 400;

/// ATC protocol family. The first two use analog two-level signalling, the
/// rest are pattern based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AtcKind {
    /// ATC-1 (Tokaido/Sanyo style analog).
    #[default]
    Atc1,
    /// ATC-2 (Tohoku/Joetsu style analog).
    Atc2,
    /// ATC-NS digital.
    AtcNs,
    /// KS-ATC digital.
    KsAtc,
    /// DS-ATC digital.
    DsAtc,
}

impl AtcKind {
    /// Decode the numeric kind carried by a kind-switch beacon.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Atc1),
            1 => Some(Self::Atc2),
            2 => Some(Self::AtcNs),
            3 => Some(Self::KsAtc),
            4 => Some(Self::DsAtc),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Atc1 => 0,
            Self::Atc2 => 1,
            Self::AtcNs => 2,
            Self::KsAtc => 3,
            Self::DsAtc => 4,
        }
    }

    pub fn is_analog(self) -> bool {
        matches!(self, Self::Atc1 | Self::Atc2)
    }
}

/// Brake handle layout of the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VehicleSpecs {
    /// Number of service brake handle positions.
    pub brake_notches: i32,
    /// Handle position the protection devices treat as their notch 1.
    pub ats_notch: i32,
}

impl Default for VehicleSpecs {
    fn default() -> Self {
        Self {
            brake_notches: 8,
            ats_notch: 1,
        }
    }
}

impl VehicleSpecs {
    /// Maximum service notch in protection units (emergency is one above).
    pub fn max_brake_notch(&self) -> i32 {
        self.brake_notches - self.ats_notch + 1
    }

    /// Convert a host brake handle position into protection notch units.
    pub fn notch_from_handle(&self, handle: i32) -> i32 {
        if handle == 0 {
            0
        } else {
            handle - self.ats_notch + 1
        }
    }

    /// Host handle position for a protection notch.
    pub fn handle_from_notch(&self, notch: i32) -> i32 {
        if notch == 0 {
            0
        } else {
            notch + self.ats_notch - 1
        }
    }

    /// Handle position of the emergency brake.
    pub fn emergency_handle(&self) -> i32 {
        self.brake_notches + 1
    }
}

/// ATC section of the configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AtcSettings {
    pub enabled: bool,
    pub kind: AtcKind,
    /// Vehicle ATC maximum speed [km/h].
    pub max_speed: i32,
    /// Speed for each cab-signal index [km/h], ascending.
    pub speed_steps: Vec<i32>,
    /// Standard decelerations [km/h/s] for >160, 111-160, 71-110 and 0-70 km/h.
    pub band_decelerations: [f64; 4],
    /// Xe: allowed stopping error around the end location [m].
    pub tolerance: f64,
    /// Xo: over-travel limit beyond the end location [m].
    pub overrun: f64,
    /// Xk: coefficient widening Xe/Xo at high speed.
    pub widening: f64,
}

impl Default for AtcSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: AtcKind::Atc1,
            max_speed: 220,
            speed_steps: vec![0, 30, 70, 120, 170, 220, 230, 255, 270, 275, 285, 300],
            band_decelerations: [1.5, 1.9, 2.4, 2.6],
            tolerance: 5.0,
            overrun: 10.0,
            widening: 0.0,
        }
    }
}

/// ATS-P section of the configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AtspSettings {
    pub enabled: bool,
    /// Vehicle ATS-P maximum speed [km/h].
    pub max_speed: i32,
    /// ATS-P braking deceleration [km/h/s].
    pub deceleration: f64,
}

impl Default for AtspSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_speed: 140,
            deceleration: 2.6,
        }
    }
}

/// Everything the protection core reads from configuration.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct ProtectionConfig {
    /// Maximum service deceleration [km/h/s].
    pub max_deceleration: f64,
    /// Delay from a handle movement to the brake command taking effect [s].
    pub lever_delay: f64,
    pub vehicle: VehicleSpecs,
    pub atc: AtcSettings,
    pub atsp: AtspSettings,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            max_deceleration: 2.7,
            lever_delay: 0.25,
            vehicle: VehicleSpecs::default(),
            atc: AtcSettings::default(),
            atsp: AtspSettings::default(),
        }
    }
}

impl ProtectionConfig {
    /// Check every value the devices divide by or index with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_deceleration <= 0.0 {
            return Err(ConfigError::NonPositiveDeceleration(self.max_deceleration));
        }
        if self.lever_delay < 0.0 {
            return Err(ConfigError::NegativeLeverDelay(self.lever_delay));
        }
        if self.vehicle.max_brake_notch() < 1 {
            return Err(ConfigError::NoServiceNotches {
                brake_notches: self.vehicle.brake_notches,
                ats_notch: self.vehicle.ats_notch,
            });
        }
        for (index, &value) in self.atc.band_decelerations.iter().enumerate() {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveBand { index, value });
            }
        }
        if self.atsp.deceleration <= 0.0 {
            return Err(ConfigError::NonPositiveAtspDeceleration(self.atsp.deceleration));
        }
        let steps = &self.atc.speed_steps;
        if steps.is_empty() || steps.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::UnorderedSpeedSteps);
        }
        for (device, speed) in [("ATC", self.atc.max_speed), ("ATS-P", self.atsp.max_speed)] {
            if !(1..=SPEED_LIMIT).contains(&speed) {
                return Err(ConfigError::MaxSpeedOutOfRange {
                    device,
                    speed,
                    limit: SPEED_LIMIT,
                });
            }
        }
        if self.atc.tolerance <= 0.0 || self.atc.overrun <= 0.0 {
            return Err(ConfigError::InvalidTolerance {
                tolerance: self.atc.tolerance,
                overrun: self.atc.overrun,
            });
        }
        Ok(())
    }

    pub fn max_brake_notch(&self) -> i32 {
        self.vehicle.max_brake_notch()
    }

    /// Deceleration produced by `notch` [m/s²].
    pub fn notch_deceleration(&self, notch: f64) -> f64 {
        (self.max_deceleration / 3.6) * (notch / self.max_brake_notch() as f64)
    }

    /// Notch whose nominal deceleration is closest to `deceleration` [km/h/s].
    pub fn standard_notch(&self, deceleration: f64) -> i32 {
        ((deceleration / self.max_deceleration) * self.max_brake_notch() as f64).round() as i32
    }

    /// Standard notch of each ATC band, fastest band first.
    pub fn standard_notches(&self) -> [i32; 4] {
        self.atc.band_decelerations.map(|d| self.standard_notch(d))
    }
}
