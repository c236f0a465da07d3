//! Per-frame inputs and outputs of the onboard equipment.

use bevy::prelude::*;

use crate::protection::{AtcOutput, AtspOutput, Chimes};

/// Handle positions in host units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleState {
    pub power: i32,
    /// 0 released, `1..=brake_notches` service, `brake_notches + 1` emergency.
    pub brake: i32,
}

/// What the devices see of the vehicle for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameContext {
    /// [km/h], negative when reversing.
    pub speed: f64,
    /// [m]
    pub location: f64,
    /// Time since the previous frame [ms].
    pub elapsed_ms: f64,
    /// Simulated time since the start of the run [ms].
    pub total_ms: f64,
    pub handles: HandleState,
}

impl FrameContext {
    /// Frames with no elapsed time, or a second or more of it (pauses,
    /// jumps), are skipped.
    pub fn is_runnable(&self) -> bool {
        self.elapsed_ms > 0.0 && self.elapsed_ms < 1000.0
    }
}

/// Result of one onboard frame.
#[derive(Clone, Debug, Default)]
pub struct FrameOutput {
    /// Combined protection command in protection notch units.
    pub brake_notch: i32,
    /// Brake handle position forced on the vehicle, when protection brakes
    /// harder than the driver.
    pub brake_override: Option<i32>,
    /// Power is cut whenever the brake is overridden.
    pub cut_power: bool,
    pub atc: AtcOutput,
    pub atsp: AtspOutput,
    pub chimes: Chimes,
}

/// Vehicle state as last integrated by the dynamics.
#[derive(Resource, Clone, Debug, Default)]
pub struct VehicleState {
    pub speed: f64,
    pub location: f64,
    pub total_ms: f64,
    /// Handles as the driver set them.
    pub handles: HandleState,
}

impl VehicleState {
    pub fn frame(&self, elapsed_ms: f64) -> FrameContext {
        FrameContext {
            speed: self.speed,
            location: self.location,
            elapsed_ms,
            total_ms: self.total_ms,
            handles: self.handles,
        }
    }
}

/// What protection currently imposes on the vehicle.
#[derive(Resource, Clone, Debug, Default)]
pub struct ProtectionCommand {
    pub brake_notch: i32,
    pub brake_override: Option<i32>,
    pub cut_power: bool,
    pub atc_active: bool,
    /// Cab-signal speed shown to the driver [km/h].
    pub atc_speed: i32,
    pub atsp_approach: bool,
}

impl ProtectionCommand {
    pub fn apply(&mut self, output: &FrameOutput) {
        self.brake_notch = output.brake_notch;
        self.brake_override = output.brake_override;
        self.cut_power = output.cut_power;
        self.atc_active = output.atc.indicators.active;
        self.atc_speed = output.atc.indicators.atc_speed;
        self.atsp_approach = output.atsp.indicators.approach;
    }

    /// Handles the vehicle actually obeys.
    pub fn effective_handles(&self, driver: HandleState) -> HandleState {
        HandleState {
            power: if self.cut_power { 0 } else { driver.power },
            brake: self.brake_override.unwrap_or(driver.brake).max(driver.brake),
        }
    }
}
