//! Onboard equipment: the `Train` that owns every device, and the plugin
//! that feeds it wayside events and simulation ticks.
//!
//! Devices run in a fixed order each frame (acceleration estimator, ATC,
//! ATS-P, brake release detector). The stronger of the ATC and ATS-P
//! commands is imposed on the vehicle.

use bevy::prelude::*;

use crate::config::{ProtectionConfig, VehicleSpecs};
use crate::control::AccelerationEstimator;
use crate::protection::{Atc, AtsP, BrakeReleaseDetector, Chime, Chimes};
use crate::simulation::{SimulationSet, SimulationTick};

pub mod beacon;
pub mod frame;

use beacon::BeaconData;
use frame::{FrameContext, FrameOutput, ProtectionCommand, VehicleState};

pub struct OnboardPlugin;

impl Plugin for OnboardPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VehicleState>()
            .init_resource::<ProtectionCommand>()
            .add_event::<BeaconPassed>()
            .add_event::<SignalChanged>()
            .add_event::<AtsKeyEvent>()
            .add_event::<ProtectionChime>()
            .add_systems(
                Update,
                (run_protection, log_chimes)
                    .chain()
                    .in_set(SimulationSet::Protection)
                    .run_if(resource_exists::<Train>),
            );
    }
}

/// The train passed a wayside beacon.
#[derive(Event, Clone, Copy, Debug)]
pub struct BeaconPassed(pub BeaconData);

/// The aspect of the section the train occupies changed.
#[derive(Event, Clone, Copy, Debug)]
pub struct SignalChanged {
    pub aspect: i32,
}

/// Cab keys the protection devices listen to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtsKey {
    /// ATC confirm (S).
    Confirm,
    /// ATS-P brake release (B1).
    AtspReset,
    AtcCutIn,
    AtcCutOut,
    AtspCutIn,
    AtspCutOut,
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtsKeyEvent {
    pub key: AtsKey,
    pub pressed: bool,
}

/// A device asked for a chime.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtectionChime(pub Chime);

/// Every onboard device of one train.
#[derive(Resource, Clone, Debug)]
pub struct Train {
    specs: VehicleSpecs,
    accel: AccelerationEstimator,
    atc: Atc,
    atsp: AtsP,
    release: BrakeReleaseDetector,
}

impl Train {
    pub fn new(config: &ProtectionConfig) -> Self {
        Self {
            specs: config.vehicle,
            accel: AccelerationEstimator::default(),
            atc: Atc::new(config),
            atsp: AtsP::new(config),
            release: BrakeReleaseDetector::default(),
        }
    }

    pub fn initialize(&mut self) {
        self.accel.reset();
        self.atc.initialize();
        self.atsp.initialize();
        self.release.reset();
    }

    /// Run every device for one frame. Frames that are not runnable are
    /// skipped and leave all state untouched.
    pub fn elapse(&mut self, frame: &FrameContext) -> Option<FrameOutput> {
        if !frame.is_runnable() {
            return None;
        }
        self.accel.update(frame.speed, frame.elapsed_ms / 1000.0);
        let atc = self.atc.elapse(frame, self.accel.ema());
        let atsp = self.atsp.elapse(frame);

        let mut chimes = Chimes::new();
        chimes.extend(atc.chimes.iter().copied());
        chimes.extend(atsp.chimes.iter().copied());
        if let Some(chime) = self.release.update(atc.brake_notch) {
            chimes.push(chime);
        }

        let brake_notch = atc.brake_notch.max(atsp.brake_notch);
        let driver_notch = self.specs.notch_from_handle(frame.handles.brake);
        let brake_override =
            (brake_notch > driver_notch).then(|| self.specs.handle_from_notch(brake_notch));

        Some(FrameOutput {
            brake_notch,
            brake_override,
            cut_power: brake_override.is_some(),
            atc,
            atsp,
            chimes,
        })
    }

    /// Queue a beacon on both devices; they drain it next frame.
    pub fn pass_beacon(&mut self, beacon: BeaconData) {
        self.atc.push_beacon(beacon);
        self.atsp.push_beacon(beacon);
    }

    pub fn change_signal(&mut self, aspect: i32) {
        self.atc.change_signal(aspect);
    }

    pub fn key_down(&mut self, key: AtsKey) {
        match key {
            AtsKey::Confirm => self.atc.press_confirm(),
            AtsKey::AtspReset => self.atsp.press_reset(),
            AtsKey::AtcCutIn => self.atc.start(),
            AtsKey::AtcCutOut => self.atc.stop(),
            AtsKey::AtspCutIn => self.atsp.start(),
            AtsKey::AtspCutOut => self.atsp.stop(),
        }
    }

    pub fn key_up(&mut self, key: AtsKey) {
        if key == AtsKey::Confirm {
            self.atc.release_confirm();
        }
    }

    pub fn atc(&self) -> &Atc {
        &self.atc
    }

    pub fn atsp(&self) -> &AtsP {
        &self.atsp
    }

    pub fn acceleration(&self) -> &AccelerationEstimator {
        &self.accel
    }
}

/// Wayside events and keys go in first so the devices see them this tick.
#[allow(clippy::too_many_arguments)]
fn run_protection(
    mut train: ResMut<Train>,
    vehicle: Res<VehicleState>,
    mut command: ResMut<ProtectionCommand>,
    mut ticks: EventReader<SimulationTick>,
    mut beacons: EventReader<BeaconPassed>,
    mut signals: EventReader<SignalChanged>,
    mut keys: EventReader<AtsKeyEvent>,
    mut chimes: EventWriter<ProtectionChime>,
) {
    for event in keys.read() {
        if event.pressed {
            train.key_down(event.key);
        } else {
            train.key_up(event.key);
        }
    }
    for SignalChanged { aspect } in signals.read() {
        train.change_signal(*aspect);
    }
    for BeaconPassed(beacon) in beacons.read() {
        train.pass_beacon(*beacon);
    }

    for tick in ticks.read() {
        let frame = vehicle.frame(f64::from(tick.delta) * 1000.0);
        let Some(output) = train.elapse(&frame) else {
            continue;
        };
        if output.brake_override != command.brake_override {
            match output.brake_override {
                Some(handle) => info!(
                    "Protection brake B{} at {:.1} km/h, {:.1} m",
                    handle, frame.speed, frame.location
                ),
                None => info!("Protection brake released at {:.1} m", frame.location),
            }
        }
        command.apply(&output);
        for chime in output.chimes {
            chimes.send(ProtectionChime(chime));
        }
    }
}

fn log_chimes(mut chimes: EventReader<ProtectionChime>) {
    for ProtectionChime(chime) in chimes.read() {
        debug!("Chime {:?}", chime);
    }
}
