//! Scripted driver: powers up to the cab-signal speed, brakes for the
//! station stop, yields to protection and confirms after a reaction delay.

use bevy::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use smallvec::SmallVec;

use crate::config::{ProtectionConfig, VehicleSpecs};
use crate::onboard::frame::{HandleState, ProtectionCommand, VehicleState};
use crate::onboard::{AtsKey, AtsKeyEvent};

use super::route::Route;
use super::{SimulationSet, SimulationTick};

pub struct DriverPlugin;

impl Plugin for DriverPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DriverConfig>().add_systems(
            Update,
            drive
                .in_set(SimulationSet::Driver)
                .run_if(resource_exists::<Driver>),
        );
    }
}

#[derive(Resource, Clone, Debug)]
pub struct DriverConfig {
    /// Speed the driver never exceeds [km/h].
    pub cruise_speed: f64,
    /// Distance kept below the cab-signal speed [km/h].
    pub speed_margin: f64,
    /// Deceleration the driver plans station stops with [km/h/s].
    pub service_deceleration: f64,
    /// Stopping short of the stop location by up to this much is accepted [m].
    pub stop_tolerance: f64,
    pub power_notch: i32,
    /// Reaction delay range [s].
    pub reaction_secs: (f64, f64),
    pub seed: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 200.0,
            speed_margin: 5.0,
            service_deceleration: 1.8,
            stop_tolerance: 50.0,
            power_notch: 5,
            reaction_secs: (0.6, 1.8),
            seed: 42,
        }
    }
}

/// Handle positions and key events for one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DriverAction {
    pub handles: HandleState,
    pub keys: SmallVec<[AtsKeyEvent; 2]>,
}

#[derive(Resource, Clone, Debug)]
pub struct Driver {
    rng: StdRng,
    /// Key to press and the simulated time to press it at [ms].
    pending: Option<(AtsKey, f64)>,
    held: Option<AtsKey>,
    last_key: Option<AtsKey>,
}

impl Driver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pending: None,
            held: None,
            last_key: None,
        }
    }

    pub fn decide(
        &mut self,
        config: &DriverConfig,
        specs: &VehicleSpecs,
        vehicle: &VehicleState,
        command: &ProtectionCommand,
        stop_location: f64,
    ) -> DriverAction {
        let mut action = DriverAction::default();
        let speed = vehicle.speed;
        let protected = command.brake_override.is_some();

        // Keys are held for exactly one tick.
        if let Some(key) = self.held.take() {
            action.keys.push(AtsKeyEvent {
                key,
                pressed: false,
            });
        } else if let Some((key, at)) = self.pending {
            if vehicle.total_ms >= at {
                self.pending = None;
                self.held = Some(key);
                self.last_key = Some(key);
                action.keys.push(AtsKeyEvent { key, pressed: true });
            }
        } else if protected && speed <= 30.0 {
            // Confirm first; at standstill alternate with the ATS-P reset.
            let key = if speed == 0.0 && self.last_key == Some(AtsKey::Confirm) {
                AtsKey::AtspReset
            } else {
                AtsKey::Confirm
            };
            let (min, max) = config.reaction_secs;
            let delay = if max > min {
                self.rng.gen_range(min..max)
            } else {
                min
            };
            self.pending = Some((key, vehicle.total_ms + delay * 1000.0));
        }

        let to_stop = stop_location - vehicle.location;
        let stopping_distance =
            (speed / 3.6).powi(2) / (2.0 * config.service_deceleration / 3.6);
        let limit = if command.atc_active {
            (f64::from(command.atc_speed) - config.speed_margin).min(config.cruise_speed)
        } else {
            config.cruise_speed
        };

        action.handles = if speed == 0.0 && (protected || to_stop <= config.stop_tolerance) {
            // Hold at standstill; the emergency position also satisfies the
            // ATS-P reset condition.
            let brake = if protected {
                specs.emergency_handle()
            } else {
                specs.brake_notches
            };
            HandleState { power: 0, brake }
        } else if to_stop <= stopping_distance + 20.0 {
            HandleState {
                power: 0,
                brake: station_brake(specs, config, speed, to_stop),
            }
        } else if protected {
            HandleState::default()
        } else if speed > limit + 2.0 {
            HandleState { power: 0, brake: 2 }
        } else if speed < limit - 3.0 {
            HandleState {
                power: config.power_notch,
                brake: 0,
            }
        } else {
            HandleState::default()
        };
        action
    }
}

/// Service notch that stops the train `to_stop` metres ahead.
fn station_brake(specs: &VehicleSpecs, config: &DriverConfig, speed: f64, to_stop: f64) -> i32 {
    if to_stop <= 1.0 {
        return specs.brake_notches;
    }
    // [km/h/s]
    let required = (speed / 3.6).powi(2) / (2.0 * to_stop) * 3.6;
    let per_notch = config.service_deceleration * 1.5 / f64::from(specs.brake_notches.max(1));
    ((required / per_notch).ceil() as i32).clamp(1, specs.brake_notches)
}

#[allow(clippy::too_many_arguments)]
fn drive(
    mut ticks: EventReader<SimulationTick>,
    config: Res<DriverConfig>,
    protection: Res<ProtectionConfig>,
    route: Res<Route>,
    command: Res<ProtectionCommand>,
    mut driver: ResMut<Driver>,
    mut vehicle: ResMut<VehicleState>,
    mut keys: EventWriter<AtsKeyEvent>,
) {
    for _ in ticks.read() {
        let action = driver.decide(
            &config,
            &protection.vehicle,
            &vehicle,
            &command,
            route.stop_location(),
        );
        vehicle.handles = action.handles;
        for key in action.keys {
            keys.send(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(speed: f64, location: f64, total_ms: f64) -> VehicleState {
        VehicleState {
            speed,
            location,
            total_ms,
            ..Default::default()
        }
    }

    fn cab(atc_speed: i32) -> ProtectionCommand {
        ProtectionCommand {
            atc_active: true,
            atc_speed,
            ..Default::default()
        }
    }

    #[test]
    fn powers_below_the_cab_signal_and_brakes_above_it() {
        let config = DriverConfig::default();
        let specs = VehicleSpecs::default();
        let mut driver = Driver::new(1);

        let action = driver.decide(&config, &specs, &vehicle(80.0, 0.0, 0.0), &cab(120), 20_000.0);
        assert_eq!(action.handles, HandleState { power: 5, brake: 0 });

        let action = driver.decide(&config, &specs, &vehicle(130.0, 0.0, 0.0), &cab(120), 20_000.0);
        assert_eq!(action.handles, HandleState { power: 0, brake: 2 });
    }

    #[test]
    fn confirms_after_reaction_delay_and_holds_the_brake() {
        let config = DriverConfig::default();
        let specs = VehicleSpecs::default();
        let mut driver = Driver::new(7);
        let command = ProtectionCommand {
            brake_override: Some(9),
            ..cab(0)
        };

        let action = driver.decide(&config, &specs, &vehicle(0.0, 500.0, 0.0), &command, 20_000.0);
        assert!(action.keys.is_empty());
        assert_eq!(action.handles.brake, specs.emergency_handle());

        let mut pressed_at = None;
        for step in 1..=40 {
            let now = f64::from(step) * 50.0;
            let action = driver.decide(&config, &specs, &vehicle(0.0, 500.0, now), &command, 20_000.0);
            if let Some(event) = action.keys.first() {
                assert_eq!(event.key, AtsKey::Confirm);
                assert!(event.pressed);
                pressed_at = Some(now);
                break;
            }
        }
        let pressed_at = pressed_at.expect("confirm pressed within two seconds");
        assert!(pressed_at >= 600.0);

        let action =
            driver.decide(&config, &specs, &vehicle(0.0, 500.0, pressed_at + 50.0), &command, 20_000.0);
        assert_eq!(
            action.keys.as_slice(),
            &[AtsKeyEvent {
                key: AtsKey::Confirm,
                pressed: false
            }]
        );
    }

    #[test]
    fn brakes_for_the_station_stop() {
        let config = DriverConfig::default();
        let specs = VehicleSpecs::default();
        let mut driver = Driver::new(3);

        let action = driver.decide(&config, &specs, &vehicle(100.0, 9000.0, 0.0), &cab(220), 9400.0);
        assert_eq!(action.handles.power, 0);
        assert!(action.handles.brake >= 1);

        let action = driver.decide(&config, &specs, &vehicle(0.0, 9390.0, 0.0), &cab(220), 9400.0);
        assert_eq!(action.handles, HandleState { power: 0, brake: 8 });
    }
}
