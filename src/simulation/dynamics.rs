//! Longitudinal vehicle dynamics: traction curve, notch-proportional
//! braking, running resistance and a noise-generated gradient profile.

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

use crate::config::{ProtectionConfig, VehicleSpecs};
use crate::numeric::interpolate;
use crate::onboard::frame::{HandleState, ProtectionCommand, VehicleState};

use super::{SimulationSet, SimulationTick};

/// Gravity expressed in km/h/s per unit grade.
const GRAVITY_KMHS: f64 = 9.80665 * 3.6;

pub struct DynamicsPlugin;

impl Plugin for DynamicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DynamicsConfig>().add_systems(
            Update,
            integrate_vehicle
                .in_set(SimulationSet::Dynamics)
                .run_if(resource_exists::<VehicleDynamics>),
        );
    }
}

/// Configuration of the simulated vehicle.
#[derive(Resource, Clone, Debug)]
pub struct DynamicsConfig {
    /// Speeds of the traction curve [km/h], ascending.
    pub traction_speeds: Vec<f64>,
    /// Acceleration at full power for each traction speed [km/h/s].
    pub traction_acceleration: Vec<f64>,
    /// Number of power notches.
    pub power_notches: i32,
    /// Fraction of the nominal notch deceleration actually achieved.
    pub brake_efficiency: f64,
    /// Running resistance `a + b·v²` [km/h/s].
    pub resistance: [f64; 2],
    /// Seed of the gradient noise.
    pub grade_seed: u32,
    /// Peak gradient [‰].
    pub grade_amplitude: f64,
    /// Length of the longest gradient wave [m].
    pub grade_wavelength: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            traction_speeds: vec![0.0, 40.0, 80.0, 120.0, 160.0, 200.0, 240.0],
            traction_acceleration: vec![2.6, 2.6, 2.0, 1.3, 0.8, 0.5, 0.25],
            power_notches: 5,
            brake_efficiency: 1.0,
            resistance: [0.02, 0.000_004],
            grade_seed: 7,
            grade_amplitude: 10.0,
            grade_wavelength: 3000.0,
        }
    }
}

/// Integrates the vehicle state one tick at a time.
#[derive(Resource, Clone, Debug)]
pub struct VehicleDynamics {
    config: DynamicsConfig,
    specs: VehicleSpecs,
    /// Deceleration of the maximum service notch [km/h/s].
    max_deceleration: f64,
    perlin: Perlin,
}

impl VehicleDynamics {
    pub fn new(config: DynamicsConfig, protection: &ProtectionConfig) -> Self {
        Self {
            perlin: Perlin::new(config.grade_seed),
            config,
            specs: protection.vehicle,
            max_deceleration: protection.max_deceleration,
        }
    }

    /// Gradient at `location` [‰], positive uphill.
    pub fn grade_at(&self, location: f64) -> f64 {
        let x = location / self.config.grade_wavelength.max(1.0);

        // Octave noise for rolling terrain.
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        for _ in 0..3 {
            value += self.perlin.get([x * frequency, 0.5]) * amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        (value / 1.75).clamp(-1.0, 1.0) * self.config.grade_amplitude
    }

    /// Tractive acceleration [km/h/s].
    pub fn traction(&self, power: i32, speed: f64) -> f64 {
        let notches = self.config.power_notches.max(1);
        let full = interpolate(
            &self.config.traction_speeds,
            &self.config.traction_acceleration,
            speed.abs(),
        );
        full * f64::from(power.clamp(0, notches)) / f64::from(notches)
    }

    /// Braking deceleration for a brake handle position [km/h/s].
    /// The emergency position brakes one notch harder than full service.
    pub fn braking(&self, brake_handle: i32) -> f64 {
        let max_notch = self.specs.max_brake_notch().max(1);
        let notch = self
            .specs
            .notch_from_handle(brake_handle)
            .clamp(0, max_notch + 1);
        self.max_deceleration * f64::from(notch) / f64::from(max_notch)
            * self.config.brake_efficiency
    }

    pub fn resistance(&self, speed: f64) -> f64 {
        let [a, b] = self.config.resistance;
        a + b * speed * speed
    }

    /// Advance `state` by `delta_secs` under `handles`. The train never
    /// reverses; braking and resistance stop it at exactly 0 km/h.
    pub fn step(&self, state: &mut VehicleState, handles: HandleState, delta_secs: f64) {
        let speed = state.speed;
        let grade = self.grade_at(state.location) / 1000.0;
        let mut acceleration = self.traction(handles.power, speed) - GRAVITY_KMHS * grade;
        if speed > 0.0 {
            acceleration -= self.resistance(speed) + self.braking(handles.brake);
        } else if handles.brake > 0 {
            acceleration = acceleration.min(0.0);
        }

        let next = (speed + acceleration * delta_secs).max(0.0);
        state.location += (speed + next) / 2.0 / 3.6 * delta_secs;
        state.speed = next;
        state.total_ms += delta_secs * 1000.0;
    }
}

fn integrate_vehicle(
    mut ticks: EventReader<SimulationTick>,
    dynamics: Res<VehicleDynamics>,
    command: Res<ProtectionCommand>,
    mut vehicle: ResMut<VehicleState>,
) {
    for tick in ticks.read() {
        let handles = command.effective_handles(vehicle.handles);
        dynamics.step(&mut vehicle, handles, f64::from(tick.delta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamics() -> VehicleDynamics {
        let config = DynamicsConfig {
            grade_amplitude: 0.0,
            ..Default::default()
        };
        VehicleDynamics::new(config, &ProtectionConfig::default())
    }

    #[test]
    fn full_power_accelerates_and_brake_stops_exactly() {
        let dynamics = dynamics();
        let mut state = VehicleState::default();
        let power = HandleState { power: 5, brake: 0 };
        for _ in 0..200 {
            dynamics.step(&mut state, power, 0.05);
        }
        assert!(state.speed > 20.0);
        assert!(state.location > 0.0);
        assert!((state.total_ms - 10_000.0).abs() < 1e-6);

        let brake = HandleState { power: 0, brake: 8 };
        for _ in 0..400 {
            dynamics.step(&mut state, brake, 0.05);
        }
        assert_eq!(state.speed, 0.0);
    }

    #[test]
    fn emergency_brakes_harder_than_full_service() {
        let dynamics = dynamics();
        assert!(dynamics.braking(9) > dynamics.braking(8));
        assert_eq!(dynamics.braking(0), 0.0);
        assert!((dynamics.braking(8) - 2.7).abs() < 1e-9);
    }

    #[test]
    fn gradient_is_bounded_and_deterministic() {
        let config = DynamicsConfig::default();
        let a = VehicleDynamics::new(config.clone(), &ProtectionConfig::default());
        let b = VehicleDynamics::new(config.clone(), &ProtectionConfig::default());
        for location in (0..20_000).step_by(250) {
            let grade = a.grade_at(location as f64);
            assert!(grade.abs() <= config.grade_amplitude);
            assert_eq!(grade, b.grade_at(location as f64));
        }
    }

    #[test]
    fn traction_fades_with_speed() {
        let dynamics = dynamics();
        assert!(dynamics.traction(5, 20.0) > dynamics.traction(5, 200.0));
        assert_eq!(dynamics.traction(0, 20.0), 0.0);
        assert!((dynamics.traction(5, 20.0) - 2.0 * dynamics.traction(2, 20.0) * 1.25).abs() < 1e-9);
    }
}
