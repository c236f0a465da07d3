//! Run lifecycle: validate the configuration, run the route, report and
//! exit.

use bevy::prelude::*;

use crate::config::ProtectionConfig;
use crate::onboard::frame::{ProtectionCommand, VehicleState};
use crate::onboard::Train;
use crate::simulation::driver::{Driver, DriverConfig};
use crate::simulation::dynamics::{DynamicsConfig, VehicleDynamics};
use crate::simulation::route::Route;
use crate::simulation::SimulationSet;

pub struct RunStatePlugin;

impl Plugin for RunStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<RunState>()
            .init_resource::<ProtectionConfig>()
            .init_resource::<RunConfig>()
            .init_resource::<RunSummary>()
            .add_systems(
                Update,
                validate_config.run_if(in_state(RunState::Loading)),
            )
            .add_systems(OnEnter(RunState::Running), start_run)
            .add_systems(
                Update,
                monitor_run
                    .after(SimulationSet::Driver)
                    .run_if(in_state(RunState::Running)),
            )
            .add_systems(OnEnter(RunState::Finished), finish_run);
    }
}

#[derive(States, Default, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum RunState {
    /// Configuration not yet checked.
    #[default]
    Loading,
    /// Train on the route.
    Running,
    /// Arrived or out of time.
    Finished,
}

#[derive(Resource, Clone, Debug)]
pub struct RunConfig {
    /// Simulated time after which the run is abandoned [s].
    pub time_limit_secs: f64,
    /// Leave the app once the run is finished.
    pub exit_when_finished: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 1800.0,
            exit_when_finished: true,
        }
    }
}

/// Figures collected over the run.
#[derive(Resource, Clone, Debug, Default)]
pub struct RunSummary {
    pub max_speed: f64,
    /// Ticks with a protection brake applied.
    pub braked_ticks: u64,
    /// Ticks with the protection emergency brake applied.
    pub emergency_ticks: u64,
    pub arrived: bool,
}

fn validate_config(
    config: Res<ProtectionConfig>,
    mut next_state: ResMut<NextState<RunState>>,
    mut exit: EventWriter<AppExit>,
) {
    match config.validate() {
        Ok(()) => {
            info!(
                "Configuration accepted: ATC {:?} (enabled {}), ATS-P enabled {}",
                config.atc.kind, config.atc.enabled, config.atsp.enabled
            );
            next_state.set(RunState::Running);
        }
        Err(err) => {
            error!("Refusing to start the run: {err}");
            exit.send(AppExit::error());
        }
    }
}

fn start_run(
    mut commands: Commands,
    run: Res<RunConfig>,
    config: Res<ProtectionConfig>,
    dynamics: Res<DynamicsConfig>,
    driver: Res<DriverConfig>,
    mut route: ResMut<Route>,
    mut summary: ResMut<RunSummary>,
) {
    route.rewind();
    *summary = RunSummary::default();
    commands.insert_resource(Train::new(&config));
    commands.insert_resource(VehicleDynamics::new(dynamics.clone(), &config));
    commands.insert_resource(Driver::new(driver.seed));
    commands.insert_resource(VehicleState::default());
    commands.insert_resource(ProtectionCommand::default());
    info!(
        "Run started, stop at {:.0} m, time limit {} s",
        route.stop_location(),
        run.time_limit_secs
    );
}

fn monitor_run(
    run: Res<RunConfig>,
    route: Res<Route>,
    vehicle: Res<VehicleState>,
    command: Res<ProtectionCommand>,
    protection: Res<ProtectionConfig>,
    mut summary: ResMut<RunSummary>,
    mut next_state: ResMut<NextState<RunState>>,
) {
    summary.max_speed = summary.max_speed.max(vehicle.speed);
    if command.brake_notch > 0 {
        summary.braked_ticks += 1;
    }
    if command.brake_notch > protection.max_brake_notch() {
        summary.emergency_ticks += 1;
    }

    let arrived = vehicle.speed == 0.0 && vehicle.location >= route.finish_location();
    let timed_out = vehicle.total_ms >= run.time_limit_secs * 1000.0;
    if arrived {
        summary.arrived = true;
        info!(
            "Arrived at {:.1} m ({:+.1} m from the stop)",
            vehicle.location,
            vehicle.location - route.stop_location()
        );
        next_state.set(RunState::Finished);
    } else if timed_out {
        warn!(
            "Time limit reached at {:.1} m, {:.1} km/h",
            vehicle.location, vehicle.speed
        );
        next_state.set(RunState::Finished);
    }
}

fn finish_run(
    run: Res<RunConfig>,
    summary: Res<RunSummary>,
    vehicle: Res<VehicleState>,
    mut exit: EventWriter<AppExit>,
) {
    info!(
        "Run finished after {:.1} s: max {:.1} km/h, protection braking {} ticks ({} emergency)",
        vehicle.total_ms / 1000.0,
        summary.max_speed,
        summary.braked_ticks,
        summary.emergency_ticks
    );
    if run.exit_when_finished {
        exit.send(AppExit::Success);
    }
}
