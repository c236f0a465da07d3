//! Headless demo simulation: vehicle dynamics, a scripted route and a
//! driver around the onboard protection equipment.
//!
//! The simulation runs on a fixed timestep (default 20 Hz). Systems listen
//! for `SimulationTick` events and run in `SimulationSet` order: the vehicle
//! moves, the route reports what the train passed, protection runs, then
//! the driver reacts.

use bevy::prelude::*;

use crate::run_state::RunState;

pub mod driver;
pub mod dynamics;
pub mod route;

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimulationConfig>()
            .init_resource::<SimulationStats>()
            .add_event::<SimulationTick>()
            .configure_sets(
                Update,
                (
                    SimulationSet::Tick,
                    SimulationSet::Dynamics,
                    SimulationSet::Wayside,
                    SimulationSet::Protection,
                    SimulationSet::Driver,
                )
                    .chain(),
            )
            .configure_sets(
                Update,
                SimulationSet::Tick.run_if(in_state(RunState::Running)),
            )
            .add_plugins((
                dynamics::DynamicsPlugin,
                route::RoutePlugin,
                driver::DriverPlugin,
            ))
            .add_systems(Update, simulation_tick_system.in_set(SimulationSet::Tick));
    }
}

/// Per-tick ordering of the simulation systems.
#[derive(SystemSet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    Tick,
    Dynamics,
    Wayside,
    Protection,
    Driver,
}

/// Configuration for the simulation.
#[derive(Resource, Clone, Debug)]
pub struct SimulationConfig {
    /// Ticks per second for simulation updates.
    pub tick_rate: f32,
    /// Simulation speed multiplier.
    pub speed: f32,
    /// Whether simulation is paused.
    pub paused: bool,
    /// Send exactly one tick per frame regardless of wall-clock time.
    pub lockstep: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            speed: 1.0,
            paused: false,
            lockstep: false,
        }
    }
}

/// Event sent each simulation tick (at tick_rate Hz).
#[derive(Event, Clone, Copy, Debug)]
pub struct SimulationTick {
    /// The tick number since simulation start.
    pub tick: u64,
    /// Delta time for this tick [s] (1.0 / tick_rate).
    pub delta: f32,
}

/// Statistics about the simulation.
#[derive(Resource, Default)]
pub struct SimulationStats {
    /// Total ticks since simulation start.
    pub total_ticks: u64,
    /// Accumulated time for fixed timestep.
    pub accumulator: f32,
}

/// System that generates simulation ticks at fixed intervals.
///
/// The vehicle state is integrated once per tick and protection reads it
/// once per tick, so at most one tick is sent per frame. Time beyond one
/// pending tick is dropped.
fn simulation_tick_system(
    config: Res<SimulationConfig>,
    mut stats: ResMut<SimulationStats>,
    time: Res<Time>,
    mut tick_events: EventWriter<SimulationTick>,
) {
    if config.paused {
        return;
    }

    let tick_duration = 1.0 / config.tick_rate;
    if config.lockstep {
        stats.accumulator = 0.0;
    } else {
        stats.accumulator += time.delta_secs() * config.speed;
        if stats.accumulator < tick_duration {
            return;
        }
        stats.accumulator = (stats.accumulator - tick_duration).min(tick_duration);
    }

    stats.total_ticks += 1;
    tick_events.send(SimulationTick {
        tick: stats.total_ticks,
        delta: tick_duration,
    });
}
