//! atcsim - onboard ATC and ATS-P train protection
//!
//! Braking patterns derived from wayside data, a predictive fuzzy brake
//! controller, the protection devices built on them, and a headless Bevy
//! simulation that drives a train along a scripted route.

use bevy::prelude::*;

pub mod config;
pub mod control;
pub mod numeric;
pub mod onboard;
pub mod pattern;
pub mod protection;
pub mod run_state;
pub mod simulation;

/// Every plugin of the simulator. Needs `StatesPlugin` and a time source
/// (`MinimalPlugins`) in the app.
pub struct AtcSimPlugins;

impl Plugin for AtcSimPlugins {
    fn build(&self, app: &mut App) {
        app.add_plugins(run_state::RunStatePlugin)
            .add_plugins(simulation::SimulationPlugin)
            .add_plugins(onboard::OnboardPlugin);
    }
}
