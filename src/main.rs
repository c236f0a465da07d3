//! atcsim - headless run of the demo route
//!
//! Usage: `atcsim [atc1|atc2|atcns|ksatc|dsatc] [--atsp]`

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;

use atcsim::config::{AtcKind, ProtectionConfig};
use atcsim::simulation::SimulationConfig;
use atcsim::AtcSimPlugins;

fn main() -> AppExit {
    let mut config = ProtectionConfig::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "atc1" => config.atc.kind = AtcKind::Atc1,
            "atc2" => config.atc.kind = AtcKind::Atc2,
            "atcns" => config.atc.kind = AtcKind::AtcNs,
            "ksatc" => config.atc.kind = AtcKind::KsAtc,
            "dsatc" => config.atc.kind = AtcKind::DsAtc,
            "--atsp" => config.atsp.enabled = true,
            other => eprintln!("ignoring unknown argument {other:?}"),
        }
    }

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        .add_plugins((LogPlugin::default(), StatesPlugin))
        // Run as fast as the host allows, one simulation tick per frame
        .insert_resource(SimulationConfig {
            lockstep: true,
            ..default()
        })
        .insert_resource(config)
        .add_plugins(AtcSimPlugins)
        .run()
}
