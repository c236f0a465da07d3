//! Scripted wayside: beacons and signal aspects reported as the train
//! passes their location.

use bevy::prelude::*;

use crate::onboard::beacon::BeaconData;
use crate::onboard::frame::VehicleState;
use crate::onboard::{BeaconPassed, SignalChanged};

use super::{SimulationSet, SimulationTick};

pub struct RoutePlugin;

impl Plugin for RoutePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Route>().add_systems(
            Update,
            detect_wayside.in_set(SimulationSet::Wayside),
        );
    }
}

/// What the wayside reports at a route point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WaysideEvent {
    Beacon(BeaconData),
    /// Aspect of the section entered (signal index or open sections).
    Signal(i32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoutePoint {
    /// [m]
    pub location: f64,
    pub event: WaysideEvent,
}

impl RoutePoint {
    pub fn beacon(location: f64, code: i32, signal: i32, distance: f64, optional: i32) -> Self {
        Self {
            location,
            event: WaysideEvent::Beacon(BeaconData {
                code,
                signal,
                distance,
                optional,
            }),
        }
    }

    pub fn signal(location: f64, aspect: i32) -> Self {
        Self {
            location,
            event: WaysideEvent::Signal(aspect),
        }
    }
}

/// Route points in location order, and the stop the run ends at.
#[derive(Resource, Clone, Debug)]
pub struct Route {
    points: Vec<RoutePoint>,
    next: usize,
    /// Where the driver aims to stop [m].
    stop_location: f64,
    /// A standstill beyond this counts as arrival [m].
    finish_location: f64,
}

impl Default for Route {
    fn default() -> Self {
        Self::demo()
    }
}

impl Route {
    pub fn new(mut points: Vec<RoutePoint>, stop_location: f64, finish_location: f64) -> Self {
        points.sort_by(|a, b| a.location.total_cmp(&b.location));
        Self {
            points,
            next: 0,
            stop_location,
            finish_location,
        }
    }

    /// Twelve kilometres with a speed restriction, a section change and a
    /// station stop. Aspects suit both the analog signal index and the
    /// digital open-section count.
    pub fn demo() -> Self {
        let mut points = vec![RoutePoint::signal(0.0, 5)];
        for distance in [2500.0, 5000.0, 7500.0, 10_000.0] {
            points.push(RoutePoint::beacon(0.0, 80, 0, distance, 0));
        }

        // 110 km/h restriction from 3500 m.
        points.push(RoutePoint::beacon(2000.0, 86, 0, 0.0, 1500 * 1000 + 110));
        points.push(RoutePoint::beacon(2100.0, 6, 0, 0.0, 1400 * 1000 + 115));
        points.push(RoutePoint::signal(3300.0, 3));
        points.push(RoutePoint::beacon(4500.0, 86, 0, 0.0, 999));
        points.push(RoutePoint::beacon(4500.0, 16, 0, 0.0, 0));
        points.push(RoutePoint::signal(4500.0, 5));

        points.push(RoutePoint::beacon(5000.0, 203, 0, 0.0, -10));
        points.push(RoutePoint::beacon(6000.0, 80, 0, 2000.0, 0));
        points.push(RoutePoint::beacon(6000.0, 80, 0, 5550.0, 0));
        points.push(RoutePoint::signal(6000.0, 5));

        // Station: platform end at 11500 m, stop signal at 11550 m.
        points.push(RoutePoint::beacon(9000.0, 81, 0, 0.0, 0));
        points.push(RoutePoint::beacon(9000.0, 82, 0, 0.0, 1500));
        points.push(RoutePoint::beacon(9000.0, 83, 0, 0.0, 2200));
        points.push(RoutePoint::beacon(9000.0, 84, 0, 0.0, 2500));
        points.push(RoutePoint::beacon(9050.0, 3, 0, 2500.0, 0));
        points.push(RoutePoint::signal(10_200.0, 2));
        points.push(RoutePoint::beacon(11_000.0, 85, 0, 0.0, 0));
        points.push(RoutePoint::signal(11_100.0, 1));
        points.push(RoutePoint::beacon(11_560.0, 70, 0, 0.0, 0));

        Self::new(points, 11_450.0, 11_000.0)
    }

    /// Points reached since the last call, in route order.
    pub fn passed(&mut self, location: f64) -> &[RoutePoint] {
        let start = self.next;
        while self
            .points
            .get(self.next)
            .is_some_and(|point| point.location <= location)
        {
            self.next += 1;
        }
        &self.points[start..self.next]
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    pub fn stop_location(&self) -> f64 {
        self.stop_location
    }

    pub fn finish_location(&self) -> f64 {
        self.finish_location
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

fn detect_wayside(
    mut ticks: EventReader<SimulationTick>,
    vehicle: Res<VehicleState>,
    mut route: ResMut<Route>,
    mut beacons: EventWriter<BeaconPassed>,
    mut signals: EventWriter<SignalChanged>,
) {
    if ticks.read().count() == 0 {
        return;
    }
    for point in route.passed(vehicle.location) {
        match point.event {
            WaysideEvent::Beacon(beacon) => {
                debug!("Beacon {} at {:.1} m", beacon.code, point.location);
                beacons.send(BeaconPassed(beacon));
            }
            WaysideEvent::Signal(aspect) => {
                debug!("Aspect {} at {:.1} m", aspect, point.location);
                signals.send(SignalChanged { aspect });
            }
        }
    }
}
