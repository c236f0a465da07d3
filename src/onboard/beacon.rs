//! Wayside beacon data, per-device decoding and the bounded FIFO each
//! device drains at the start of a frame.

use std::collections::VecDeque;

use bevy::prelude::*;

/// Beacons one device may hold between two frames.
pub const BEACON_QUEUE_CAPACITY: usize = 32;

/// One beacon as reported by the wayside.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BeaconData {
    /// Beacon type code.
    pub code: i32,
    /// Aspect of the paired signal.
    pub signal: i32,
    /// Distance to the paired signal [m].
    pub distance: f64,
    /// Free value set on the beacon.
    pub optional: i32,
}

/// FIFO of beacons passed since the device last ran.
#[derive(Clone, Debug)]
pub struct BeaconQueue {
    pending: VecDeque<BeaconData>,
}

impl Default for BeaconQueue {
    fn default() -> Self {
        Self {
            pending: VecDeque::with_capacity(BEACON_QUEUE_CAPACITY),
        }
    }
}

impl BeaconQueue {
    /// Queue a beacon. A full queue drops the new beacon and returns `false`.
    pub fn push(&mut self, beacon: BeaconData) -> bool {
        if self.pending.len() >= BEACON_QUEUE_CAPACITY {
            warn!(
                "Beacon queue full ({BEACON_QUEUE_CAPACITY}), dropping beacon type {}",
                beacon.code
            );
            return false;
        }
        self.pending.push_back(beacon);
        true
    }

    /// Remove every queued beacon in arrival order.
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, BeaconData> {
        self.pending.drain(..)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Beacons the ATC acts on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AtcBeacon {
    /// Stop-limit loop coil (70).
    LoopCoil { signal: i32 },
    /// Distance to a section boundary (80).
    SectionBoundary { distance: f64 },
    /// Departure signal of the next station (81).
    DepartureSignal { signal: i32 },
    /// Station branch restriction (82).
    StationBranch { distance: i32 },
    /// Station manual-driving ceiling (83).
    StationManual { distance: i32 },
    /// Station overrun protection (84).
    StationEnd { distance: i32 },
    /// Point from which a stop counts as a station stop (85).
    StationArrival,
    /// User restriction slot 0-2 (86-88).
    UserPattern { slot: usize, optional: i32 },
    /// Switch of the ATC kind (90).
    KindSwitch { code: i32 },
}

impl AtcBeacon {
    pub fn decode(beacon: &BeaconData) -> Option<Self> {
        let decoded = match beacon.code {
            70 => Self::LoopCoil {
                signal: beacon.signal,
            },
            80 => Self::SectionBoundary {
                distance: beacon.distance,
            },
            81 => Self::DepartureSignal {
                signal: beacon.signal,
            },
            82 => Self::StationBranch {
                distance: beacon.optional,
            },
            83 => Self::StationManual {
                distance: beacon.optional,
            },
            84 => Self::StationEnd {
                distance: beacon.optional,
            },
            85 => Self::StationArrival,
            code @ 86..=88 => Self::UserPattern {
                slot: (code - 86) as usize,
                optional: beacon.optional,
            },
            90 => Self::KindSwitch {
                code: beacon.optional,
            },
            _ => return None,
        };
        Some(decoded)
    }
}

/// Beacons ATS-P acts on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AtspBeacon {
    /// Distance to the stop signal (3).
    StopSignal { distance: f64 },
    /// Immediate stop with the emergency brake (4).
    ImmediateEmergency { distance: f64 },
    /// Immediate stop with the service brake (5).
    ImmediateService { distance: f64 },
    /// Speed restriction slot 0-4 (6-10).
    UserPattern { slot: usize, optional: i32 },
    /// Clear restriction slot 0-4 (16-20).
    ClearPattern { slot: usize },
    /// Grade compensation in 1/1000 m/s² (203).
    Grade { optional: i32 },
}

impl AtspBeacon {
    pub fn decode(beacon: &BeaconData) -> Option<Self> {
        let decoded = match beacon.code {
            3 => Self::StopSignal {
                distance: beacon.distance,
            },
            4 => Self::ImmediateEmergency {
                distance: beacon.distance,
            },
            5 => Self::ImmediateService {
                distance: beacon.distance,
            },
            code @ 6..=10 => Self::UserPattern {
                slot: (code - 6) as usize,
                optional: beacon.optional,
            },
            code @ 16..=20 => Self::ClearPattern {
                slot: (code - 16) as usize,
            },
            203 => Self::Grade {
                optional: beacon.optional,
            },
            _ => return None,
        };
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon(code: i32, optional: i32) -> BeaconData {
        BeaconData {
            code,
            signal: 0,
            distance: 120.0,
            optional,
        }
    }

    #[test]
    fn queue_drains_in_arrival_order() {
        let mut queue = BeaconQueue::default();
        for code in [80, 81, 82] {
            assert!(queue.push(beacon(code, 0)));
        }
        let codes: Vec<i32> = queue.drain().map(|b| b.code).collect();
        assert_eq!(codes, vec![80, 81, 82]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_the_newest_beacon() {
        let mut queue = BeaconQueue::default();
        for i in 0..BEACON_QUEUE_CAPACITY {
            assert!(queue.push(beacon(80, i as i32)));
        }
        assert!(!queue.push(beacon(90, 4)));
        assert_eq!(queue.len(), BEACON_QUEUE_CAPACITY);
        assert_eq!(queue.drain().last().map(|b| b.code), Some(80));
    }

    #[test]
    fn atc_codes_decode() {
        assert_eq!(
            AtcBeacon::decode(&beacon(87, 300_045)),
            Some(AtcBeacon::UserPattern {
                slot: 1,
                optional: 300_045
            })
        );
        assert_eq!(
            AtcBeacon::decode(&beacon(80, 0)),
            Some(AtcBeacon::SectionBoundary { distance: 120.0 })
        );
        assert_eq!(AtcBeacon::decode(&beacon(3, 0)), None);
        assert_eq!(AtcBeacon::decode(&beacon(89, 0)), None);
    }

    #[test]
    fn atsp_codes_decode() {
        assert_eq!(
            AtspBeacon::decode(&beacon(17, 0)),
            Some(AtspBeacon::ClearPattern { slot: 1 })
        );
        assert_eq!(
            AtspBeacon::decode(&beacon(10, 5)),
            Some(AtspBeacon::UserPattern {
                slot: 4,
                optional: 5
            })
        );
        assert_eq!(AtspBeacon::decode(&beacon(11, 0)), None);
        assert_eq!(AtspBeacon::decode(&beacon(80, 0)), None);
    }
}
