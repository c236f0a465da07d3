//! Speed-indexed braking distance tables.
//!
//! `PatternTable::distances[v]` is the distance needed to stop from `v` km/h.
//! Tables are built once per device and rebuilt whenever the deceleration
//! profile changes (grade compensation, new maximum speed).

use smallvec::SmallVec;

use crate::config::ProtectionConfig;
use crate::numeric::{get_clamped, lower_bound};

/// Deceleration applied up to and including `upper_speed` [km/h].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecelerationBand {
    pub upper_speed: i32,
    /// [m/s²]
    pub deceleration: f64,
}

/// Ordered deceleration bands; the last band extends to any speed.
#[derive(Clone, Debug, PartialEq)]
pub struct DecelerationProfile {
    bands: SmallVec<[DecelerationBand; 4]>,
}

impl DecelerationProfile {
    /// A single deceleration for every speed.
    pub fn uniform(deceleration: f64) -> Self {
        Self::banded([DecelerationBand {
            upper_speed: i32::MAX,
            deceleration,
        }])
    }

    pub fn banded<I>(bands: I) -> Self
    where
        I: IntoIterator<Item = DecelerationBand>,
    {
        let mut bands: SmallVec<[DecelerationBand; 4]> = bands.into_iter().collect();
        bands.sort_by_key(|band| band.upper_speed);
        Self { bands }
    }

    /// Digital ATC profile: each speed range brakes at its standard notch.
    pub fn digital_atc(config: &ProtectionConfig) -> Self {
        let notches = config.standard_notches();
        let decel = |notch: i32| config.notch_deceleration(notch as f64);
        Self::banded([
            DecelerationBand {
                upper_speed: 70,
                deceleration: decel(notches[3]),
            },
            DecelerationBand {
                upper_speed: 110,
                deceleration: decel(notches[2]),
            },
            DecelerationBand {
                upper_speed: 160,
                deceleration: decel(notches[1]),
            },
            DecelerationBand {
                upper_speed: i32::MAX,
                deceleration: decel(notches[0]),
            },
        ])
    }

    /// ATS-P profile: its standard notch plus the (non-positive) grade term [m/s²].
    pub fn atsp(config: &ProtectionConfig, grade_correction: f64) -> Self {
        let notch = config.standard_notch(config.atsp.deceleration);
        Self::uniform(config.notch_deceleration(notch as f64) + grade_correction)
    }

    pub fn bands(&self) -> &[DecelerationBand] {
        &self.bands
    }

    /// Lower edge of the band containing `speed`, and its deceleration.
    fn segment(&self, speed: i32) -> (i32, f64) {
        let mut start = 0;
        for (i, band) in self.bands.iter().enumerate() {
            if speed <= band.upper_speed || i + 1 == self.bands.len() {
                return (start, band.deceleration);
            }
            start = band.upper_speed.max(0);
        }
        (0, 0.0)
    }
}

/// Braking distance from every integer speed `0..=max_speed` down to zero.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternTable {
    distances: Vec<f64>,
}

impl PatternTable {
    pub fn build(max_speed: i32, profile: &DecelerationProfile) -> Self {
        let len = max_speed.max(0) as usize + 1;
        let mut distances: Vec<f64> = Vec::with_capacity(len);

        for v in 0..len {
            let (start, deceleration) = profile.segment(v as i32);
            let start = start as usize;
            let base = if start < v { distances[start] } else { 0.0 };

            let distance = if start >= v {
                base
            } else if deceleration <= 0.0 {
                f64::INFINITY
            } else {
                let to = v as f64 / 3.6;
                let from = start as f64 / 3.6;
                (to * to - from * from) / (2.0 * deceleration) + base
            };
            distances.push(distance);
        }

        Self { distances }
    }

    pub fn max_speed(&self) -> i32 {
        self.distances.len() as i32 - 1
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Braking distance for `speed`, clamped to the table range.
    pub fn braking_distance(&self, speed: i32) -> f64 {
        get_clamped(&self.distances, speed as i64)
    }

    /// Speed whose braking distance is nearest to `distance`.
    ///
    /// Exact ties go to the higher speed. Distances beyond either end of the
    /// table resolve to the boundary speed.
    pub fn speed_for_distance(&self, distance: f64) -> i32 {
        let len = self.distances.len();
        if len < 2 {
            return 0;
        }
        let back = lower_bound(&self.distances, 1, len - 1, &distance);
        let front = back - 1;

        let x = self.distances[front] - distance;
        let y = self.distances[back] - distance;
        if x * x < y * y {
            front as i32
        } else {
            back as i32
        }
    }
}
