//! Smoothed acceleration from frame-to-frame speed changes.

/// Smoothing factor of the moving average.
const ALPHA: f64 = 0.2;

/// Exponential moving average of the train's acceleration [km/h/s].
///
/// The average lags the raw value by one frame.
#[derive(Clone, Debug, Default)]
pub struct AccelerationEstimator {
    previous_speed: f64,
    previous_raw: f64,
    raw: f64,
    ema: f64,
}

impl AccelerationEstimator {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed the speed [km/h] observed after `delta_secs`.
    pub fn update(&mut self, speed: f64, delta_secs: f64) {
        if delta_secs != 0.0 {
            self.raw = (speed - self.previous_speed) / delta_secs;
        }
        self.previous_speed = speed;

        self.ema = ALPHA * self.previous_raw + (1.0 - ALPHA) * self.ema;
        self.previous_raw = self.raw;
    }

    pub fn raw(&self) -> f64 {
        self.raw
    }

    pub fn ema(&self) -> f64 {
        self.ema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_on_constant_deceleration() {
        let mut accel = AccelerationEstimator::default();
        let mut speed = 100.0;
        accel.update(speed, 0.05);
        for _ in 0..200 {
            speed -= 2.5 * 0.05;
            accel.update(speed, 0.05);
        }
        assert!((accel.raw() + 2.5).abs() < 1e-9);
        assert!((accel.ema() + 2.5).abs() < 1e-3);
    }

    #[test]
    fn average_lags_one_frame() {
        let mut accel = AccelerationEstimator::default();
        accel.update(1.0, 1.0);
        assert_eq!(accel.raw(), 1.0);
        assert_eq!(accel.ema(), 0.0);
        accel.update(2.0, 1.0);
        assert!((accel.ema() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn zero_delta_keeps_previous_raw() {
        let mut accel = AccelerationEstimator::default();
        accel.update(3.0, 1.0);
        accel.update(9.0, 0.0);
        assert_eq!(accel.raw(), 3.0);
    }
}
