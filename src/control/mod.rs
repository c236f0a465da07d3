//! Brake command generation: the predictive fuzzy controller for digital
//! ATC and the step ramp for analog ATC.

pub mod accel;
pub mod fuzzy;
pub mod membership;
pub mod ramp;

pub use accel::AccelerationEstimator;
pub use fuzzy::{BrakeModel, ControlInputs, DecelerationCalibration, FuzzyBrakeController};
pub use ramp::RampController;
