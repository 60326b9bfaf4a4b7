//! Fan control engine modules
//!
//! Contains the temperature smoother and the hysteresis controller.

mod hysteresis;
mod smoother;

pub use hysteresis::{ControlState, Decision, HysteresisController, PulseWidthBounds, Thresholds};
pub use smoother::TemperatureSmoother;

/// Round to two decimal places
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
