//! Two-state hysteresis controller with debounce
//!
//! The controller remembers which threshold it is waiting on:
//!
//! - `GettingCold`: the fan is running fast. While the temperature stays above
//!   `TEMP_MIN` the pulse width is shortened (fan sped up) one step per three
//!   confirming cycles. Dropping to or below `TEMP_MIN` flips to `GettingHot`.
//! - `GettingHot`: the fan is running slow. While the temperature stays below
//!   `TEMP_MAX` the pulse width is lengthened (fan slowed down) one step per
//!   three confirming cycles. Reaching `TEMP_MAX` flips to `GettingCold`.
//!
//! Between the two thresholds no flip ever happens.

use std::fmt;

use tracing::info;

use crate::constants::{control, pwm, temperature};

/// Which threshold the controller is currently watching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    GettingCold,
    GettingHot,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::GettingCold => write!(f, "getting cold"),
            ControlState::GettingHot => write!(f, "getting hot"),
        }
    }
}

/// Temperature thresholds in °C
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min: f64,
    pub max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min: temperature::TEMP_MIN,
            max: temperature::TEMP_MAX,
        }
    }
}

/// Inclusive pulse-width limits in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseWidthBounds {
    pub min: u32,
    pub max: u32,
}

impl PulseWidthBounds {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for PulseWidthBounds {
    fn default() -> Self {
        Self {
            min: pwm::PW_MIN,
            max: pwm::PW_MAX,
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Condition held; waiting for more confirmations
    Confirming { confirmations: u8 },
    /// Condition confirmed but the pulse width is already at its bound
    AtLimit { pulse_width: u32 },
    /// Commit this pulse width to the actuator
    Adjust { pulse_width: u32 },
    /// Threshold crossed, now watching the other one
    Switched { to: ControlState },
}

/// Hysteresis state machine. Owns the only control-loop memory.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    state: ControlState,
    confirmations: u8,
    thresholds: Thresholds,
    bounds: PulseWidthBounds,
}

impl HysteresisController {
    pub fn new() -> Self {
        Self::with_limits(Thresholds::default(), PulseWidthBounds::default())
    }

    pub fn with_limits(thresholds: Thresholds, bounds: PulseWidthBounds) -> Self {
        Self {
            state: ControlState::GettingCold,
            confirmations: 0,
            thresholds,
            bounds,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn confirmations(&self) -> u8 {
        self.confirmations
    }


    /// Evaluate one smoothed temperature against the current pulse width.
    ///
    /// On `Adjust` the counter is already reset; the caller must commit the
    /// returned pulse width. At a bound the counter stays saturated until the
    /// opposite threshold is crossed.
    pub fn evaluate(&mut self, temp: f64, pulse_width: u32) -> Decision {
        match self.state {
            ControlState::GettingCold => {
                let above = temp > self.thresholds.min;
                info!(
                    "Getting cold - check if temp is below {}: current temperature {:.2} > threshold {} : {}",
                    self.thresholds.min, temp, self.thresholds.min, above
                );
                if above {
                    let next = pulse_width.checked_sub(1).filter(|pw| self.bounds.contains(*pw));
                    self.confirm(pulse_width, next)
                } else {
                    self.switch(ControlState::GettingHot)
                }
            }
            ControlState::GettingHot => {
                let below = temp < self.thresholds.max;
                info!(
                    "Getting hot - check if temp is above {}: current temperature {:.2} < threshold {} : {}",
                    self.thresholds.max, temp, self.thresholds.max, below
                );
                if below {
                    let next = pulse_width.checked_add(1).filter(|pw| self.bounds.contains(*pw));
                    self.confirm(pulse_width, next)
                } else {
                    self.switch(ControlState::GettingCold)
                }
            }
        }
    }

    fn confirm(&mut self, current: u32, next: Option<u32>) -> Decision {
        if self.confirmations < control::CONFIRMATIONS_REQUIRED {
            self.confirmations += 1;
        }
        if self.confirmations < control::CONFIRMATIONS_REQUIRED {
            return Decision::Confirming {
                confirmations: self.confirmations,
            };
        }
        match next {
            Some(pulse_width) => {
                self.confirmations = 0;
                Decision::Adjust { pulse_width }
            }
            None => Decision::AtLimit { pulse_width: current },
        }
    }

    fn switch(&mut self, to: ControlState) -> Decision {
        info!("{} - threshold crossed, now {}", self.state, to);
        self.state = to;
        self.confirmations = 0;
        Decision::Switched { to }
    }
}

impl Default for HysteresisController {
    fn default() -> Self {
        Self::new()
    }
}
