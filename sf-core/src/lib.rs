//! socfan Core Library
//!
//! Closed-loop fan control for a single-board computer's SoC.
//!
//! # Module Structure
//!
//! - `hw/` - sysfs access: temperature sources, tach input, PWM output
//! - `engine/` - temperature smoothing and the hysteresis controller
//! - `config` - static startup configuration
//! - `constants` - control tuning and default paths
//!
//! # Example
//!
//! ```
//! use sf_core::{HysteresisController, TemperatureSmoother, Decision};
//!
//! let mut smoother = TemperatureSmoother::warm(31.0);
//! let mut controller = HysteresisController::new();
//! let mut pulse_width = 20;
//! for _ in 0..3 {
//!     let temp = smoother.push(31.0);
//!     if let Decision::Adjust { pulse_width: next } = controller.evaluate(temp, pulse_width) {
//!         pulse_width = next;
//!     }
//! }
//! assert_eq!(pulse_width, 19);
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod hw;

pub use sf_error::{Result, SocfanError};

pub use config::{
    default_config_path, Config, ConfigOrigin, LoadedConfig, LoggingConfig, PwmConfig,
    SensorsConfig, TachometerConfig, TelemetryConfig,
};

pub use engine::{
    round2, ControlState, Decision, HysteresisController, PulseWidthBounds, TemperatureSmoother,
    Thresholds,
};

pub use hw::{
    parse_millidegrees, HwmonTemperature, PwmActuator, PwmOutput, SysfsGpioInput,
    SysfsPwmOutput, TachInput, TachometerCounter, TemperatureSampler, TemperatureSource,
    ThermalZoneTemperature,
};
