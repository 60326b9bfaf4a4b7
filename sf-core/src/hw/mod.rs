//! Hardware interaction modules
//!
//! Contains all sysfs access: temperature sources, the tach input and the
//! PWM output. Each boundary is a trait so the control loop can run against
//! fakes.

mod pwm;
mod sensors;
mod tach;

pub use pwm::{PwmActuator, PwmOutput, SysfsPwmOutput};
pub use sensors::{
    parse_millidegrees, HwmonTemperature, TemperatureSampler, TemperatureSource,
    ThermalZoneTemperature,
};
pub use tach::{SysfsGpioInput, TachInput, TachometerCounter};
