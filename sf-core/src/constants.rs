//! Constants for socfan
//!
//! Centralizes the control-loop tuning values and default sysfs locations.
//! The control values are fixed at build time; only hardware locations and
//! the telemetry endpoint are configurable.

use std::time::Duration;

/// Default sysfs locations
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// hwmon chip name of the SoC thermal sensor
    pub const SOC_HWMON_NAME: &str = "soc_thermal";

    /// Raw thermal zone reporting millidegrees
    pub const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

    /// Base path for legacy sysfs GPIO
    pub const GPIO_BASE: &str = "/sys/class/gpio";

    /// PWM chip driving the fan
    pub const PWM_CHIP: &str = "/sys/class/pwm/pwmchip0";

    /// Configuration directory
    pub const CONFIG_DIR: &str = "/etc/socfan";

    /// Configuration file
    pub const CONFIG_FILE: &str = "config.json";

    /// systemd journal socket, used to pick the log sink
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Temperature constants
pub mod temperature {
    /// sysfs temperatures are in millidegrees, divide by this to get Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;

    /// Below or at this, the fan may slow down (°C)
    pub const TEMP_MIN: f64 = 30.0;

    /// At or above this, the fan must speed up (°C)
    pub const TEMP_MAX: f64 = 35.0;

    /// Number of samples in the rolling mean
    pub const SMOOTHING_WINDOW: usize = 5;
}

/// PWM output constants
///
/// The fan is driven with an inverted duty: a shorter pulse spins it faster.
pub mod pwm {
    /// PWM period in microseconds
    pub const PERIOD_US: u32 = 40;

    /// Shortest allowed pulse width (fastest fan)
    pub const PW_MIN: u32 = 5;

    /// Pulse width applied at startup
    pub const PW_INIT: u32 = 20;

    /// Longest allowed pulse width (slowest fan)
    pub const PW_MAX: u32 = 35;

    /// sysfs PWM takes nanoseconds
    pub const NANOS_PER_MICRO: u64 = 1000;
}

/// Hysteresis controller constants
pub mod control {
    /// Consecutive agreeing cycles before the pulse width moves
    pub const CONFIRMATIONS_REQUIRED: u8 = 3;
}

/// Tachometer constants
pub mod tach {
    use super::*;

    /// Busy-sampling window for one RPM measurement
    pub const WINDOW: Duration = Duration::from_millis(500);

    /// Tach pulses per fan revolution
    pub const PULSES_PER_REV: u32 = 2;
}

/// Timing constants for the control loop
pub mod timing {
    use super::*;

    /// Pause between control cycles
    pub const CYCLE_INTERVAL: Duration = Duration::from_secs(120);

    /// Time for the fan to spin up after the PWM is first enabled
    pub const SPINUP_DELAY: Duration = Duration::from_secs(5);

    /// Pause after the initial report before the first cycle
    pub const SETTLE_DELAY: Duration = Duration::from_secs(10);

    /// Back-off between broker reconnect attempts
    pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
}

/// Telemetry defaults
pub mod telemetry {
    pub const DEFAULT_HOST: &str = "192.168.1.32";
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_CLIENT_ID: &str = "socfan";
    pub const DEFAULT_USERNAME: &str = "fan_control";
    pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

    /// Environment variable overriding the broker password
    pub const PASSWORD_ENV: &str = "SOCFAN_MQTT_PASSWORD";

    /// Outgoing request queue depth of the MQTT client
    pub const REQUEST_CAPACITY: usize = 10;
}

/// File size limits
pub mod limits {
    /// Maximum config file size (64KB)
    pub const MAX_CONFIG_SIZE: u64 = 64 * 1024;
}
