//! PWM output for the fan
//!
//! sysfs PWM channels take nanoseconds; the controller works in
//! microseconds, so values are scaled on write.

use std::fs;
use std::path::{Path, PathBuf};

use sf_error::{Result, SocfanError};
use tracing::{debug, info};

use crate::constants::pwm;

/// A PWM output pin
#[cfg_attr(test, mockall::automock)]
pub trait PwmOutput {
    fn set_period_us(&mut self, period_us: u32) -> Result<()>;
    fn set_pulse_width_us(&mut self, pulse_width_us: u32) -> Result<()>;
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
}

/// A channel of a sysfs PWM chip (`/sys/class/pwm/pwmchipN/pwmM`)
#[derive(Debug, Clone)]
pub struct SysfsPwmOutput {
    dir: PathBuf,
}

impl SysfsPwmOutput {
    /// Export the channel if needed
    pub fn open(chip: &Path, channel: u32) -> Result<Self> {
        let dir = chip.join(format!("pwm{}", channel));
        if !dir.exists() {
            let export = chip.join("export");
            info!("Exporting PWM channel {} via {:?}", channel, export);
            fs::write(&export, channel.to_string()).map_err(|e| {
                SocfanError::actuator(&export, format!("Failed to export channel {}: {}", channel, e))
            })?;
        }
        if !dir.is_dir() {
            return Err(SocfanError::actuator(&dir, "channel not present after export"));
        }
        Ok(Self { dir })
    }

    fn write_attr(&self, attr: &str, value: String) -> Result<()> {
        let path = self.dir.join(attr);
        debug!("PWM write {:?} = {}", path, value);
        fs::write(&path, &value).map_err(|e| {
            SocfanError::actuator(&path, format!("Failed to write {}: {}", value, e))
        })
    }
}

fn micros_to_nanos(us: u32) -> String {
    (us as u64 * pwm::NANOS_PER_MICRO).to_string()
}

impl PwmOutput for SysfsPwmOutput {
    fn set_period_us(&mut self, period_us: u32) -> Result<()> {
        self.write_attr("period", micros_to_nanos(period_us))
    }

    fn set_pulse_width_us(&mut self, pulse_width_us: u32) -> Result<()> {
        self.write_attr("duty_cycle", micros_to_nanos(pulse_width_us))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.write_attr("enable", if enabled { "1" } else { "0" }.to_string())
    }
}

/// Owns the PWM output and the active pulse width.
///
/// Bounds are the caller's responsibility: `set_pulsewidth` commits whatever
/// it is given.
pub struct PwmActuator<O> {
    output: O,
    period_us: u32,
    pulse_width: u32,
}

impl<O: PwmOutput> PwmActuator<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            period_us: 0,
            pulse_width: 0,
        }
    }

    /// Program the period, enable the output and apply the initial pulse width.
    ///
    /// The kernel rejects a period shorter than the current duty cycle, so a
    /// channel left behind by a previous run is zeroed first.
    pub fn initialize(&mut self, period_us: u32, initial_pulse_width: u32) -> Result<()> {
        self.output.set_pulse_width_us(0)?;
        self.output.set_period_us(period_us)?;
        self.period_us = period_us;
        self.output.set_enabled(true)?;
        self.set_pulsewidth(initial_pulse_width)?;
        info!(
            period_us,
            pulse_width = initial_pulse_width,
            "PWM output initialized"
        );
        Ok(())
    }

    /// Commit a new pulse width to the hardware
    pub fn set_pulsewidth(&mut self, value: u32) -> Result<()> {
        self.output.set_pulse_width_us(value)?;
        self.pulse_width = value;
        Ok(())
    }

    pub fn pulse_width(&self) -> u32 {
        self.pulse_width
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }
}
