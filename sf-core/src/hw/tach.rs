//! Fan tachometer measurement
//!
//! The tach line is polled as fast as possible for a fixed window and rising
//! edges are counted. Nothing sleeps inside the window: a
//! pulse shorter than one poll would be lost.

use std::fs::{self, File};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sf_error::{Result, SocfanError};
use tracing::{debug, info};

use crate::constants::tach;

/// A digital input level
#[cfg_attr(test, mockall::automock)]
pub trait TachInput {
    fn is_high(&mut self) -> Result<bool>;
}

/// Legacy sysfs GPIO input (`/sys/class/gpio/gpioN/value`)
#[derive(Debug)]
pub struct SysfsGpioInput {
    value_path: PathBuf,
    value: File,
}

impl SysfsGpioInput {
    /// Export the line if needed, configure it as input and open its value file
    pub fn open(gpio_root: &Path, line: u32) -> Result<Self> {
        let dir = gpio_root.join(format!("gpio{}", line));
        if !dir.exists() {
            let export = gpio_root.join("export");
            info!("Exporting GPIO {} via {:?}", line, export);
            fs::write(&export, line.to_string()).map_err(|e| SocfanError::GpioSetup {
                path: export.clone(),
                reason: format!("Failed to export line {}: {}", line, e),
            })?;
        }

        let direction = dir.join("direction");
        if direction.exists() {
            fs::write(&direction, "in").map_err(|e| SocfanError::GpioSetup {
                path: direction.clone(),
                reason: format!("Failed to set direction: {}", e),
            })?;
        }

        let value_path = dir.join("value");
        let value = File::open(&value_path).map_err(|e| SocfanError::GpioSetup {
            path: value_path.clone(),
            reason: format!("Failed to open: {}", e),
        })?;
        debug!("Tach input ready at {:?}", value_path);

        Ok(Self { value_path, value })
    }
}

impl TachInput for SysfsGpioInput {
    fn is_high(&mut self) -> Result<bool> {
        // sysfs attributes re-render on every read from offset 0
        let mut buf = [0u8; 1];
        let n = self
            .value
            .read_at(&mut buf, 0)
            .map_err(|e| SocfanError::TachRead {
                path: self.value_path.clone(),
                reason: e.to_string(),
            })?;
        if n == 0 {
            return Err(SocfanError::TachRead {
                path: self.value_path.clone(),
                reason: "empty read".to_string(),
            });
        }
        Ok(buf[0] == b'1')
    }
}

/// Counts tach pulses over a fixed window and converts them to RPM
pub struct TachometerCounter<P> {
    input: P,
    window: Duration,
    pulses_per_rev: u32,
}

impl<P: TachInput> TachometerCounter<P> {
    pub fn new(input: P) -> Self {
        Self {
            input,
            window: tach::WINDOW,
            pulses_per_rev: tach::PULSES_PER_REV,
        }
    }

    /// Override the sampling window (at least 1 ms)
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window.max(Duration::from_millis(1));
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Busy-sample the input for the full window and return the fan speed.
    ///
    /// Blocks the calling thread for the whole window.
    pub fn measure_rpm(&mut self) -> Result<u32> {
        let pulses = self.count_pulses()?;
        let rpm = self.rpm_from_pulses(pulses);
        debug!(pulses, rpm, "Tach measurement complete");
        Ok(rpm)
    }

    /// Count low-to-high transitions seen before the deadline
    fn count_pulses(&mut self) -> Result<u32> {
        let deadline = Instant::now() + self.window;
        let mut pulses: u32 = 0;
        let mut was_high = self.input.is_high()?;

        while Instant::now() < deadline {
            let high = self.input.is_high()?;
            if high && !was_high {
                pulses = pulses.saturating_add(1);
            }
            was_high = high;
        }

        Ok(pulses)
    }

    /// Scale pulses-per-window to revolutions per minute
    pub fn rpm_from_pulses(&self, pulses: u32) -> u32 {
        let window_ms = self.window.as_millis().max(1) as u64;
        let per_minute = pulses as u64 * 60_000 / window_ms;
        (per_minute / self.pulses_per_rev.max(1) as u64) as u32
    }
}
