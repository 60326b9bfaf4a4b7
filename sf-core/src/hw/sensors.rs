//! SoC temperature sources
//!
//! Two independent sysfs readings are averaged into one sample:
//! - the hwmon chip exposing the SoC thermal sensor (`tempN_input`)
//! - the raw thermal zone file
//!
//! Both report millidegrees Celsius. We convert to degrees on read.

use std::fs;
use std::path::{Path, PathBuf};

use sf_error::{Result, SocfanError};
use tracing::{debug, trace};

use crate::constants::temperature;
use crate::engine::round2;

/// A readable temperature in degrees Celsius
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource {
    fn read_celsius(&mut self) -> Result<f64>;
}

/// Parse a sysfs millidegree value into degrees Celsius
pub fn parse_millidegrees(raw: &str) -> std::result::Result<f64, String> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .map(|m| m as f64 / temperature::MILLIDEGREE_DIVISOR)
        .map_err(|e| format!("Failed to parse '{}': {}", trimmed, e))
}

fn read_millidegree_file(source_name: &str, path: &Path) -> Result<f64> {
    let content = fs::read_to_string(path).map_err(|e| {
        SocfanError::sensor(source_name, format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_millidegrees(&content).map_err(|reason| SocfanError::sensor(source_name, reason))
}

/// Temperature from a hwmon chip, looked up by its `name` file on every read
///
/// hwmon indices are not stable across boots, so the chip is resolved each time.
#[derive(Debug, Clone)]
pub struct HwmonTemperature {
    root: PathBuf,
    chip_name: String,
    input: String,
}

impl HwmonTemperature {
    pub fn new(root: impl Into<PathBuf>, chip_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            chip_name: chip_name.into(),
            input: "temp1_input".to_string(),
        }
    }

    /// Resolve the sysfs directory of the configured chip
    fn resolve_chip_dir(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        for entry in entries.flatten() {
            let dir = entry.path();
            let name = match fs::read_to_string(dir.join("name")) {
                Ok(n) => n,
                Err(_) => continue,
            };
            trace!("hwmon {:?} is {}", dir, name.trim());
            if name.trim() == self.chip_name {
                return Some(dir);
            }
        }
        None
    }
}

impl TemperatureSource for HwmonTemperature {
    fn read_celsius(&mut self) -> Result<f64> {
        let dir = self.resolve_chip_dir().ok_or_else(|| {
            SocfanError::sensor(
                &self.chip_name,
                format!("no hwmon chip named '{}' under {}", self.chip_name, self.root.display()),
            )
        })?;
        read_millidegree_file(&self.chip_name, &dir.join(&self.input))
    }
}

/// Temperature from a thermal zone `temp` file
#[derive(Debug, Clone)]
pub struct ThermalZoneTemperature {
    path: PathBuf,
}

impl ThermalZoneTemperature {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemperatureSource for ThermalZoneTemperature {
    fn read_celsius(&mut self) -> Result<f64> {
        read_millidegree_file("thermal_zone", &self.path)
    }
}

/// Averages two independent sources into one instantaneous sample.
///
/// Fails if either source fails; retrying is the caller's call.
pub struct TemperatureSampler<A, B> {
    primary: A,
    secondary: B,
}

impl<A: TemperatureSource, B: TemperatureSource> TemperatureSampler<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    /// One reading in °C, mean of both sources rounded to two decimals
    pub fn sample(&mut self) -> Result<f64> {
        let first = self.primary.read_celsius()?;
        let second = self.secondary.read_celsius()?;
        let sample = round2((first + second) / 2.0);
        debug!(
            first = round2(first),
            second = round2(second),
            sample,
            "SoC temperature sampled"
        );
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_hwmon(root: &Path, index: usize, name: &str, millideg: &str) {
        let dir = root.join(format!("hwmon{}", index));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
        fs::write(dir.join("temp1_input"), millideg).unwrap();
    }

    #[test]
    fn test_parse_millidegrees() {
        assert_eq!(parse_millidegrees("45000\n").unwrap(), 45.0);
        assert_eq!(parse_millidegrees("  37250 ").unwrap(), 37.25);
        assert_eq!(parse_millidegrees("-5000").unwrap(), -5.0);
        assert!(parse_millidegrees("abc").is_err());
        assert!(parse_millidegrees("").is_err());
    }

    #[test]
    fn test_hwmon_resolves_by_name() {
        let tmp = TempDir::new().unwrap();
        fake_hwmon(tmp.path(), 0, "gpu_thermal", "60000\n");
        fake_hwmon(tmp.path(), 1, "soc_thermal", "41500\n");
        let mut source = HwmonTemperature::new(tmp.path(), "soc_thermal");
        assert_eq!(source.read_celsius().unwrap(), 41.5);
    }

    #[test]
    fn test_hwmon_missing_chip() {
        let tmp = TempDir::new().unwrap();
        fake_hwmon(tmp.path(), 0, "gpu_thermal", "60000\n");
        let mut source = HwmonTemperature::new(tmp.path(), "soc_thermal");
        let err = source.read_celsius().unwrap_err();
        assert!(matches!(err, SocfanError::SensorUnavailable { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_thermal_zone_read_and_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("temp");
        fs::write(&path, "38750\n").unwrap();
        let mut zone = ThermalZoneTemperature::new(&path);
        assert_eq!(zone.read_celsius().unwrap(), 38.75);

        fs::write(&path, "garbage").unwrap();
        assert!(zone.read_celsius().is_err());

        let mut missing = ThermalZoneTemperature::new(tmp.path().join("nope"));
        assert!(matches!(
            missing.read_celsius(),
            Err(SocfanError::SensorUnavailable { .. })
        ));
    }

    #[test]
    fn test_sampler_averages_and_rounds() {
        let mut a = MockTemperatureSource::new();
        a.expect_read_celsius().returning(|| Ok(40.111));
        let mut b = MockTemperatureSource::new();
        b.expect_read_celsius().returning(|| Ok(41.0));
        let mut sampler = TemperatureSampler::new(a, b);
        assert_eq!(sampler.sample().unwrap(), 40.56);
    }

    #[test]
    fn test_sampler_fails_if_either_source_fails() {
        let mut a = MockTemperatureSource::new();
        a.expect_read_celsius().returning(|| Ok(40.0));
        let mut b = MockTemperatureSource::new();
        b.expect_read_celsius()
            .returning(|| Err(SocfanError::sensor("thermal_zone", "unreadable")));
        let mut sampler = TemperatureSampler::new(a, b);
        assert!(matches!(
            sampler.sample(),
            Err(SocfanError::SensorUnavailable { .. })
        ));

        let mut a = MockTemperatureSource::new();
        a.expect_read_celsius()
            .returning(|| Err(SocfanError::sensor("soc_thermal", "unreadable")));
        let mut b = MockTemperatureSource::new();
        b.expect_read_celsius().never();
        let mut sampler = TemperatureSampler::new(a, b);
        assert!(sampler.sample().is_err());
    }
}
