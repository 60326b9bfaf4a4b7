//! Telemetry wire types shared between the control loop and the publisher.
//!
//! One snapshot is produced per control cycle and serialized as a flat JSON
//! object: `{"soc_temp": <float>, "pulsewidth": <int>, "fan_speed": <int>}`.

use serde::{Deserialize, Serialize};

/// Topic the snapshots are published to unless configured otherwise
pub const DEFAULT_TOPIC: &str = "fan/data";

/// Upper bound for a serialized snapshot; anything larger is a bug
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// State reported to the broker once per cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySnapshot {
    /// Smoothed SoC temperature in °C, two decimals
    pub soc_temp: f64,
    /// Active PWM pulse width in microseconds
    pub pulsewidth: u32,
    /// Fan speed in RPM measured this cycle
    pub fan_speed: u32,
}

impl TelemetrySnapshot {
    pub fn new(soc_temp: f64, pulsewidth: u32, fan_speed: u32) -> Self {
        Self {
            soc_temp,
            pulsewidth,
            fan_speed,
        }
    }

    /// Validate the snapshot before it goes on the wire
    pub fn validate(&self) -> Result<(), String> {
        if !self.soc_temp.is_finite() {
            return Err(format!("soc_temp is not finite: {}", self.soc_temp));
        }
        Ok(())
    }

    /// Serialize to the compact JSON payload
    pub fn to_json(&self) -> Result<String, String> {
        self.validate()?;
        let payload = serde_json::to_string(self).map_err(|e| e.to_string())?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(format!(
                "payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            ));
        }
        Ok(payload)
    }
}
