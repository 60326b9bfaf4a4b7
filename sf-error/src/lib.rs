//! Unified error handling for socfan
//!
//! This crate provides a single error type used across all socfan components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using SocfanError
pub type Result<T> = std::result::Result<T, SocfanError>;

/// Unified error type for all socfan operations
#[derive(thiserror::Error, Debug)]
pub enum SocfanError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Temperature source {source_name} unavailable: {reason}")]
    SensorUnavailable {
        source_name: String,
        reason: String,
    },

    #[error("Failed to read tachometer from {path}: {reason}")]
    TachRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to set up GPIO {path}: {reason}")]
    GpioSetup {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write PWM to {path}: {reason}")]
    ActuatorWrite {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Telemetry Errors
    // ============================================================================
    #[error("Telemetry publish failed: {0}")]
    TelemetryPublish(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl SocfanError {
    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a sensor error for a named temperature source
    pub fn sensor(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an actuator write error
    pub fn actuator(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ActuatorWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a telemetry error from a string
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::TelemetryPublish(msg.into())
    }

    /// Whether the error must stop the control loop.
    ///
    /// Sensor, tachometer and telemetry failures only affect the current cycle.
    /// Anything touching the actuator, pin setup or configuration is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SensorUnavailable { .. } | Self::TachRead { .. } | Self::TelemetryPublish(_)
        )
    }
}
