//! # Error Types
//!
//! Custom error types for the handheld monitor using `thiserror`.

use thiserror::Error;

/// Main error type for the handheld monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPIO line could not be read
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Battery ADC could not be read or returned garbage
    #[error("ADC error: {0}")]
    Adc(String),

    /// Virtual HID device errors
    #[error("HID error: {0}")]
    Hid(String),

    /// The OSD process could not be started
    #[error("Failed to launch OSD: {0}")]
    OsdLaunch(String),

    /// The OSD process could not be signalled or written to
    #[error("OSD transport error: {0}")]
    Osd(String),

    /// An external command failed or exited non-zero
    #[error("Command failed: {0}")]
    Command(String),
}

/// Result type alias for the handheld monitor
pub type Result<T> = std::result::Result<T, MonitorError>;
