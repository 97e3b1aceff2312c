//! Error types for telemetry capture and activity-file encoding.
//!
//! All errors implement `std::error::Error` and carry structured context for
//! debugging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: sensor link and discovery failures (retried by the driver)
//! - **Frame Errors**: malformed device notifications (the frame is dropped)
//! - **Encoding Errors**: unsupported values, layout mismatches, local type exhaustion
//! - **File Errors**: I/O failures while writing or finalizing an activity file
//! - **Parse Errors**: malformed activity files on read-back
//! - **Configuration Errors**: invalid run configuration
//! - **Lifecycle Errors**: recorder used before start or after finish
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use tirelab::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("sensor out of range");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! ```rust
//! use tirelab::TelemetryError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
//! let file_error = TelemetryError::file_error(PathBuf::from("/runs/run-1.fit"), io_err);
//!
//! let frame_error = TelemetryError::frame_error("truncated wheel payload", 3);
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Sensor connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Device discovery failed: {reason}")]
    Discovery { reason: String },

    #[error("Malformed telemetry frame ({len} bytes): {details}")]
    Frame { details: String, len: usize },

    #[error("Activity file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Checksum mismatch in {region}: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { region: &'static str, stored: u16, computed: u16 },

    #[error("Unsupported value for message {global_id} field {field_id}: {kind}")]
    UnsupportedValue { global_id: u16, field_id: u8, kind: &'static str },

    #[error("Value out of range for message {global_id} field {field_id}: {details}")]
    ValueOutOfRange { global_id: u16, field_id: u8, details: String },

    #[error("Local message type capacity exhausted: cannot define message {global_id} ({capacity} types in use)")]
    LocalTypeCapacity { global_id: u16, capacity: usize },

    #[error("Layout mismatch for message {global_id}: {details}")]
    LayoutMismatch { global_id: u16, details: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("{what} has already been finished")]
    Finished { what: &'static str },

    #[error("{what} has not been started")]
    NotStarted { what: &'static str },

    #[error("{what} has already been started")]
    AlreadyStarted { what: &'static str },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::Discovery { .. } => true,
            TelemetryError::Frame { .. } => true,
            TelemetryError::File { .. } => false,
            TelemetryError::Parse { .. } => false,
            TelemetryError::Checksum { .. } => false,
            TelemetryError::UnsupportedValue { .. } => false,
            TelemetryError::ValueOutOfRange { .. } => false,
            TelemetryError::LocalTypeCapacity { .. } => false,
            TelemetryError::LayoutMismatch { .. } => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::Finished { .. } => false,
            TelemetryError::NotStarted { .. } => false,
            TelemetryError::AlreadyStarted { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Move the phone closer to the wheel sensor",
                "Spin the wheel to wake the sensor",
                "Check the sensor battery",
            ],
            TelemetryError::Discovery { .. } => vec![
                "Check that Bluetooth is enabled",
                "Grant the Bluetooth scan permission",
            ],
            TelemetryError::Frame { .. } => vec![
                "Ignore isolated frames; decoding resumes on the next notification",
                "Check the sensor firmware if frames are consistently short",
            ],
            TelemetryError::File { .. } => vec![
                "Check that the output directory exists and is writable",
                "Ensure sufficient storage space",
                "Treat the run as failed and record it again",
            ],
            TelemetryError::Parse { .. } => vec![
                "Verify the file was finalized",
                "Check the file was not truncated during transfer",
            ],
            TelemetryError::Checksum { .. } => vec![
                "Verify the checksum variant the file was written with",
                "Treat the file as corrupt",
            ],
            TelemetryError::UnsupportedValue { .. } => vec![
                "Convert the value to an integer, float, string, timestamp or byte array",
            ],
            TelemetryError::ValueOutOfRange { .. } => vec![
                "Scale the value to fit the field width",
                "Use an explicitly sized field value",
            ],
            TelemetryError::LocalTypeCapacity { .. } => vec![
                "Reduce the number of distinct message types in one file",
            ],
            TelemetryError::LayoutMismatch { .. } => vec![
                "Write the same fields for every message of a type",
                "Use catalogue field typing or explicitly sized values",
            ],
            TelemetryError::Config { .. } => vec![
                "Check the wheel circumference is a positive number of metres",
                "Check durations are non-zero",
            ],
            TelemetryError::Finished { .. } => vec!["Start a new recording for the next run"],
            TelemetryError::NotStarted { .. } => vec!["Call start before recording samples"],
            TelemetryError::AlreadyStarted { .. } => vec!["Use a new recorder for each run"],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for discovery errors.
    pub fn discovery_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Discovery { reason: reason.into() }
    }

    /// Helper constructor for malformed notification frames.
    pub fn frame_error(details: impl Into<String>, len: usize) -> Self {
        TelemetryError::Frame { details: details.into(), len }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        TelemetryError::Config { details: details.into() }
    }

    /// Helper constructor for out-of-range field values.
    pub fn out_of_range(global_id: u16, field_id: u8, details: impl Into<String>) -> Self {
        TelemetryError::ValueOutOfRange { global_id, field_id, details: details.into() }
    }

    /// Helper constructor for layout mismatches.
    pub fn layout_mismatch(global_id: u16, details: impl Into<String>) -> Self {
        TelemetryError::LayoutMismatch { global_id, details: details.into() }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
