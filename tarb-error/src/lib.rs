//! Unified error handling for Thermarb
//!
//! This crate provides a single error type used across all Thermarb components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using ThermarbError
pub type Result<T> = std::result::Result<T, ThermarbError>;

/// Unified error type for all Thermarb operations
#[derive(thiserror::Error, Debug)]
pub enum ThermarbError {
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
    // Configuration Errors
    // ============================================================================
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Arbitration Errors
    // ============================================================================
    /// The caller asked for something this control (or whitelist) does not allow.
    #[error("Operation rejected: {operation}: {reason}")]
    RejectedOperation {
        operation: String,
        reason: String,
    },

    #[error("Invalid percentage: {value} (must be 0.0-100.0)")]
    InvalidPercentage {
        value: f32,
    },

    #[error("Invalid control index {index} (control set depth {depth})")]
    InvalidControlIndex {
        index: u32,
        depth: u32,
    },

    // ============================================================================
    // Event Payload Errors
    // ============================================================================
    #[error("Malformed {event} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        event: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {event} payload value: {value}")]
    InvalidPayloadValue {
        event: String,
        value: u32,
    },

    // ============================================================================
    // Daemon and IPC Errors
    // ============================================================================
    /// The engine task is gone or stopped answering
    #[error("Daemon not available")]
    DaemonNotAvailable,
}

impl ThermarbError {
    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a rejected-operation error
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RejectedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed payload error
    pub fn malformed(event: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::MalformedPayload {
            event: event.into(),
            expected,
            actual,
        }
    }

    /// True for errors caused by a single bad inbound event payload
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedPayload { .. } | Self::InvalidPayloadValue { .. }
        )
    }
}
