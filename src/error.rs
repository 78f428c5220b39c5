//! # Error Types
//!
//! This module defines error types used throughout the cardpress library.
//!
//! Only hard failures become errors. Fallback-class problems (a binding to a
//! missing field, a dimension bind that does not parse) resolve to documented
//! defaults, and per-element failures (an image that will not decode, a
//! custom rule expression that throws) are logged and absorbed by the
//! component that hit them.

use thiserror::Error;

/// Main error type for cardpress operations
#[derive(Debug, Error)]
pub enum CardpressError {
    /// Malformed or invalid template / template bundle
    #[error("Template error: {0}")]
    Template(String),

    /// Malformed record payload (bad JSON, non-array, unsupported file)
    #[error("Record error: {0}")]
    Record(String),

    /// Invalid process rule or rule expression
    #[error("Rule error: {0}")]
    Rule(String),

    /// Unknown element id, rule index or card index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Image loading or decoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Rasterization error
    #[error("Render error: {0}")]
    Render(String),

    /// Session persistence error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// ZIP / PNG export error
    #[error("Export error: {0}")]
    Export(String),

    /// Network-level errors (binding a listener, serving)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CardpressError {
    /// True for errors caused by the caller's input rather than the system.
    ///
    /// The HTTP layer maps these to `400 Bad Request`.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            CardpressError::Template(_)
                | CardpressError::Record(_)
                | CardpressError::Rule(_)
                | CardpressError::Json(_)
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CardpressError>;
