//! Error types for grid construction and configuration.
//!
//! The tick loop itself never fails: degenerate geometry, degenerate density
//! and out-of-bounds positions all resolve to neutral values. Errors only
//! surface while a grid is being built.

use thiserror::Error;

/// Errors that can occur while configuring or populating a grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// A configuration value is out of its valid range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// An agent with this id is already registered
    #[error("Duplicate agent id: {0}")]
    DuplicateAgent(String),

    /// No agent with this id is registered
    #[error("Unknown agent id: {0}")]
    UnknownAgent(String),

    /// Config text could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(String),
}

impl GridError {
    /// Creates an invalid-config error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, GridError>;
