//! Error types for pool and session operations
//!
//! Simple, flat error hierarchy. No over-engineering.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("session pool exhausted: {active}/{max} sessions active")]
    PoolExhausted { active: usize, max: usize },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session not initialized")]
    Uninitialized,

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("operation timed out")]
    Timeout,

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid url filter: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("browser engine error: {0}")]
    Capability(String),
}
