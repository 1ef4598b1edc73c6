// Error types for the allocator
//
// Nothing in the allocation cycle propagates errors to callers; the only
// public operation that can fail is configuration loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("predictor error: {0}")]
    Predictor(String),

    #[error("invalid allocation settings: {0}")]
    InvalidSettings(String),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AllocatorError>;
