use thiserror::Error;

/// Errors raised while building shared infrastructure.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid Redis configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create Redis pool: {0}")]
    PoolCreation(String),
}
