//! Agent error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("measurement runtime already initialized")]
    AlreadyInitialized,

    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to start statistics listener: {0}")]
    Listener(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
