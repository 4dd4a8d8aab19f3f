// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::exec::SupervisorError;

#[derive(Error, Debug)]
pub enum RnaflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
}

pub type Result<T> = std::result::Result<T, RnaflowError>;
