//! Error types for valkey-cache-mesh

use std::io;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Command failed: {0}")]
    Command(#[from] io::Error),
}

/// Node registration errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Node id '{0}' is reserved by the default node")]
    IdReserved(String),

    #[error("Validation failed for node '{id}': {source}")]
    Validation {
        id: String,
        source: ConnectionError,
    },
}

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Store '{store}': {source}")]
    Store {
        store: String,
        source: ConnectionError,
    },

    #[error("No healthy nodes available for write")]
    NoHealthyNodes,

    #[error("Clear incomplete, failed on: {}", failed.join(", "))]
    PartialClear { failed: Vec<String> },
}

pub type Result<T> = std::result::Result<T, MeshError>;
