//! Shared utilities: error types and the RESP wire codec

pub mod error;
pub mod resp;

pub use error::{CacheError, ConnectionError, MeshError, RegistryError, Result};
pub use resp::{RespDecoder, RespEncoder, RespValue};
