//! CLI argument parsing and runtime configuration

pub mod cli;
pub mod mesh_config;

pub use cli::CliArgs;
pub use mesh_config::{MeshConfig, DEFAULT_NODE_ID};
