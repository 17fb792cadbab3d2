//! Client layer: transport trait, raw TCP connections, per-node pooling

pub mod commands;
pub mod connection;
pub mod pool;

pub use commands::{KvCommands, KvTransport};
pub use connection::{
    Connect, ConnectSpec, ConnectorProvider, RawConnection, TcpConnector, TcpConnectorProvider,
};
pub use pool::ConnectionPool;
