//! Per-node connection pool
//!
//! Connections are created lazily on first use and recycled after a
//! successful operation. A connection that returned an error is dropped
//! instead of recycled: after a timeout or a short read its stream may hold
//! an unread reply, and reusing it would desynchronize the protocol.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::commands::KvTransport;
use crate::client::connection::Connect;
use crate::utils::ConnectionError;

/// Idle connections kept per node
const MAX_IDLE: usize = 2;

/// Lazy checkout/checkin pool over a single node's connector
pub struct ConnectionPool {
    connector: Arc<dyn Connect>,
    idle: Mutex<Vec<Box<dyn KvTransport>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connect>) -> Self {
        Self {
            connector,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Run one operation against a pooled connection
    ///
    /// Checks out an idle connection (or opens a new one), runs `op`, and
    /// returns the connection to the pool only if the operation succeeded.
    pub fn with<R>(
        &self,
        op: impl FnOnce(&mut dyn KvTransport) -> io::Result<R>,
    ) -> Result<R, ConnectionError> {
        let mut conn = match self.idle.lock().pop() {
            Some(conn) => conn,
            None => self.connector.connect()?,
        };

        match op(conn.as_mut()) {
            Ok(value) => {
                let mut idle = self.idle.lock();
                if idle.len() < MAX_IDLE {
                    idle.push(conn);
                }
                Ok(value)
            }
            Err(e) => Err(ConnectionError::Command(e)),
        }
    }

    /// Number of idle connections currently held
    #[cfg(test)]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
