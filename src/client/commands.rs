//! Command trait for node communication
//!
//! `KvTransport` abstracts a single request/response exchange with a backend
//! node; `KvCommands` layers the typed operations the mesh actually issues
//! (probes, key traffic, replica control) on top of it.
//!
//! The split keeps the registry, topology, and cache code independent of the
//! underlying transport: production uses `RawConnection`, tests use a
//! scripted mock.

use std::io;

use crate::utils::RespValue;

/// One request/response exchange with a backend node
pub trait KvTransport: Send {
    /// Execute a command with binary arguments and return the raw reply
    fn execute(&mut self, args: &[&[u8]]) -> io::Result<RespValue>;
}

fn unexpected(what: &str, got: &RespValue) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Unexpected {} response: {:?}", what, got),
    )
}

fn server_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::Other, message)
}

/// Typed operations built on top of the base `KvTransport` trait
pub trait KvCommands: KvTransport {
    /// Execute a command with string arguments
    fn execute_str(&mut self, args: &[&str]) -> io::Result<RespValue> {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.execute(&byte_args)
    }

    /// Send PING and verify PONG response
    fn ping(&mut self) -> io::Result<bool> {
        match self.execute_str(&["PING"])? {
            RespValue::SimpleString(s) => Ok(s == "PONG"),
            _ => Ok(false),
        }
    }

    /// GET a single key
    fn get(&mut self, key: &str) -> io::Result<Option<String>> {
        match self.execute_str(&["GET", key])? {
            RespValue::BulkString(data) => String::from_utf8(data).map(Some).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            }),
            RespValue::Null => Ok(None),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// SET a single key
    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        match self.execute_str(&["SET", key, value])? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// DEL a single key, returning the number of keys removed
    fn del(&mut self, key: &str) -> io::Result<i64> {
        match self.execute_str(&["DEL", key])? {
            RespValue::Integer(n) => Ok(n),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// EXISTS check for a single key
    fn exists(&mut self, key: &str) -> io::Result<bool> {
        match self.execute_str(&["EXISTS", key])? {
            RespValue::Integer(n) => Ok(n > 0),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("EXISTS", &other)),
        }
    }

    /// KEYS pattern scan
    fn keys(&mut self, pattern: &str) -> io::Result<Vec<String>> {
        match self.execute_str(&["KEYS", pattern])? {
            RespValue::Array(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => keys.push(s.to_string()),
                        None => return Err(unexpected("KEYS element", &item)),
                    }
                }
                Ok(keys)
            }
            RespValue::Null => Ok(Vec::new()),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("KEYS", &other)),
        }
    }

    /// Send DBSIZE command
    fn dbsize(&mut self) -> io::Result<i64> {
        match self.execute_str(&["DBSIZE"])? {
            RespValue::Integer(n) => Ok(n),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("DBSIZE", &other)),
        }
    }

    /// Send FLUSHALL command
    fn flushall(&mut self) -> io::Result<()> {
        match self.execute_str(&["FLUSHALL"])? {
            RespValue::Error(e) => Err(server_error(e)),
            _ => Ok(()), // Accept any success
        }
    }

    /// Get INFO for a section (empty string returns all sections)
    fn info(&mut self, section: &str) -> io::Result<String> {
        let response = if section.is_empty() {
            self.execute_str(&["INFO"])?
        } else {
            self.execute_str(&["INFO", section])?
        };

        match response {
            RespValue::BulkString(data) => String::from_utf8(data).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            }),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("INFO", &other)),
        }
    }

    /// Send AUTH command
    fn auth(&mut self, password: &str, username: Option<&str>) -> io::Result<()> {
        let response = match username {
            Some(user) => self.execute_str(&["AUTH", user, password])?,
            None => self.execute_str(&["AUTH", password])?,
        };

        match response {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::PermissionDenied, e)),
            other => Err(unexpected("AUTH", &other)),
        }
    }

    /// Make this node a replica of the given master
    fn replicaof(&mut self, host: &str, port: u16) -> io::Result<()> {
        let port_str = port.to_string();
        match self.execute_str(&["REPLICAOF", host, &port_str])? {
            RespValue::SimpleString(_) => Ok(()),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("REPLICAOF", &other)),
        }
    }

    /// Detach this node from any master
    fn replicaof_no_one(&mut self) -> io::Result<()> {
        match self.execute_str(&["REPLICAOF", "NO", "ONE"])? {
            RespValue::SimpleString(_) => Ok(()),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("REPLICAOF NO ONE", &other)),
        }
    }

    /// Send CONFIG SET for a single parameter
    fn config_set(&mut self, parameter: &str, value: &str) -> io::Result<()> {
        match self.execute_str(&["CONFIG", "SET", parameter, value])? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(server_error(e)),
            other => Err(unexpected("CONFIG SET", &other)),
        }
    }
}

// Blanket implementation: any KvTransport automatically gets KvCommands
impl<T: KvTransport + ?Sized> KvCommands for T {}
