//! Scripted in-memory stand-ins for backend nodes
//!
//! A `MockCluster` holds per-address node state (liveness, memory numbers,
//! replica links, key data, a command log) and hands out connectors that
//! speak just enough of the command surface for the registry, topology, and
//! cache tests to run without real servers. REPLICAOF commands update the
//! replica lists on both ends so replica counts evolve during a pass the way
//! they do against live nodes.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::{Connect, ConnectSpec, ConnectorProvider, KvTransport};
use crate::utils::{ConnectionError, RespValue};

/// Mutable state of one mock node
#[derive(Debug, Default)]
pub struct MockNodeState {
    pub alive: bool,
    pub used_memory: u64,
    pub max_memory: u64,
    /// Addresses replicating from this node
    pub replicas: Vec<String>,
    /// Address this node replicates from
    pub master: Option<String>,
    pub read_only: bool,
    pub data: BTreeMap<String, String>,
    /// Space-joined log of every command executed on this node
    pub commands: Vec<String>,
    pub password: Option<String>,
    /// Make REPLICAOF <host> <port> fail with an IO error
    pub fail_replicaof: bool,
}

impl MockNodeState {
    pub fn alive() -> Self {
        Self {
            alive: true,
            used_memory: 1024,
            max_memory: 1 << 20,
            ..Self::default()
        }
    }

    pub fn dead() -> Self {
        Self::default()
    }

    pub fn alive_with_memory(used_memory: u64, max_memory: u64) -> Self {
        Self {
            used_memory,
            max_memory,
            ..Self::alive()
        }
    }
}

/// Registry of mock nodes keyed by "host:port"
#[derive(Default)]
pub struct MockCluster {
    nodes: Mutex<HashMap<String, Arc<Mutex<MockNodeState>>>>,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, addr: &str, state: MockNodeState) -> Arc<Mutex<MockNodeState>> {
        let state = Arc::new(Mutex::new(state));
        self.nodes
            .lock()
            .insert(addr.to_string(), Arc::clone(&state));
        state
    }

    /// State of a known node; panics on an unknown address
    pub fn state(&self, addr: &str) -> Arc<Mutex<MockNodeState>> {
        self.try_state(addr)
            .unwrap_or_else(|| panic!("no mock node at {addr}"))
    }

    fn try_state(&self, addr: &str) -> Option<Arc<Mutex<MockNodeState>>> {
        self.nodes.lock().get(addr).cloned()
    }
}

/// Connector provider resolving every spec against one `MockCluster`
pub struct MockConnectorProvider {
    cluster: Arc<MockCluster>,
}

impl MockConnectorProvider {
    pub fn provider(cluster: &Arc<MockCluster>) -> Arc<dyn ConnectorProvider> {
        Arc::new(Self {
            cluster: Arc::clone(cluster),
        })
    }
}

impl ConnectorProvider for MockConnectorProvider {
    fn connector_for(&self, spec: ConnectSpec) -> Arc<dyn Connect> {
        Arc::new(MockConnector {
            cluster: Arc::clone(&self.cluster),
            addr: format!("{}:{}", spec.host, spec.port),
            host: spec.host,
            port: spec.port,
            password: spec.password,
        })
    }
}

struct MockConnector {
    cluster: Arc<MockCluster>,
    addr: String,
    host: String,
    port: u16,
    password: Option<String>,
}

impl Connect for MockConnector {
    fn connect(&self) -> Result<Box<dyn KvTransport>, ConnectionError> {
        let state = match self.cluster.try_state(&self.addr) {
            Some(state) => state,
            None => {
                return Err(ConnectionError::ConnectFailed {
                    host: self.host.clone(),
                    port: self.port,
                    source: io::Error::new(io::ErrorKind::NotFound, "no mock node"),
                })
            }
        };

        {
            let st = state.lock();
            if !st.alive {
                return Err(ConnectionError::ConnectFailed {
                    host: self.host.clone(),
                    port: self.port,
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock node down"),
                });
            }
            if let Some(ref required) = st.password {
                if self.password.as_deref() != Some(required.as_str()) {
                    return Err(ConnectionError::AuthFailed(
                        "WRONGPASS invalid username-password pair".to_string(),
                    ));
                }
            }
        }

        Ok(Box::new(MockTransport {
            cluster: Arc::clone(&self.cluster),
            addr: self.addr.clone(),
            state,
        }))
    }
}

struct MockTransport {
    cluster: Arc<MockCluster>,
    addr: String,
    state: Arc<Mutex<MockNodeState>>,
}

impl MockTransport {
    fn handle_replicaof(&self, args: &[String]) -> io::Result<RespValue> {
        if args.len() < 3 {
            return Ok(RespValue::Error("ERR wrong number of arguments".to_string()));
        }

        if args[1].eq_ignore_ascii_case("no") && args[2].eq_ignore_ascii_case("one") {
            let former = self.state.lock().master.take();
            if let Some(master_addr) = former {
                if let Some(master) = self.cluster.try_state(&master_addr) {
                    master.lock().replicas.retain(|r| r != &self.addr);
                }
            }
            return Ok(RespValue::SimpleString("OK".to_string()));
        }

        if self.state.lock().fail_replicaof {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock replicaof failure",
            ));
        }

        let new_master = format!("{}:{}", args[1], args[2]);
        let old_master = self.state.lock().master.replace(new_master.clone());
        if let Some(old_addr) = old_master {
            if old_addr != new_master {
                if let Some(old) = self.cluster.try_state(&old_addr) {
                    old.lock().replicas.retain(|r| r != &self.addr);
                }
            }
        }
        if let Some(master) = self.cluster.try_state(&new_master) {
            let mut ms = master.lock();
            if !ms.replicas.contains(&self.addr) {
                ms.replicas.push(self.addr.clone());
            }
        }
        Ok(RespValue::SimpleString("OK".to_string()))
    }

    fn render_info(&self, section: &str) -> String {
        let st = self.state.lock();
        match section {
            "memory" => format!(
                "# Memory\r\nused_memory:{}\r\nused_memory_rss:{}\r\nmaxmemory:{}\r\nmaxmemory_policy:noeviction\r\n",
                st.used_memory,
                st.used_memory * 2,
                st.max_memory
            ),
            "replication" => {
                let mut body = String::from("# Replication\r\n");
                match st.master {
                    Some(ref master_addr) => {
                        let (host, port) =
                            master_addr.rsplit_once(':').unwrap_or((master_addr.as_str(), "0"));
                        body.push_str("role:slave\r\n");
                        body.push_str(&format!("master_host:{}\r\n", host));
                        body.push_str(&format!("master_port:{}\r\n", port));
                        body.push_str("master_link_status:up\r\n");
                        body.push_str("slave_repl_offset:0\r\n");
                        body.push_str(&format!(
                            "slave_read_only:{}\r\n",
                            if st.read_only { 1 } else { 0 }
                        ));
                    }
                    None => body.push_str("role:master\r\n"),
                }
                body.push_str(&format!("connected_slaves:{}\r\n", st.replicas.len()));
                for (i, addr) in st.replicas.iter().enumerate() {
                    let (ip, port) = addr.rsplit_once(':').unwrap_or((addr.as_str(), "0"));
                    body.push_str(&format!(
                        "slave{}:ip={},port={},state=online,offset=0,lag=0\r\n",
                        i, ip, port
                    ));
                }
                body.push_str("master_failover_state:no-failover\r\n");
                body
            }
            _ => String::new(),
        }
    }
}

impl KvTransport for MockTransport {
    fn execute(&mut self, args: &[&[u8]]) -> io::Result<RespValue> {
        let args: Vec<String> = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();

        {
            let mut st = self.state.lock();
            if !st.alive {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "mock node down",
                ));
            }
            st.commands.push(args.join(" "));
        }

        let cmd = args[0].to_ascii_uppercase();
        match cmd.as_str() {
            "PING" => Ok(RespValue::SimpleString("PONG".to_string())),
            "GET" => {
                let st = self.state.lock();
                Ok(match st.data.get(&args[1]) {
                    Some(value) => RespValue::BulkString(value.clone().into_bytes()),
                    None => RespValue::Null,
                })
            }
            "SET" => {
                self.state
                    .lock()
                    .data
                    .insert(args[1].clone(), args[2].clone());
                Ok(RespValue::SimpleString("OK".to_string()))
            }
            "DEL" => {
                let mut st = self.state.lock();
                let mut removed = 0;
                for key in &args[1..] {
                    if st.data.remove(key).is_some() {
                        removed += 1;
                    }
                }
                Ok(RespValue::Integer(removed))
            }
            "EXISTS" => {
                let st = self.state.lock();
                Ok(RespValue::Integer(st.data.contains_key(&args[1]) as i64))
            }
            // Pattern matching beyond "*" is not needed by any caller here
            "KEYS" => {
                let st = self.state.lock();
                Ok(RespValue::Array(
                    st.data
                        .keys()
                        .map(|k| RespValue::BulkString(k.clone().into_bytes()))
                        .collect(),
                ))
            }
            "DBSIZE" => {
                let st = self.state.lock();
                Ok(RespValue::Integer(st.data.len() as i64))
            }
            "FLUSHALL" => {
                self.state.lock().data.clear();
                Ok(RespValue::SimpleString("OK".to_string()))
            }
            "INFO" => {
                let section = args.get(1).map(|s| s.to_ascii_lowercase()).unwrap_or_default();
                Ok(RespValue::BulkString(self.render_info(&section).into_bytes()))
            }
            "REPLICAOF" => self.handle_replicaof(&args),
            "CONFIG" => {
                if args.len() >= 4 && args[1].eq_ignore_ascii_case("set") {
                    if args[2] == "replica-read-only" || args[2] == "slave-read-only" {
                        self.state.lock().read_only = args[3] != "no";
                    }
                    Ok(RespValue::SimpleString("OK".to_string()))
                } else {
                    Ok(RespValue::Error("ERR unsupported CONFIG".to_string()))
                }
            }
            "AUTH" => {
                let st = self.state.lock();
                let given = args.last().map(String::as_str);
                if st.password.as_deref() == given {
                    Ok(RespValue::SimpleString("OK".to_string()))
                } else {
                    Ok(RespValue::Error(
                        "WRONGPASS invalid username-password pair".to_string(),
                    ))
                }
            }
            _ => Ok(RespValue::Error(format!("ERR unknown command '{}'", cmd))),
        }
    }
}
