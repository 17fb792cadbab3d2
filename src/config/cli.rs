//! Command-line argument parsing
//!
//! Connection flags follow the redis-cli conventions (-h/-p/-a), which is
//! why the automatic -h help short flag is disabled.

use clap::Parser;
use std::path::PathBuf;

/// Unified cache facade over a dynamic set of Valkey/Redis nodes
#[derive(Parser, Debug, Clone)]
#[command(name = "valkey-cache-mesh")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct CliArgs {
    /// Print help information
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: (),

    // ===== Default node =====
    /// Default node hostname (fallback of last resort, always routed to)
    #[arg(short = 'h', long = "host")]
    pub host: Option<String>,

    /// Default node port
    #[arg(short = 'p', long = "port", default_value_t = 6379)]
    pub port: u16,

    /// Password for AUTH on the default node
    #[arg(short = 'a', long = "auth")]
    pub password: Option<String>,

    /// Username for ACL AUTH (requires --auth)
    #[arg(long = "user")]
    pub username: Option<String>,

    // ===== Mesh membership =====
    /// Node to register at startup, as id=host:port (repeatable)
    #[arg(long = "node", action = clap::ArgAction::Append)]
    pub nodes: Vec<String>,

    /// JSON config file with default_node, nodes, and delays
    #[arg(long = "config")]
    pub config_path: Option<PathBuf>,

    // ===== Tuning =====
    /// Fraction of maxmemory beyond which a node is excluded (default: 0.75)
    #[arg(long = "overload-threshold")]
    pub overload_threshold: Option<f64>,

    /// Replicas each node tries to accumulate (default: 2)
    #[arg(long = "replica-target")]
    pub replica_target: Option<u32>,

    /// Delay between replication passes in ms (default: 5000)
    #[arg(long = "replication-delay-ms")]
    pub replication_delay_ms: Option<u64>,

    /// Delay between cache size reports in ms (default: 5000)
    #[arg(long = "size-report-delay-ms")]
    pub size_report_delay_ms: Option<u64>,

    // ===== Timeouts =====
    /// TCP connect timeout in ms (default: 1000)
    #[arg(long = "connect-timeout-ms")]
    pub connect_timeout_ms: Option<u64>,

    /// Per-command read timeout in ms (default: 3000)
    #[arg(long = "read-timeout-ms")]
    pub read_timeout_ms: Option<u64>,

    /// Per-command write timeout in ms (default: 3000)
    #[arg(long = "write-timeout-ms")]
    pub write_timeout_ms: Option<u64>,

    // ===== Runtime =====
    /// Exit after this many seconds instead of running until killed
    #[arg(long = "run-for-secs")]
    pub run_for_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["valkey-cache-mesh"]);
        assert_eq!(args.port, 6379);
        assert!(args.host.is_none());
        assert!(args.nodes.is_empty());
        assert!(args.replication_delay_ms.is_none());
    }

    #[test]
    fn test_repeatable_nodes() {
        let args = CliArgs::parse_from([
            "valkey-cache-mesh",
            "--node",
            "a=localhost:6001",
            "--node",
            "b=localhost:6002",
        ]);
        assert_eq!(args.nodes, vec!["a=localhost:6001", "b=localhost:6002"]);
    }

    #[test]
    fn test_short_connection_flags() {
        let args = CliArgs::parse_from([
            "valkey-cache-mesh",
            "-h",
            "10.0.0.1",
            "-p",
            "6380",
            "-a",
            "secret",
        ]);
        assert_eq!(args.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(args.port, 6380);
        assert_eq!(args.password.as_deref(), Some("secret"));
    }
}
