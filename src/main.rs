//! valkey-cache-mesh - cache facade and replication manager for a set of
//! independent Valkey/Redis nodes

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use valkey_cache_mesh::cache::CacheAggregator;
use valkey_cache_mesh::config::{CliArgs, MeshConfig};
use valkey_cache_mesh::node::NodeRegistry;
use valkey_cache_mesh::scheduler::{spawn_fixed_delay, SizeReporter};
use valkey_cache_mesh::topology::ReplicationTopologyManager;

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn print_banner(config: &MeshConfig, quiet: bool) {
    if quiet {
        return;
    }

    println!("valkey-cache-mesh v{}", env!("CARGO_PKG_VERSION"));
    println!("====================================");
    match config.default_node {
        Some(ref node) => println!("Default node: {}:{}", node.host, node.port),
        None => println!("Default node: none"),
    }
    println!(
        "Configured nodes: {:?}",
        config
            .nodes
            .iter()
            .map(|n| format!("{}={}:{}", n.id, n.host, n.port))
            .collect::<Vec<_>>()
    );
    println!(
        "Replication every {}ms, size report every {}ms",
        config.replication_delay_ms, config.size_report_delay_ms
    );
    println!("====================================\n");
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse_args();

    // Setup logging
    setup_logging(args.verbose, args.quiet);

    // Build configuration
    let config = MeshConfig::from_cli(&args)?;
    print_banner(&config, args.quiet);

    // Registry, with the default node when one is configured
    let provider = Arc::new(config.connector_provider());
    let registry = Arc::new(match config.default_node.clone() {
        Some(default) => NodeRegistry::with_default(provider, default),
        None => NodeRegistry::new(provider),
    });

    // Explicit startup registration of the configured nodes; a node that
    // fails validation is skipped, it can be registered again once it is
    // reachable
    for node in &config.nodes {
        match registry.save(node.clone()) {
            Ok(()) => {}
            Err(e) => warn!(id = %node.id, error = %e, "startup registration failed, skipping"),
        }
    }

    let aggregator = Arc::new(CacheAggregator::for_registry(Arc::clone(&registry)));
    let topology = Arc::new(ReplicationTopologyManager::new(Arc::clone(&registry)));
    let reporter = Arc::new(SizeReporter::new(Arc::clone(&aggregator)));

    let replication_job = {
        let topology = Arc::clone(&topology);
        spawn_fixed_delay("replication", config.replication_delay(), move || {
            topology.run_once();
        })?
    };
    let report_job = {
        let reporter = Arc::clone(&reporter);
        spawn_fixed_delay("size-report", config.size_report_delay(), move || {
            reporter.run_once();
        })?
    };

    info!("mesh running");

    match args.run_for_secs {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            info!("run time elapsed, shutting down");
            replication_job.stop();
            report_job.stop();
        }
        None => loop {
            thread::sleep(Duration::from_secs(60));
        },
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
