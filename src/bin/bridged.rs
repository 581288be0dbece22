//! Ingestion bridge daemon: binds the ingestion server (C3), starts the
//! eviction sweeper, and serves until terminated.

use std::sync::Arc;

use clap::Parser;

use exchange_bridge::config::Config;
use exchange_bridge::ingest::{spawn_eviction_sweeper, IngestServer};
use exchange_bridge::logging;
use exchange_bridge::registry::Registry;

fn main() {
    let config = Config::parse();
    logging::init(config.verbose, config.quiet);

    let registry = Arc::new(Registry::new(
        config.per_query_queue_capacity,
        config.query_ttl,
    ));

    let server = match IngestServer::bind(&config, Arc::clone(&registry)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to bind ingestion server on port {}: {e}", config.listen_port);
            std::process::exit(1);
        }
    };

    let sweep_interval = std::time::Duration::from_secs(30);
    let _sweeper = spawn_eviction_sweeper(Arc::clone(&registry), sweep_interval);

    tracing::info!(addr = ?server.local_addr().ok(), "bridged ready");
    server.serve();
}
