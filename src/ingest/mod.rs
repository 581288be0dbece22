//! Ingestion server (C3): accepts producer connections and hands each to a
//! bounded worker pool (spec.md §4.3).

pub mod connection;
pub mod pool;

use std::net::TcpListener;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::registry::Registry;
use connection::{handle_connection, ConnectionLimits};
use pool::WorkerPool;

/// Owns the listening socket and worker pool for the lifetime of the
/// daemon. Dropping it joins every in-flight worker.
pub struct IngestServer {
    listener: TcpListener,
    pool: WorkerPool,
    registry: Arc<Registry>,
    tz_offset_seconds: i64,
    limits: Arc<ConnectionLimits>,
}

impl IngestServer {
    pub fn bind(config: &Config, registry: Arc<Registry>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.listen_port))?;
        info!(port = config.listen_port, "ingestion server bound");
        Ok(IngestServer {
            listener,
            pool: WorkerPool::new(config.max_ingest_threads, config.ingest_queue_capacity),
            registry,
            tz_offset_seconds: config.timezone_offset_seconds,
            limits: Arc::new(ConnectionLimits {
                max_schema_len: 1 << 20,
                schema_wait_timeout: config.schema_wait_timeout,
                socket_receive_buffer_size: config.socket_receive_buffer_size,
                input_buffer_size: config.input_buffer_size,
                ..ConnectionLimits::default()
            }),
        })
    }

    /// Runs the accept loop forever (or until the listener errors out).
    /// Call this on a dedicated thread; it blocks.
    pub fn serve(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted producer connection");
                    let registry = Arc::clone(&self.registry);
                    let tz = self.tz_offset_seconds;
                    let limits = Arc::clone(&self.limits);
                    self.pool.submit(move || {
                        handle_connection(stream, registry, tz, &limits);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept() failed, retrying");
                }
            }
        }
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

/// Spawns the TTL eviction sweep on its own thread (spec.md §4.2
/// "Eviction"). Runs until the process exits.
pub fn spawn_eviction_sweeper(registry: Arc<Registry>, interval: std::time::Duration) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("eviction-sweep".into())
        .spawn(move || loop {
            std::thread::sleep(interval);
            registry.sweep_expired();
        })
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to spawn eviction sweeper");
            panic!("failed to spawn eviction sweeper: {e}");
        })
}
