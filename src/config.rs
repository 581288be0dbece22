//! Configuration surface (spec.md §6): every option the core recognizes,
//! with defaults, exposed as a `clap`-derived CLI struct in the style of
//! the teacher's daemon argument parsing.

use std::time::Duration;

use clap::Parser;

use crate::wire::Compression;

/// Ingestion bridge daemon configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "bridged", about = "Per-query columnar ingestion bridge", version)]
pub struct Config {
    /// TCP port the ingestion server binds.
    #[arg(long, default_value_t = 9100)]
    pub listen_port: u16,

    /// Comma-separated `host:port` list broadcast to producers and used by
    /// the control-signal broadcaster.
    #[arg(long, default_value = "127.0.0.1:9100")]
    pub advertised_endpoints: String,

    /// Requested rows per producer batch (the producer may send smaller).
    #[arg(long, default_value_t = 8192)]
    pub target_batch_size: u32,

    /// Compression algorithm advertised to the producer job runner.
    #[arg(long, default_value = "none", value_parser = parse_compression)]
    pub compression_algorithm: Compression,

    /// SO_RCVBUF on accepted sockets, in bytes.
    #[arg(long, default_value_t = 1 << 20)]
    pub socket_receive_buffer_size: usize,

    /// Userland buffered-reader size, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub input_buffer_size: usize,

    /// Cap on the ingestion worker thread pool.
    #[arg(long, default_value_t = 64)]
    pub max_ingest_threads: usize,

    /// Backlog before caller-runs backpressure kicks in.
    #[arg(long, default_value_t = 256)]
    pub ingest_queue_capacity: usize,

    /// Bounded FIFO size per query in the registry.
    #[arg(long, default_value_t = 256)]
    pub per_query_queue_capacity: usize,

    /// How long `poll_page` waits before returning a timeout.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub page_poll_timeout: Duration,

    /// How long the dispatcher waits for dynamic predicates.
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub dynamic_filter_timeout: Duration,

    /// Applied to TIME and TIMESTAMP decode.
    #[arg(long, default_value_t = 0)]
    pub timezone_offset_seconds: i64,

    /// Whether proxy-user setup failure aborts a query.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enforce_proxy_auth: bool,

    /// Enables aggregation pushdown in the job descriptor assembler.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_aggregation_pushdown: bool,

    /// Enables Top-N pushdown in the job descriptor assembler.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_topn_pushdown: bool,

    /// TTL for the eviction sweep of drained, completed queries.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub query_ttl: Duration,

    /// Schema-registration wait bound for early-arriving producers.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub schema_wait_timeout: Duration,

    /// Per-endpoint socket timeout for the control-signal broadcaster.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub broadcast_timeout: Duration,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode — only show errors.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Config {
    pub fn endpoints(&self) -> Vec<String> {
        self.advertised_endpoints
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    match s.to_ascii_uppercase().as_str() {
        "NONE" => Ok(Compression::None),
        "ZLIB" => Ok(Compression::Zlib),
        "LZ4" => Ok(Compression::Lz4),
        other => Err(format!("unknown compression algorithm '{other}'")),
    }
}

/// Parses a human-readable duration like `"5s"`, `"250ms"`, `"2m"`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(num) = s.strip_suffix("ms") {
        return num
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| e.to_string());
    }
    if let Some(num) = s.strip_suffix('s') {
        return num
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| e.to_string());
    }
    if let Some(num) = s.strip_suffix('m') {
        return num
            .parse::<u64>()
            .map(|n| Duration::from_secs(n * 60))
            .map_err(|e| e.to_string());
    }
    s.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("invalid duration '{s}': {e}"))
}
