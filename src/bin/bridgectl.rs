//! Manual control-plane CLI: sends a `JOB_FINISHED` signal to one or more
//! running `bridged` endpoints, for smoke-testing C5/C6 without a full
//! query-engine integration.

use clap::Parser;

use exchange_bridge::broadcast::broadcast_job_finished;

#[derive(Parser, Debug)]
#[command(name = "bridgectl", about = "Manually signal JOB_FINISHED to bridged endpoints")]
struct Args {
    /// Comma-separated `host:port` targets.
    #[arg(long)]
    endpoints: String,

    /// Query id whose ingestion should be marked finished.
    #[arg(long)]
    qid: String,

    /// Capability token minted for this query.
    #[arg(long)]
    token: String,

    /// Per-endpoint timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    exchange_bridge::logging::init(1, false);
    let args = Args::parse();

    let endpoints: Vec<String> = args
        .endpoints
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if endpoints.is_empty() {
        eprintln!("no endpoints given");
        std::process::exit(1);
    }

    let results = broadcast_job_finished(
        &endpoints,
        &args.qid,
        &args.token,
        std::time::Duration::from_millis(args.timeout_ms),
    )
    .await;

    let mut failed = 0;
    for r in &results {
        if r.ok {
            println!("{}: OK", r.endpoint);
        } else {
            println!("{}: FAILED", r.endpoint);
            failed += 1;
        }
    }
    if failed > 0 {
        std::process::exit(1);
    }
}
