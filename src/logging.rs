//! Structured logging init, grounded on the teacher's daemon logging setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `verbose` stacks (`-v`,
/// `-vv`); `quiet` overrides it to errors only.
pub fn init(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("exchange_bridge={level}").parse().unwrap())
        .add_directive(format!("bridged={level}").parse().unwrap())
        .add_directive(format!("bridgectl={level}").parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
