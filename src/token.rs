//! Capability-token generation: a freshly generated opaque random string,
//! valid only for the lifetime of one query (spec.md §3).

use rand::distributions::Alphanumeric;
use rand::Rng;

const TOKEN_LEN: usize = 32;

/// Generates a fresh capability token. Not cryptographically reversible to
/// anything; its only job is to be unguessable for the lifetime of one
/// query's connections.
pub fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
