//! Dynamic-predicate collection (spec.md §4.5 step 2): awaited with a
//! timeout so the dispatcher's thread is never blocked indefinitely.

use async_trait::async_trait;

use crate::pushdown::Predicate;

/// Supplies predicates discovered after planning (e.g. from a semi-join
/// build side) once they become available.
#[async_trait]
pub trait PredicateSource: Send + Sync {
    async fn collect(&self, qid: &str) -> Vec<Predicate>;
}

/// A source with nothing to contribute; used when dynamic-predicate
/// collection is disabled.
pub struct NoDynamicPredicates;

#[async_trait]
impl PredicateSource for NoDynamicPredicates {
    async fn collect(&self, _qid: &str) -> Vec<Predicate> {
        Vec::new()
    }
}

/// Awaits `source.collect(qid)` up to `timeout`; on expiry, returns an
/// empty predicate set and leaves it to the caller to log the timeout
/// (spec.md §4.5 "on timeout, proceed without the predicate and log").
pub async fn await_dynamic_predicates(
    source: &dyn PredicateSource,
    qid: &str,
    timeout: std::time::Duration,
) -> Vec<Predicate> {
    match tokio::time::timeout(timeout, source.collect(qid)).await {
        Ok(predicates) => predicates,
        Err(_) => Vec::new(),
    }
}
