//! Dispatcher (C5): per-query-split orchestration (spec.md §4.5).

pub mod predicate;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::broadcast::broadcast_job_finished;
use crate::config::Config;
use crate::page::ColumnDescriptor;
use crate::pushdown::{AggregateDescriptor, JobDescriptor, Predicate, RowLimit};
use crate::registry::Registry;
use crate::token;

use predicate::{await_dynamic_predicates, PredicateSource};

/// Connection parameters handed to the producer job runner alongside the
/// job descriptor (spec.md §4.5 step 3).
#[derive(Debug, Clone)]
pub struct JobParams {
    pub target_consumer_endpoints: Vec<String>,
    pub qid: String,
    pub dyn_token: String,
    pub target_batch_size: u32,
    pub compression_algorithm: crate::wire::Compression,
}

/// What the dispatcher asks a planner to contribute when assembling a job.
pub struct DispatchRequest {
    pub qid: String,
    pub columns: Vec<ColumnDescriptor>,
    pub projection: Vec<String>,
    pub static_predicates: Vec<Predicate>,
    pub limit: Option<RowLimit>,
    pub aggregation: Option<AggregateDescriptor>,
    pub target_consumer_endpoints: Vec<String>,
    pub target_batch_size: u32,
    pub compression_algorithm: crate::wire::Compression,
}

/// Submits an assembled job to the producer side and reports completion.
/// Blocking by contract (spec.md §4.5 "the job-runner call is blocking");
/// implementations run it on a blocking thread.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, descriptor: JobDescriptor, params: JobParams) -> Result<(), String>;
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    dynamic_filter_timeout: Duration,
    broadcast_timeout: Duration,
    enable_aggregation_pushdown: bool,
    enable_topn_pushdown: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        dynamic_filter_timeout: Duration,
        broadcast_timeout: Duration,
        enable_aggregation_pushdown: bool,
        enable_topn_pushdown: bool,
    ) -> Self {
        Dispatcher {
            registry,
            dynamic_filter_timeout,
            broadcast_timeout,
            enable_aggregation_pushdown,
            enable_topn_pushdown,
        }
    }

    /// Builds a `Dispatcher` from the core's own configuration surface
    /// (spec.md §6), the way the query engine embedding this crate is
    /// expected to construct one.
    pub fn from_config(registry: Arc<Registry>, config: &Config) -> Self {
        Dispatcher::new(
            registry,
            config.dynamic_filter_timeout,
            config.broadcast_timeout,
            config.enable_aggregation_pushdown,
            config.enable_topn_pushdown,
        )
    }

    /// Runs the full per-split sequence from spec.md §4.5:
    /// register + mint token, await dynamic predicates, assemble + submit
    /// the job, broadcast JOB_FINISHED before the local signal, and clean
    /// up on any failure while still broadcasting so consumers reach EOS.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        predicate_source: &dyn PredicateSource,
        job_runner: &dyn JobRunner,
    ) -> Result<(), String> {
        let dyn_token = token::generate();
        self.registry
            .register_query(&request.qid, &dyn_token)
            .map_err(|e| e.to_string())?;
        self.registry
            .register_schema(&request.qid, request.columns)
            .map_err(|e| e.to_string())?;

        let dynamic_predicates =
            await_dynamic_predicates(predicate_source, &request.qid, self.dynamic_filter_timeout).await;

        let descriptor = crate::pushdown::assemble(
            request.projection,
            request.static_predicates,
            dynamic_predicates,
            request.limit,
            request.aggregation,
            self.enable_aggregation_pushdown,
            self.enable_topn_pushdown,
        );
        let params = JobParams {
            target_consumer_endpoints: request.target_consumer_endpoints.clone(),
            qid: request.qid.clone(),
            dyn_token: dyn_token.clone(),
            target_batch_size: request.target_batch_size,
            compression_algorithm: request.compression_algorithm,
        };

        let run_result = job_runner.run(descriptor, params).await;

        if let Err(ref reason) = run_result {
            warn!(qid = %request.qid, %reason, "producer job failed, cleaning up before broadcast");
            self.registry.cleanup_on_failure(&request.qid);
        }

        // Broadcast precedes the local signal regardless of outcome so
        // consumers always advance to EOS (spec.md §4.5 steps 5-6).
        let results = broadcast_job_finished(
            &request.target_consumer_endpoints,
            &request.qid,
            &dyn_token,
            self.broadcast_timeout,
        )
        .await;
        for r in &results {
            if !r.ok {
                warn!(qid = %request.qid, endpoint = %r.endpoint, "endpoint did not acknowledge JOB_FINISHED");
            }
        }

        if run_result.is_ok() {
            self.registry
                .signal_job_finished(&request.qid)
                .map_err(|e| e.to_string())?;
            info!(qid = %request.qid, "dispatch completed");
        }

        run_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::WireTag;
    use crate::registry::PollResult;
    use predicate::NoDynamicPredicates;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct SucceedingRunner;
    #[async_trait]
    impl JobRunner for SucceedingRunner {
        async fn run(&self, _descriptor: JobDescriptor, _params: JobParams) -> Result<(), String> {
            Ok(())
        }
    }

    struct FailingRunner;
    #[async_trait]
    impl JobRunner for FailingRunner {
        async fn run(&self, _descriptor: JobDescriptor, _params: JobParams) -> Result<(), String> {
            Err("producer job runner exploded".into())
        }
    }

    fn request(qid: &str) -> DispatchRequest {
        DispatchRequest {
            qid: qid.to_string(),
            columns: vec![ColumnDescriptor {
                name: "a".into(),
                wire_tag: WireTag::Integer,
            }],
            projection: vec!["a".into()],
            static_predicates: vec![],
            limit: None,
            aggregation: None,
            target_consumer_endpoints: vec![],
            target_batch_size: 8192,
            compression_algorithm: crate::wire::Compression::None,
        }
    }

    #[tokio::test]
    async fn a_successful_run_reaches_end_of_stream() {
        let registry = Arc::new(Registry::new(8, Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(registry.clone(), Duration::from_millis(50), Duration::from_millis(50), true, true);
        dispatcher
            .dispatch(request("q1"), &NoDynamicPredicates, &SucceedingRunner)
            .await
            .unwrap();
        match registry.poll_page("q1", Duration::from_millis(50)).unwrap() {
            PollResult::EndOfStream => {}
            _ => panic!("expected EOS after a successful dispatch with no producers"),
        }
    }

    #[tokio::test]
    async fn a_failed_run_still_tears_down_the_query() {
        let registry = Arc::new(Registry::new(8, Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(registry.clone(), Duration::from_millis(50), Duration::from_millis(50), true, true);
        let result = dispatcher
            .dispatch(request("q1"), &NoDynamicPredicates, &FailingRunner)
            .await;
        assert!(result.is_err());
        assert!(!registry.is_registered("q1"));
    }

    struct FlagSettingPredicateSource {
        called: AtomicBool,
    }
    #[async_trait]
    impl PredicateSource for FlagSettingPredicateSource {
        async fn collect(&self, _qid: &str) -> Vec<Predicate> {
            self.called.store(true, Ordering::SeqCst);
            Vec::new()
        }
    }

    #[tokio::test]
    async fn dynamic_predicate_source_is_consulted() {
        let registry = Arc::new(Registry::new(8, Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(registry, Duration::from_millis(50), Duration::from_millis(50), true, true);
        let source = FlagSettingPredicateSource {
            called: AtomicBool::new(false),
        };
        dispatcher
            .dispatch(request("q1"), &source, &SucceedingRunner)
            .await
            .unwrap();
        assert!(source.called.load(Ordering::SeqCst));
    }

    #[test]
    fn from_config_reads_the_pushdown_flags_off_config() {
        use clap::Parser;
        let config = crate::config::Config::parse_from([
            "bridged",
            "--enable-aggregation-pushdown",
            "false",
            "--enable-topn-pushdown",
            "false",
        ]);
        let registry = Arc::new(Registry::new(8, Duration::from_secs(60)));
        let dispatcher = Dispatcher::from_config(registry, &config);
        assert!(!dispatcher.enable_aggregation_pushdown);
        assert!(!dispatcher.enable_topn_pushdown);
    }
}
