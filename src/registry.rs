//! Query buffer registry (C2): per-query bounded queue, producer-connection
//! accounting, schema handoff, capability-token issuance/validation,
//! terminal-state cleanup, and failure sweeping (spec.md §4.2).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::BridgeError;
use crate::page::{ColumnDescriptor, Page};
use crate::profile::Profile;

/// What a producer connection actually pushes into the queue: a decoded
/// page, or the single end-of-stream sentinel (spec.md §4.2
/// "enqueue a sentinel page denoting EOS").
enum QueueItem {
    Page(Page),
    Eos,
}

/// What `poll_page` hands back to the page source.
pub enum PollResult {
    Page(Page),
    EndOfStream,
    Timeout,
}

struct QueryState {
    token: String,
    columns: Option<Vec<ColumnDescriptor>>,
    queue: VecDeque<QueueItem>,
    capacity: usize,
    active_producers: i64,
    job_finished: bool,
    eos_emitted: bool,
    /// Set once `cleanup_on_failure`/`deregister` has run; further pushes
    /// are silently discarded and blocked pushers are woken (spec.md §4.2
    /// invariant 5).
    closed: bool,
    /// When the queue was first observed empty after EOS was emitted —
    /// the eviction sweep's TTL clock (spec.md §4.2 "Eviction").
    drained_since: Option<Instant>,
}

struct Entry {
    state: Mutex<QueryState>,
    not_full: Condvar,
    not_empty: Condvar,
    schema_ready: Condvar,
    profile: Arc<Profile>,
}

/// The single point of shared mutable state for all live queries
/// (spec.md §5 "Shared-resource policy").
pub struct Registry {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    default_capacity: usize,
    ttl: Duration,
}

impl Registry {
    pub fn new(default_capacity: usize, ttl: Duration) -> Self {
        Registry {
            entries: Mutex::new(HashMap::new()),
            default_capacity,
            ttl,
        }
    }

    fn entry(&self, qid: &str) -> Result<Arc<Entry>, BridgeError> {
        self.entries
            .lock()
            .unwrap()
            .get(qid)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownQuery { qid: qid.to_string() })
    }

    pub fn register_query(&self, qid: &str, token: &str) -> Result<Arc<Profile>, BridgeError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(qid) {
            return Err(BridgeError::Duplicate { qid: qid.to_string() });
        }
        let profile = Arc::new(Profile::default());
        let entry = Arc::new(Entry {
            state: Mutex::new(QueryState {
                token: token.to_string(),
                columns: None,
                queue: VecDeque::new(),
                capacity: self.default_capacity,
                active_producers: 0,
                job_finished: false,
                eos_emitted: false,
                closed: false,
                drained_since: None,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            schema_ready: Condvar::new(),
            profile: profile.clone(),
        });
        entries.insert(qid.to_string(), entry);
        Ok(profile)
    }

    pub fn register_schema(&self, qid: &str, columns: Vec<ColumnDescriptor>) -> Result<(), BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        state.columns = Some(columns);
        entry.schema_ready.notify_all();
        Ok(())
    }

    /// Producers that arrive before the page source registers the schema
    /// wait here (bounded retry, ~10s — spec.md §4.2).
    pub fn wait_for_schema(
        &self,
        qid: &str,
        timeout: Duration,
    ) -> Result<Vec<ColumnDescriptor>, BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        while state.columns.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return Err(BridgeError::SchemaNotRegistered {
                    qid: qid.to_string(),
                    retries: 0,
                });
            }
            let (guard, _timeout_result) = entry
                .schema_ready
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
        Ok(state.columns.clone().unwrap())
    }

    pub fn validate_token(&self, qid: &str, token: &str) -> bool {
        match self.entry(qid) {
            Ok(entry) => entry.state.lock().unwrap().token == token,
            Err(_) => false,
        }
    }

    pub fn profile(&self, qid: &str) -> Result<Arc<Profile>, BridgeError> {
        Ok(self.entry(qid)?.profile.clone())
    }

    pub fn increment_producers(&self, qid: &str) -> Result<i64, BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        state.active_producers += 1;
        Ok(state.active_producers)
    }

    /// Decrements the active-producer count and, if this was the last
    /// producer and the job is already finished, emits EOS (spec.md §4.2
    /// invariant 2). Must only be called after the producer's last page
    /// has been fully enqueued (spec.md §3 invariant 3).
    pub fn decrement_producers(&self, qid: &str) -> Result<i64, BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        state.active_producers -= 1;
        debug_assert!(state.active_producers >= 0);
        let count = state.active_producers;
        maybe_emit_eos(&mut state);
        entry.not_empty.notify_all();
        drop(state);
        Ok(count)
    }

    pub fn signal_job_finished(&self, qid: &str) -> Result<(), BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        state.job_finished = true;
        maybe_emit_eos(&mut state);
        entry.not_empty.notify_all();
        Ok(())
    }

    /// Blocking put into the bounded per-query queue. Cancelled (silently
    /// drops the page) once the registry has torn the query down
    /// (spec.md §4.2).
    pub fn push_page(&self, qid: &str, page: Page) -> Result<(), BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        loop {
            if state.closed {
                return Ok(()); // silently discarded, page released on drop
            }
            if state.queue.len() < state.capacity {
                state.queue.push_back(QueueItem::Page(page));
                entry.not_empty.notify_all();
                return Ok(());
            }
            state = entry.not_full.wait(state).unwrap();
        }
    }

    pub fn poll_page(&self, qid: &str, timeout: Duration) -> Result<PollResult, BridgeError> {
        let entry = self.entry(qid)?;
        let mut state = entry.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if state.closed {
                return Ok(PollResult::EndOfStream);
            }
            if let Some(item) = state.queue.pop_front() {
                entry.not_full.notify_all();
                return Ok(match item {
                    QueueItem::Page(p) => PollResult::Page(p),
                    QueueItem::Eos => {
                        mark_drained(&mut state);
                        PollResult::EndOfStream
                    }
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(PollResult::Timeout);
            }
            let (guard, _) = entry.not_empty.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    /// Immediate eviction: releases queued pages and forbids further
    /// pushes, without waiting for the TTL sweep (spec.md §4.2).
    pub fn cleanup_on_failure(&self, qid: &str) {
        self.teardown(qid);
    }

    /// Called by the page source on close; identical teardown to
    /// `cleanup_on_failure` (spec.md §4.2).
    pub fn deregister(&self, qid: &str) {
        self.teardown(qid);
    }

    fn teardown(&self, qid: &str) {
        let entry = match self.entries.lock().unwrap().remove(qid) {
            Some(e) => e,
            None => return,
        };
        let mut state = entry.state.lock().unwrap();
        state.closed = true;
        state.queue.clear(); // releases queued pages
        drop(state);
        entry.not_full.notify_all();
        entry.not_empty.notify_all();
        entry.schema_ready.notify_all();
    }

    /// Background sweep: evicts queries whose EOS has been emitted and
    /// queue has been empty for longer than the TTL (spec.md §4.2).
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .filter_map(|(qid, entry)| {
                    let state = entry.state.lock().unwrap();
                    match state.drained_since {
                        Some(since) if now.duration_since(since) > self.ttl => Some(qid.clone()),
                        _ => None,
                    }
                })
                .collect()
        };
        for qid in expired {
            self.teardown(&qid);
        }
    }

    pub fn is_registered(&self, qid: &str) -> bool {
        self.entries.lock().unwrap().contains_key(qid)
    }
}

fn maybe_emit_eos(state: &mut QueryState) {
    if state.job_finished && state.active_producers == 0 && !state.eos_emitted {
        state.eos_emitted = true;
        state.queue.push_back(QueueItem::Eos);
    }
}

fn mark_drained(state: &mut QueryState) {
    if state.queue.is_empty() {
        state.drained_since.get_or_insert_with(Instant::now);
    }
}
