//! Bounded worker pool with caller-runs backpressure (spec.md §5: "Parallel
//! OS threads... suspension points: accept, socket read, bounded-queue
//! put"). When the pool is saturated the accept loop itself runs the job,
//! which throttles `accept()` instead of growing an unbounded backlog.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size thread pool. Submitting past capacity runs the job on the
/// submitting thread rather than blocking indefinitely or dropping work.
pub struct WorkerPool {
    sender: SyncSender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..num_threads)
            .map(|id| spawn_worker(id, Arc::clone(&receiver)))
            .collect();
        WorkerPool { sender, workers }
    }

    /// Submits a job. Blocks only long enough to discover the queue is
    /// full, then falls back to running the job inline (caller-runs
    /// policy), bounding how many ingestion threads can pile up.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let boxed: Job = Box::new(job);
        match self.sender.try_send(boxed) {
            Ok(()) => {}
            Err(std::sync::mpsc::TrySendError::Full(job)) => job(),
            Err(std::sync::mpsc::TrySendError::Disconnected(job)) => job(),
        }
    }
}

fn spawn_worker(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("ingest-worker-{id}"))
        .spawn(move || loop {
            let job = {
                let rx = receiver.lock().unwrap();
                rx.recv()
            };
            match job {
                Ok(job) => job(),
                Err(_) => break, // pool dropped
            }
        })
        .expect("failed to spawn ingestion worker thread")
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2, 4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn falls_back_to_caller_runs_when_saturated() {
        // A single-thread pool with zero queue capacity forces every
        // submission past the first to run inline.
        let pool = WorkerPool::new(1, 0);
        let ran_inline = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&ran_inline);
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(20));
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&ran_inline);
        pool.submit(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        drop(pool);
        assert_eq!(ran_inline.load(Ordering::SeqCst), 2);
    }
}
