//! Profiling hooks (C7): per-query lock-free counters. Observational only
//! — writes never block or backpressure the ingestion path (spec.md §4.7).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Profile {
    bytes_read: AtomicU64,
    bytes_decompressed: AtomicU64,
    decode_nanos: AtomicU64,
    enqueue_nanos: AtomicU64,
    pages_pushed: AtomicU64,
}

/// A consistent-enough point-in-time view, safe to log or export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub bytes_read: u64,
    pub bytes_decompressed: u64,
    pub decode_nanos: u64,
    pub enqueue_nanos: u64,
    pub pages_pushed: u64,
}

impl Profile {
    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_decompressed(&self, n: u64) {
        self.bytes_decompressed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_decode_time(&self, d: std::time::Duration) {
        self.decode_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn add_enqueue_time(&self, d: std::time::Duration) {
        self.enqueue_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn add_page(&self) {
        self.pages_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_decompressed: self.bytes_decompressed.load(Ordering::Relaxed),
            decode_nanos: self.decode_nanos.load(Ordering::Relaxed),
            enqueue_nanos: self.enqueue_nanos.load(Ordering::Relaxed),
            pages_pushed: self.pages_pushed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let p = Profile::default();
        p.add_bytes_read(10);
        p.add_bytes_read(5);
        p.add_page();
        let snap = p.snapshot();
        assert_eq!(snap.bytes_read, 15);
        assert_eq!(snap.pages_pushed, 1);
    }
}
