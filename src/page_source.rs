//! Pull-based page source (C4): the query engine's only handle onto a
//! registered query's pages (spec.md §4.4).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::BridgeError;
use crate::page::{ColumnDescriptor, Page};
use crate::registry::{PollResult, Registry};

/// One page at a time, pulled on demand. `next_page` blocks up to
/// `poll_timeout` per call and returns `None` only once EOS has been
/// observed; a timeout with no data yields `Some(None-like)` via a plain
/// empty poll, surfaced to the caller as `Ok(None)` only at true EOS —
/// everything else is a page or an error.
pub struct PageSource {
    qid: String,
    registry: Arc<Registry>,
    poll_timeout: Duration,
    done: bool,
}

/// What one poll of the source produced.
pub enum PageSourcePoll {
    Page(Page),
    /// No page arrived within the poll window; the caller may retry.
    Idle,
    /// The producer job finished and all queued pages were drained.
    EndOfStream,
}

impl PageSource {
    /// Registers the schema with the registry and returns a handle ready to
    /// be polled (spec.md §4.4 "construction"). The query itself must
    /// already be registered — that, and minting its capability token, is
    /// exclusively the dispatcher's job (spec.md §4.5 step 1).
    pub fn open(
        registry: Arc<Registry>,
        qid: &str,
        columns: Vec<ColumnDescriptor>,
        poll_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        registry.register_schema(qid, columns)?;
        Ok(PageSource {
            qid: qid.to_string(),
            registry,
            poll_timeout,
            done: false,
        })
    }

    pub fn qid(&self) -> &str {
        &self.qid
    }

    /// Polls for the next page. Once this returns `EndOfStream`, every
    /// subsequent call returns `EndOfStream` immediately without touching
    /// the registry (idempotent terminal state, spec.md §4.4).
    pub fn next_page(&mut self) -> Result<PageSourcePoll, BridgeError> {
        if self.done {
            return Ok(PageSourcePoll::EndOfStream);
        }
        match self.registry.poll_page(&self.qid, self.poll_timeout)? {
            PollResult::Page(p) => Ok(PageSourcePoll::Page(p)),
            PollResult::Timeout => Ok(PageSourcePoll::Idle),
            PollResult::EndOfStream => {
                self.done = true;
                Ok(PageSourcePoll::EndOfStream)
            }
        }
    }

    /// Idempotent close: deregisters the query, releasing any pages still
    /// queued and waking any producer still blocked on a full queue
    /// (spec.md §4.4 "the engine may close early").
    pub fn close(&mut self) {
        if !self.done {
            debug!(qid = %self.qid, "page source closed before end of stream");
            self.registry.deregister(&self.qid);
            self.done = true;
        }
    }
}

impl Drop for PageSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::WireTag;
    use std::time::Duration;

    fn descriptor(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            wire_tag: WireTag::Integer,
        }
    }

    #[test]
    fn closing_early_releases_the_query() {
        let registry = Arc::new(Registry::new(4, Duration::from_secs(60)));
        registry.register_query("q1", "tok").unwrap();
        let mut src = PageSource::open(
            registry.clone(),
            "q1",
            vec![descriptor("a")],
            Duration::from_millis(50),
        )
        .unwrap();
        assert!(registry.is_registered("q1"));
        src.close();
        assert!(!registry.is_registered("q1"));
    }

    #[test]
    fn idle_poll_does_not_terminate_the_stream() {
        let registry = Arc::new(Registry::new(4, Duration::from_secs(60)));
        registry.register_query("q1", "tok").unwrap();
        let mut src = PageSource::open(
            registry.clone(),
            "q1",
            vec![descriptor("a")],
            Duration::from_millis(20),
        )
        .unwrap();
        match src.next_page().unwrap() {
            PageSourcePoll::Idle => {}
            _ => panic!("expected idle poll with nothing queued"),
        }
        match src.next_page().unwrap() {
            PageSourcePoll::Idle => {}
            _ => panic!("idle poll should not have flipped to EOS"),
        }
    }

    #[test]
    fn end_of_stream_is_sticky() {
        let registry = Arc::new(Registry::new(4, Duration::from_secs(60)));
        registry.register_query("q1", "tok").unwrap();
        let mut src = PageSource::open(
            registry.clone(),
            "q1",
            vec![descriptor("a")],
            Duration::from_millis(20),
        )
        .unwrap();
        registry.signal_job_finished("q1").unwrap();
        match src.next_page().unwrap() {
            PageSourcePoll::EndOfStream => {}
            _ => panic!("expected EOS once the job finished with no producers"),
        }
        match src.next_page().unwrap() {
            PageSourcePoll::EndOfStream => {}
            _ => panic!("EOS should be sticky"),
        }
    }
}
