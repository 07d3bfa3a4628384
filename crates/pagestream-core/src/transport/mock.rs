//! Mock transport for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use super::{ExtractionTransport, PageEvent};
use crate::normalize::{BatchPage, RawPage, StreamPage};
use crate::{FileJob, TransportError};

/// One scripted step of a [`MockTransport`] invocation.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum MockStep {
    Started { page: u32, total_pages: u32 },
    StreamPage(StreamPage),
    BatchPage { ordinal: usize, item: BatchPage },
    Progress { completed: u32, total: u32 },
    /// Stop emitting and reject with this failure.
    Fail(TransportError),
}

/// A scripted [`ExtractionTransport`] for tests.
///
/// Each invocation pops the next script (the last one repeats if exhausted)
/// and emits its steps in order. Call counting via
/// [`call_count()`](MockTransport::call_count).
pub struct MockTransport {
    name: &'static str,
    scripts: Mutex<Vec<Vec<MockStep>>>,
    fallback: Vec<MockStep>,
    call_count: AtomicUsize,
}

impl MockTransport {
    /// Create a mock that replays `script` on every call.
    pub fn new(name: &'static str, script: Vec<MockStep>) -> Self {
        Self {
            name,
            scripts: Mutex::new(Vec::new()),
            fallback: script,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that replays one script per call, repeating the last.
    #[allow(dead_code)]
    pub fn with_sequence(name: &'static str, mut scripts: Vec<Vec<MockStep>>) -> Self {
        assert!(!scripts.is_empty(), "sequence must have at least one script");
        // Reverse so we can pop() from the front cheaply.
        scripts.reverse();
        let fallback = scripts.first().cloned().unwrap();
        Self {
            name,
            scripts: Mutex::new(scripts),
            fallback,
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `process()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<MockStep> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl ExtractionTransport for MockTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn process<'a>(
        &'a self,
        _job: &'a FileJob,
        events: mpsc::Sender<PageEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let script = self.next_script();

        Box::pin(async move {
            for step in script {
                match step {
                    MockStep::Started { page, total_pages } => {
                        let _ = events.send(PageEvent::Started { page, total_pages }).await;
                    }
                    MockStep::StreamPage(page) => {
                        let _ = events
                            .send(PageEvent::Completed(RawPage::Stream(page)))
                            .await;
                    }
                    MockStep::BatchPage { ordinal, item } => {
                        let _ = events
                            .send(PageEvent::Completed(RawPage::Batch { ordinal, item }))
                            .await;
                    }
                    MockStep::Progress { completed, total } => {
                        let _ = events.send(PageEvent::Progress { completed, total }).await;
                    }
                    MockStep::Fail(error) => {
                        return Err(error);
                    }
                }
            }
            Ok(())
        })
    }
}
