//! Extraction transports: the page-streaming channel and the batch
//! request/response path, behind one capability trait.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::normalize::RawPage;
use crate::{FileJob, JobError, MediaKind, TransportError};

pub mod batch;
pub mod mock;
pub mod stream;

pub use batch::BatchClient;
pub use stream::StreamingClient;

/// Ordered page-lifecycle events emitted by a transport while one file is
/// processed. Delivery order is authoritative; events are never reordered.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// Page N of M has begun. `total_pages` is authoritative once first seen.
    Started { page: u32, total_pages: u32 },
    /// A page finished, successfully or with an embedded per-page error.
    Completed(RawPage),
    /// Per-file progress: pages completed out of the announced total on the
    /// streaming path, or coarse upload percent out of 100 on the batch path.
    Progress { completed: u32, total: u32 },
}

/// A transport capable of driving one file through the extraction service.
///
/// Implementations emit [`PageEvent`]s through the given channel as results
/// arrive, then resolve with the file-level outcome. The sender is dropped
/// when the invocation settles.
pub trait ExtractionTransport: Send + Sync {
    /// Display name for logs.
    fn name(&self) -> &str;

    fn process<'a>(
        &'a self,
        job: &'a FileJob,
        events: mpsc::Sender<PageEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;
}

/// Which transport the policy picked for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Streaming,
    Batch,
}

/// Pick a transport for `job`: the page-streaming path for paginated
/// documents when enabled, the batch path otherwise. Fails without any
/// network activity when the job cannot be sent at all.
pub fn select_transport(job: &FileJob, prefer_streaming: bool) -> Result<TransportKind, JobError> {
    if job.data.is_empty() {
        return Err(JobError::Empty {
            name: job.name.clone(),
        });
    }
    if job.kind == MediaKind::Pdf && prefer_streaming {
        Ok(TransportKind::Streaming)
    } else {
        Ok(TransportKind::Batch)
    }
}
