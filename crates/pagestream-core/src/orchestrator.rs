//! Ingestion orchestrator: drives each queued file through a transport,
//! normalizes results as they arrive, and aggregates progress.
//!
//! Files are processed strictly sequentially; a file's transport has settled
//! (succeeded, or failed with the fallback settled) before the next file
//! starts. The orchestrator is the only writer of the session for the whole
//! run, so no locking is needed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::normalize;
use crate::session::SessionState;
use crate::transport::{
    BatchClient, ExtractionTransport, PageEvent, StreamingClient, TransportKind, select_transport,
};
use crate::{Config, FileJob, IngestEvent, TransportError};

/// Capacity of the per-file page-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Drives a queue of files through the extraction transports.
pub struct Ingestor {
    streaming: Arc<dyn ExtractionTransport>,
    batch: Arc<dyn ExtractionTransport>,
    prefer_streaming: bool,
}

impl Ingestor {
    pub fn new(config: &Config) -> Self {
        Self {
            streaming: Arc::new(StreamingClient::new(&config.stream_addr, &config.lang)),
            batch: Arc::new(BatchClient::new(
                &config.batch_url,
                &config.lang,
                Duration::from_secs(config.batch_timeout_secs),
            )),
            prefer_streaming: config.prefer_streaming,
        }
    }

    /// Build an ingestor over explicit transports.
    pub fn with_transports(
        streaming: Arc<dyn ExtractionTransport>,
        batch: Arc<dyn ExtractionTransport>,
        prefer_streaming: bool,
    ) -> Self {
        Self {
            streaming,
            batch,
            prefer_streaming,
        }
    }

    /// Process every queued file in order, appending page results to the
    /// session the moment each page finishes and emitting [`IngestEvent`]s
    /// for observers.
    ///
    /// No failure is fatal to the run: a file whose transports all fail gets
    /// one synthetic error record and the queue advances. An empty queue is a
    /// no-op.
    pub async fn process_queue(
        &self,
        session: &mut SessionState,
        mut on_event: impl FnMut(IngestEvent),
    ) {
        if session.files().is_empty() {
            return;
        }

        session.clear_results();
        session.set_processing(true);

        let jobs: Vec<FileJob> = session.files().to_vec();
        for job in &jobs {
            session.begin_file(job);
            on_event(IngestEvent::FileStarted {
                index: job.index,
                name: job.name.clone(),
            });

            match select_transport(job, self.prefer_streaming) {
                Err(e) => {
                    warn!(file = %job.name, error = %e, "transport selection failed");
                    append_error(session, job, &e.to_string(), &mut on_event);
                }
                Ok(TransportKind::Streaming) => {
                    if let Err(stream_err) = self
                        .drive(self.streaming.as_ref(), job, session, &mut on_event)
                        .await
                    {
                        // Pages already streamed are kept; the batch result is
                        // appended in addition, without merging by page number.
                        warn!(
                            file = %job.name,
                            error = %stream_err,
                            "streaming failed, falling back to batch"
                        );
                        on_event(IngestEvent::FallingBack {
                            index: job.index,
                            name: job.name.clone(),
                            reason: stream_err.to_string(),
                        });
                        if let Err(batch_err) = self
                            .drive(self.batch.as_ref(), job, session, &mut on_event)
                            .await
                        {
                            warn!(file = %job.name, error = %batch_err, "batch fallback failed");
                            append_error(session, job, &batch_err.to_string(), &mut on_event);
                        }
                    }
                }
                Ok(TransportKind::Batch) => {
                    if let Err(e) = self
                        .drive(self.batch.as_ref(), job, session, &mut on_event)
                        .await
                    {
                        warn!(file = %job.name, error = %e, "batch extraction failed");
                        append_error(session, job, &e.to_string(), &mut on_event);
                    }
                }
            }

            session.end_file();
            on_event(IngestEvent::FileSettled {
                index: job.index,
                name: job.name.clone(),
            });
        }

        session.set_processing(false);
        on_event(IngestEvent::QueueFinished);
    }

    /// Run one transport for one file, applying its events to the session as
    /// they arrive. The transport future and the event drain run concurrently
    /// in this task, so each page is visible the moment it finishes rather
    /// than when the file settles.
    async fn drive(
        &self,
        transport: &dyn ExtractionTransport,
        job: &FileJob,
        session: &mut SessionState,
        on_event: &mut impl FnMut(IngestEvent),
    ) -> Result<(), TransportError> {
        debug!(file = %job.name, transport = transport.name(), "starting transport");
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport_fut = transport.process(job, tx);

        let drain = async {
            while let Some(event) = rx.recv().await {
                match event {
                    PageEvent::Started { page, total_pages } => {
                        debug!(file = %job.name, page, total_pages, "page started");
                    }
                    PageEvent::Completed(raw) => {
                        let record = session.append_page(normalize::to_record(job, &raw)).clone();
                        on_event(IngestEvent::PageAdded { record });
                    }
                    PageEvent::Progress { completed, total } => {
                        session.record_progress(completed, total);
                        on_event(IngestEvent::Progress {
                            progress: session.progress().clone(),
                        });
                    }
                }
            }
        };

        let (outcome, ()) = join(transport_fut, drain).await;
        outcome
    }
}

fn append_error(
    session: &mut SessionState,
    job: &FileJob,
    message: &str,
    on_event: &mut impl FnMut(IngestEvent),
) {
    let record = normalize::error_record(job, format!("Processing failed: {}", message));
    let record = session.append_page(record).clone();
    on_event(IngestEvent::PageAdded { record });
}
