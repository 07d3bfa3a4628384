//! Batch transport: the whole file in one request, every page's result in
//! one response. Never partially delivers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ExtractionTransport, PageEvent};
use crate::normalize::{BatchPage, RawPage};
use crate::{FileJob, TransportError};

/// Upload chunk granularity for coarse progress reporting.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct BatchResponse {
    success: bool,
    #[serde(default)]
    pages: Vec<BatchPage>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the batch extraction endpoint.
#[derive(Debug, Clone)]
pub struct BatchClient {
    url: String,
    lang: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl BatchClient {
    pub fn new(url: impl Into<String>, lang: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            lang: lang.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Send the whole file and return the full ordered page list, or fail as
    /// a whole. `on_upload` receives coarse byte-upload progress (0-100).
    pub async fn process_file(
        &self,
        job: &FileJob,
        on_upload: impl Fn(u8) + Send + Sync + 'static,
    ) -> Result<Vec<BatchPage>, TransportError> {
        let total = job.data.len();
        let sent = Arc::new(AtomicUsize::new(0));
        let chunks: Vec<Vec<u8>> = job
            .data
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(|c| c.to_vec())
            .collect();

        let body = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            let done = sent.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
            on_upload(upload_percent(done, total));
            Ok::<Vec<u8>, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total as u64)
            .file_name(job.name.clone())
            .mime_str(job.mime)
            .map_err(|e| TransportError::Connectivity(format!("build upload: {}", e)))?;
        let form = Form::new().part("file", part).text("lang", self.lang.clone());

        debug!(file = %job.name, bytes = total, url = %self.url, "uploading for batch extraction");

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransportError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Carry the server-provided message when the body has one.
            let message = response
                .json::<BatchResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(TransportError::Protocol(message));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| TransportError::ResponseFormat(e.to_string()))?;
        if !body.success {
            return Err(TransportError::Protocol(
                body.error.unwrap_or_else(|| "processing failed".to_string()),
            ));
        }

        debug!(file = %job.name, pages = body.pages.len(), "batch extraction complete");
        Ok(body.pages)
    }
}

fn upload_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done as u64 * 100 / total as u64).min(100) as u8
}

impl ExtractionTransport for BatchClient {
    fn name(&self) -> &str {
        "batch"
    }

    fn process<'a>(
        &'a self,
        job: &'a FileJob,
        events: mpsc::Sender<PageEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let progress = events.clone();
            let pages = self
                .process_file(job, move |percent| {
                    // Sync context; a full channel just drops a coarse tick.
                    let _ = progress.try_send(PageEvent::Progress {
                        completed: percent as u32,
                        total: 100,
                    });
                })
                .await?;

            let total = pages.len() as u32;
            for (ordinal, item) in pages.into_iter().enumerate() {
                let _ = events
                    .send(PageEvent::Completed(RawPage::Batch { ordinal, item }))
                    .await;
            }
            let _ = events
                .send(PageEvent::Progress {
                    completed: total,
                    total,
                })
                .await;
            Ok(())
        })
    }
}
