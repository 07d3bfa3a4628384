//! Page-streaming transport: one request, a live sequence of page events
//! over a newline-delimited JSON channel.

use std::future::Future;
use std::pin::Pin;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ExtractionTransport, PageEvent};
use crate::normalize::{RawPage, StreamPage};
use crate::{FileJob, TransportError};

/// Undecodable messages tolerated per file before the stream is failed.
/// Isolated decode failures are skipped; a flood of them means the channel
/// is not speaking our protocol.
const MAX_MALFORMED_MESSAGES: usize = 25;

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    file_data: String,
    filename: &'a str,
    lang: &'a str,
}

/// Messages the extraction service sends over the channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamMessage {
    PageStart { page: u32, total_pages: u32 },
    PageComplete(StreamPage),
    ProcessingComplete {},
    Error { error: String },
}

/// Client for the page-streaming extraction channel.
#[derive(Debug, Clone)]
pub struct StreamingClient {
    addr: String,
    lang: String,
}

impl StreamingClient {
    pub fn new(addr: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            lang: lang.into(),
        }
    }

    /// Send `job` once and forward page events in server-send order until the
    /// service reports completion.
    ///
    /// Any rejection leaves already-forwarded events valid: the caller keeps
    /// partially streamed pages and only the undelivered remainder is lost.
    async fn run(
        &self,
        job: &FileJob,
        events: mpsc::Sender<PageEvent>,
    ) -> Result<(), TransportError> {
        let socket = TcpStream::connect(&self.addr).await.map_err(|e| {
            TransportError::Connectivity(format!("connect {}: {}", self.addr, e))
        })?;
        let (read_half, mut write_half) = socket.into_split();

        let request = StreamRequest {
            file_data: BASE64.encode(&job.data),
            filename: &job.name,
            lang: &self.lang,
        };
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| TransportError::ResponseFormat(format!("encode request: {}", e)))?;
        line.push(b'\n');
        write_half
            .write_all(&line)
            .await
            .map_err(|e| TransportError::Connectivity(format!("send request: {}", e)))?;
        write_half
            .flush()
            .await
            .map_err(|e| TransportError::Connectivity(format!("send request: {}", e)))?;
        debug!(file = %job.name, bytes = job.size(), "sent file for page streaming");

        let mut lines = BufReader::new(read_half).lines();
        let mut malformed = 0usize;
        let mut total_pages = 0u32;
        let mut completed = 0u32;

        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| TransportError::Connectivity(format!("channel read: {}", e)))?;
            let Some(line) = line else {
                // EOF without processing_complete: the channel dropped.
                return Err(TransportError::Connectivity(
                    "channel closed before processing completed".to_string(),
                ));
            };
            if line.trim().is_empty() {
                continue;
            }

            let message: StreamMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    malformed += 1;
                    warn!(file = %job.name, error = %e, "skipping undecodable stream message");
                    if malformed > MAX_MALFORMED_MESSAGES {
                        return Err(TransportError::ResponseFormat(format!(
                            "{} undecodable messages on one channel",
                            malformed
                        )));
                    }
                    continue;
                }
            };

            match message {
                StreamMessage::PageStart { page, total_pages: total } => {
                    total_pages = total;
                    debug!(file = %job.name, page, total, "page started");
                    let _ = events.send(PageEvent::Started { page, total_pages }).await;
                    let _ = events
                        .send(PageEvent::Progress {
                            completed,
                            total: total_pages,
                        })
                        .await;
                }
                StreamMessage::PageComplete(page) => {
                    completed += 1;
                    let _ = events.send(PageEvent::Completed(RawPage::Stream(page))).await;
                    let _ = events
                        .send(PageEvent::Progress {
                            completed,
                            total: total_pages,
                        })
                        .await;
                }
                StreamMessage::ProcessingComplete {} => {
                    debug!(file = %job.name, completed, "page streaming complete");
                    return Ok(());
                }
                StreamMessage::Error { error } => {
                    return Err(TransportError::Protocol(error));
                }
            }
        }
    }
}

impl ExtractionTransport for StreamingClient {
    fn name(&self) -> &str {
        "streaming"
    }

    fn process<'a>(
        &'a self,
        job: &'a FileJob,
        events: mpsc::Sender<PageEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(self.run(job, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-connection fake extraction service: reads the request line, sends
    /// each scripted line, then closes. Returns the request it saw.
    async fn fake_service(script: Vec<String>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let request = lines.next_line().await.unwrap().unwrap_or_default();
            for line in script {
                write_half.write_all(line.as_bytes()).await.unwrap();
                write_half.write_all(b"\n").await.unwrap();
            }
            write_half.flush().await.unwrap();
            request
        });
        (addr, handle)
    }

    fn job() -> FileJob {
        FileJob::from_bytes(0, "doc.pdf", b"%PDF-1.4 body".to_vec()).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<PageEvent>) -> Vec<PageEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn completed_texts(events: &[PageEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PageEvent::Completed(RawPage::Stream(p)) => Some(p.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn streams_pages_in_order_and_completes() {
        let (addr, server) = fake_service(vec![
            r#"{"type":"page_start","page":1,"total_pages":2}"#.to_string(),
            r#"{"type":"page_complete","page":1,"text":"A"}"#.to_string(),
            r#"{"type":"page_start","page":2,"total_pages":2}"#.to_string(),
            r#"{"type":"page_complete","page":2,"text":"B"}"#.to_string(),
            r#"{"type":"processing_complete"}"#.to_string(),
        ])
        .await;

        let client = StreamingClient::new(addr, "eng");
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = client.run(&job(), tx).await;
        assert!(outcome.is_ok());

        let events = drain(&mut rx);
        assert_eq!(completed_texts(&events), vec!["A", "B"]);

        // Final progress must be 2 of 2.
        let last_progress = events
            .iter()
            .rev()
            .find_map(|e| match e {
                PageEvent::Progress { completed, total } => Some((*completed, *total)),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_progress, (2, 2));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn request_carries_encoded_file_and_metadata() {
        let (addr, server) =
            fake_service(vec![r#"{"type":"processing_complete"}"#.to_string()]).await;

        let client = StreamingClient::new(addr, "deu");
        let (tx, _rx) = mpsc::channel(64);
        client.run(&job(), tx).await.unwrap();

        let request = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(value["filename"], "doc.pdf");
        assert_eq!(value["lang"], "deu");
        let decoded = BASE64.decode(value["file_data"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn out_of_order_pages_are_forwarded_in_arrival_order() {
        let (addr, _server) = fake_service(vec![
            r#"{"type":"page_start","page":1,"total_pages":2}"#.to_string(),
            r#"{"type":"page_complete","page":2,"text":"second"}"#.to_string(),
            r#"{"type":"page_complete","page":1,"text":"first"}"#.to_string(),
            r#"{"type":"processing_complete"}"#.to_string(),
        ])
        .await;

        let client = StreamingClient::new(addr, "eng");
        let (tx, mut rx) = mpsc::channel(64);
        client.run(&job(), tx).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(completed_texts(&events), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped() {
        let (addr, _server) = fake_service(vec![
            r#"{"type":"page_start","page":1,"total_pages":1}"#.to_string(),
            "this is not json".to_string(),
            r#"{"unknown":"shape"}"#.to_string(),
            r#"{"type":"page_complete","page":1,"text":"ok"}"#.to_string(),
            r#"{"type":"processing_complete"}"#.to_string(),
        ])
        .await;

        let client = StreamingClient::new(addr, "eng");
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = client.run(&job(), tx).await;
        assert!(outcome.is_ok());

        let events = drain(&mut rx);
        assert_eq!(completed_texts(&events), vec!["ok"]);
    }

    #[tokio::test]
    async fn fatal_error_event_rejects_with_protocol() {
        let (addr, _server) = fake_service(vec![
            r#"{"type":"page_complete","page":1,"text":"partial"}"#.to_string(),
            r#"{"type":"error","error":"OCR engine crashed"}"#.to_string(),
        ])
        .await;

        let client = StreamingClient::new(addr, "eng");
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = client.run(&job(), tx).await;
        match outcome {
            Err(TransportError::Protocol(message)) => {
                assert_eq!(message, "OCR engine crashed");
            }
            other => panic!("expected protocol failure, got {:?}", other),
        }

        // The partially streamed page was still delivered.
        let events = drain(&mut rx);
        assert_eq!(completed_texts(&events), vec!["partial"]);
    }

    #[tokio::test]
    async fn disconnect_rejects_with_connectivity_keeping_delivered_pages() {
        let (addr, _server) = fake_service(vec![
            r#"{"type":"page_start","page":1,"total_pages":3}"#.to_string(),
            r#"{"type":"page_complete","page":1,"text":"only"}"#.to_string(),
            // Server closes without processing_complete.
        ])
        .await;

        let client = StreamingClient::new(addr, "eng");
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = client.run(&job(), tx).await;
        assert!(matches!(outcome, Err(TransportError::Connectivity(_))));

        let events = drain(&mut rx);
        assert_eq!(completed_texts(&events), vec!["only"]);
    }

    #[tokio::test]
    async fn unreachable_service_rejects_with_connectivity() {
        // Bind then drop a listener so the port is closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = StreamingClient::new(addr, "eng");
        let (tx, _rx) = mpsc::channel(64);
        let outcome = client.run(&job(), tx).await;
        assert!(matches!(outcome, Err(TransportError::Connectivity(_))));
    }
}
