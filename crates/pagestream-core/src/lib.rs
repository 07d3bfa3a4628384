use thiserror::Error;

pub mod config_file;
pub mod normalize;
pub mod orchestrator;
pub mod session;
pub mod transport;

// Re-export for convenience
pub use normalize::{BatchPage, RawPage, StreamPage, word_count};
pub use orchestrator::Ingestor;
pub use session::{ProcessingStage, SessionState};
pub use transport::{ExtractionTransport, PageEvent, TransportKind, select_transport};

/// The kind of media a queued file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Image,
}

/// One user-submitted file awaiting or undergoing processing.
///
/// Immutable once created; the queue index is stable for the lifetime of the
/// queue it was enqueued into.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub index: usize,
    pub name: String,
    pub mime: &'static str,
    pub kind: MediaKind,
    pub data: Vec<u8>,
}

impl FileJob {
    /// Build a job from raw file bytes, detecting the media kind from the
    /// file name and magic bytes.
    pub fn from_bytes(
        index: usize,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, JobError> {
        let name = name.into();
        if data.is_empty() {
            return Err(JobError::Empty { name });
        }
        let (kind, mime) = detect_media(&name, &data).ok_or_else(|| JobError::Unsupported {
            name: name.clone(),
        })?;
        Ok(Self {
            index,
            name,
            mime,
            kind,
            data,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == MediaKind::Pdf
    }
}

/// Detect media kind and MIME type from extension and magic bytes.
fn detect_media(name: &str, data: &[u8]) -> Option<(MediaKind, &'static str)> {
    let lower = name.to_lowercase();

    if data.starts_with(b"%PDF-") || lower.ends_with(".pdf") {
        return Some((MediaKind::Pdf, "application/pdf"));
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G']) || lower.ends_with(".png") {
        return Some((MediaKind::Image, "image/png"));
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) || lower.ends_with(".jpg") || lower.ends_with(".jpeg")
    {
        return Some((MediaKind::Image, "image/jpeg"));
    }
    if data.starts_with(b"GIF8") || lower.ends_with(".gif") {
        return Some((MediaKind::Image, "image/gif"));
    }
    if data.starts_with(b"II*\0")
        || data.starts_with(b"MM\0*")
        || lower.ends_with(".tif")
        || lower.ends_with(".tiff")
    {
        return Some((MediaKind::Image, "image/tiff"));
    }
    if data.starts_with(b"BM") || lower.ends_with(".bmp") {
        return Some((MediaKind::Image, "image/bmp"));
    }

    None
}

/// Canonical result for one page of one file.
///
/// A record with a non-empty `error` and empty text is a failed page; it is
/// appended like any other so failures stay visible in the result stream.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub file_index: usize,
    pub file_name: String,
    /// 1-based page number as reported by the extraction service.
    pub page: u32,
    pub text: String,
    pub word_count: usize,
    pub error: Option<String>,
    pub confidence: Option<f64>,
    /// Opaque preview-image reference, passed through for display layers.
    pub preview: Option<String>,
    /// Session-assigned append order, monotonic within one session.
    pub seq: u64,
}

impl PageRecord {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate progress counters for the file currently being processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionProgress {
    pub completed: u32,
    pub total: u32,
    /// `round(completed / total * 100)`, defined as 0 when total is 0.
    pub percentage: u8,
}

impl SessionProgress {
    pub fn new(completed: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// Progress events emitted by the orchestrator while a queue is processed.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    FileStarted {
        index: usize,
        name: String,
    },
    /// A page result was appended to the session, streamed or batched.
    PageAdded {
        record: PageRecord,
    },
    Progress {
        progress: SessionProgress,
    },
    /// Streaming failed for this file; it is being retried over the batch path.
    FallingBack {
        index: usize,
        name: String,
        reason: String,
    },
    FileSettled {
        index: usize,
        name: String,
    },
    QueueFinished,
}

/// A failed transport invocation for one file.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The channel/request could not be established or was dropped mid-flight.
    #[error("connection failure: {0}")]
    Connectivity(String),
    /// The service reported a fatal file-level failure.
    #[error("extraction service error: {0}")]
    Protocol(String),
    /// A success payload that could not be decoded.
    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

/// A file that cannot be handed to any transport.
#[derive(Error, Debug, Clone)]
pub enum JobError {
    #[error("{name}: file is empty")]
    Empty { name: String },
    #[error("{name}: unsupported file type")]
    Unsupported { name: String },
}

/// Runtime configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the page-streaming extraction channel, host:port.
    pub stream_addr: String,
    /// URL of the batch extraction endpoint.
    pub batch_url: String,
    /// Base URL of the document-assistant service.
    pub assist_url: String,
    /// Prefer the page-streaming path for paginated documents.
    pub prefer_streaming: bool,
    /// OCR language hint sent with every request.
    pub lang: String,
    /// Bounded wait for the batch response, in seconds.
    pub batch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_addr: "127.0.0.1:8001".to_string(),
            batch_url: "http://127.0.0.1:8000/upload/".to_string(),
            assist_url: "http://127.0.0.1:8000".to_string(),
            prefer_streaming: true,
            lang: "eng".to_string(),
            batch_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Resolve configuration: environment variables over config files over
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_file(&config_file::load_config());

        if let Ok(addr) = std::env::var("PAGESTREAM_STREAM_ADDR") {
            config.stream_addr = addr;
        }
        if let Ok(url) = std::env::var("PAGESTREAM_BATCH_URL") {
            config.batch_url = url;
        }
        if let Ok(url) = std::env::var("PAGESTREAM_ASSIST_URL") {
            config.assist_url = url;
        }
        if let Ok(val) = std::env::var("PAGESTREAM_PREFER_STREAMING") {
            config.prefer_streaming = parse_bool(&val);
        }
        if let Ok(lang) = std::env::var("PAGESTREAM_LANG") {
            config.lang = lang;
        }
        if let Ok(secs) = std::env::var("PAGESTREAM_BATCH_TIMEOUT")
            && let Ok(secs) = secs.parse()
        {
            config.batch_timeout_secs = secs;
        }

        config
    }

    /// Overlay an on-disk config file onto this configuration.
    pub fn apply_file(&mut self, file: &config_file::ConfigFile) {
        if let Some(ref endpoints) = file.endpoints {
            if let Some(ref addr) = endpoints.stream_addr {
                self.stream_addr = addr.clone();
            }
            if let Some(ref url) = endpoints.batch_url {
                self.batch_url = url.clone();
            }
            if let Some(ref url) = endpoints.assist_url {
                self.assist_url = url.clone();
            }
        }
        if let Some(ref processing) = file.processing {
            if let Some(prefer) = processing.prefer_streaming {
                self.prefer_streaming = prefer;
            }
            if let Some(ref lang) = processing.lang {
                self.lang = lang.clone();
            }
            if let Some(secs) = processing.batch_timeout_secs {
                self.batch_timeout_secs = secs;
            }
        }
    }
}

fn parse_bool(val: &str) -> bool {
    !matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_detected_by_magic_bytes() {
        let job = FileJob::from_bytes(0, "scan", b"%PDF-1.7 rest".to_vec()).unwrap();
        assert_eq!(job.kind, MediaKind::Pdf);
        assert_eq!(job.mime, "application/pdf");
        assert!(job.is_pdf());
    }

    #[test]
    fn pdf_detected_by_extension() {
        let job = FileJob::from_bytes(0, "report.PDF", vec![1, 2, 3]).unwrap();
        assert_eq!(job.kind, MediaKind::Pdf);
    }

    #[test]
    fn png_and_jpeg_detected() {
        let png = FileJob::from_bytes(0, "a", vec![0x89, b'P', b'N', b'G', 0]).unwrap();
        assert_eq!(png.kind, MediaKind::Image);
        assert_eq!(png.mime, "image/png");

        let jpg = FileJob::from_bytes(1, "photo.jpeg", vec![1]).unwrap();
        assert_eq!(jpg.mime, "image/jpeg");
    }

    #[test]
    fn empty_file_rejected() {
        let err = FileJob::from_bytes(0, "empty.pdf", vec![]).unwrap_err();
        assert!(matches!(err, JobError::Empty { .. }));
    }

    #[test]
    fn unknown_content_rejected() {
        let err = FileJob::from_bytes(0, "data.bin", vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, JobError::Unsupported { .. }));
    }

    #[test]
    fn percentage_zero_total_is_zero() {
        assert_eq!(SessionProgress::new(0, 0).percentage, 0);
        assert_eq!(SessionProgress::new(5, 0).percentage, 0);
    }

    #[test]
    fn percentage_rounds() {
        assert_eq!(SessionProgress::new(3, 3).percentage, 100);
        assert_eq!(SessionProgress::new(1, 3).percentage, 33);
        assert_eq!(SessionProgress::new(2, 3).percentage, 67);
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("FALSE"));
        assert!(!parse_bool("off"));
    }
}
