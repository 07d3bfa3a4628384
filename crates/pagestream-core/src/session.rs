//! Shared session state: the file queue, accumulated page results, and
//! per-file progress.
//!
//! Single owner, single writer. Every operation is a synchronous state
//! transition; the orchestrator is the only component that mutates a session
//! while a queue is being processed.

use crate::{FileJob, PageRecord, SessionProgress};

/// Coarse stage of the session, for display layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessingStage {
    #[default]
    Idle,
    Processing,
}

/// Marker for the file currently in flight.
#[derive(Debug, Clone)]
pub struct CurrentFile {
    pub index: usize,
    pub name: String,
}

/// The mutable record of one interactive extraction session.
#[derive(Debug, Default)]
pub struct SessionState {
    files: Vec<FileJob>,
    pages: Vec<PageRecord>,
    progress: SessionProgress,
    current: Option<CurrentFile>,
    processing: bool,
    stage: ProcessingStage,
    combined: String,
    next_seq: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queue with `files`, discarding all accumulated results and
    /// progress. Enqueuing an empty list is equivalent to a clear.
    pub fn enqueue(&mut self, files: Vec<FileJob>) {
        self.files = files;
        self.pages.clear();
        self.progress = SessionProgress::default();
        self.current = None;
        self.processing = false;
        self.stage = ProcessingStage::Idle;
        self.combined.clear();
    }

    pub fn files(&self) -> &[FileJob] {
        &self.files
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    pub fn current(&self) -> Option<&CurrentFile> {
        self.current.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    pub fn set_processing(&mut self, on: bool) {
        self.processing = on;
        self.stage = if on {
            ProcessingStage::Processing
        } else {
            ProcessingStage::Idle
        };
    }

    /// Drop accumulated page results while keeping the queue, so the same
    /// queue can be re-run from scratch.
    pub fn clear_results(&mut self) {
        self.pages.clear();
        self.combined.clear();
        self.progress = SessionProgress::default();
    }

    /// Mark `job` as the file currently in flight and reset per-file progress.
    pub fn begin_file(&mut self, job: &FileJob) {
        self.current = Some(CurrentFile {
            index: job.index,
            name: job.name.clone(),
        });
        self.progress = SessionProgress::default();
    }

    /// Clear the current-file marker after a file's transport has settled.
    pub fn end_file(&mut self) {
        self.current = None;
    }

    /// Overwrite per-file progress; the percentage is recomputed immediately.
    pub fn record_progress(&mut self, completed: u32, total: u32) {
        self.progress = SessionProgress::new(completed, total);
    }

    /// Append one page result, stamping its ordering sequence. Existing
    /// records are never mutated or removed; append order is authoritative
    /// for display.
    pub fn append_page(&mut self, mut record: PageRecord) -> &PageRecord {
        record.seq = self.next_seq;
        self.next_seq += 1;
        self.pages.push(record);
        self.rebuild_combined();
        self.pages.last().expect("just pushed")
    }

    /// The combined ordered text of all error-free pages, page/file-qualified,
    /// for downstream consumers.
    pub fn combined_text(&self) -> &str {
        &self.combined
    }

    /// Return to the empty initial state, equivalent to construction.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn rebuild_combined(&mut self) {
        let parts: Vec<String> = self
            .pages
            .iter()
            .filter(|r| !r.is_error() && !r.text.is_empty())
            .map(|r| format!("Page {} ({}):\n{}", r.page, r.file_name, r.text))
            .collect();
        self.combined = parts.join("\n\n---\n\n");
    }
}
