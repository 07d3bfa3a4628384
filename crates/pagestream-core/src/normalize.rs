//! Normalization of heterogeneous transport payloads into canonical
//! [`PageRecord`]s.

use serde::Deserialize;

use crate::{FileJob, PageRecord};

/// Payload of a streaming `page_complete` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamPage {
    pub page: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub preview: Option<String>,
}

/// One page entry of the batch response. The page number is optional on the
/// wire; consumers fall back to the entry's position in the list.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchPage {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub preview: Option<String>,
}

/// A raw per-page payload as it came off a transport.
#[derive(Debug, Clone)]
pub enum RawPage {
    Stream(StreamPage),
    Batch {
        /// 0-based position within the batch response list.
        ordinal: usize,
        item: BatchPage,
    },
}

/// Whitespace-delimited token count, the default when the service supplies
/// no count of its own.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Map one raw transport payload into the canonical page shape.
///
/// The ordering sequence is left at zero; the session stamps it on append.
pub fn to_record(job: &FileJob, raw: &RawPage) -> PageRecord {
    match raw {
        RawPage::Stream(page) => PageRecord {
            file_index: job.index,
            file_name: job.name.clone(),
            page: page.page,
            text: page.text.clone(),
            word_count: word_count(&page.text),
            error: page.error.clone(),
            confidence: page.confidence,
            preview: page.preview.clone(),
            seq: 0,
        },
        RawPage::Batch { ordinal, item } => PageRecord {
            file_index: job.index,
            file_name: job.name.clone(),
            page: item.page.unwrap_or(*ordinal as u32 + 1),
            text: item.text.clone(),
            word_count: word_count(&item.text),
            error: item.error.clone(),
            confidence: item.confidence,
            preview: item.preview.clone(),
            seq: 0,
        },
    }
}

/// Synthesize a visible error record for a file that produced no pages at
/// all, so the failure shows up in the result stream instead of vanishing.
pub fn error_record(job: &FileJob, message: impl Into<String>) -> PageRecord {
    PageRecord {
        file_index: job.index,
        file_name: job.name.clone(),
        page: 1,
        text: String::new(),
        word_count: 0,
        error: Some(message.into()),
        confidence: None,
        preview: None,
        seq: 0,
    }
}
