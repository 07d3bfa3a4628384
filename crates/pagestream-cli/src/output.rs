use std::io::Write;

use owo_colors::OwoColorize;
use pagestream_core::{PageRecord, SessionState};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print one page result the moment it arrives.
pub fn print_page(w: &mut dyn Write, record: &PageRecord, color: ColorMode) -> std::io::Result<()> {
    let header = format!(
        "Page {} ({}) - {} words",
        record.page, record.file_name, record.word_count
    );

    if let Some(ref error) = record.error {
        if color.enabled() {
            writeln!(w, "{}", header.dimmed())?;
            writeln!(w, "  {} {}", "ERROR:".red(), error)?;
        } else {
            writeln!(w, "{}", header)?;
            writeln!(w, "  ERROR: {}", error)?;
        }
        writeln!(w)?;
        return Ok(());
    }

    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    if record.text.trim().is_empty() {
        if color.enabled() {
            writeln!(w, "  {}", "(no readable text)".dimmed())?;
        } else {
            writeln!(w, "  (no readable text)")?;
        }
    } else {
        writeln!(w, "{}", record.text)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print the end-of-queue summary.
pub fn print_summary(
    w: &mut dyn Write,
    session: &SessionState,
    color: ColorMode,
) -> std::io::Result<()> {
    let total = session.pages().len();
    let failed = session.pages().iter().filter(|r| r.is_error()).count();
    let words: usize = session.pages().iter().map(|r| r.word_count).sum();

    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
    }
    writeln!(
        w,
        "Processed {} page{} across {} file{}",
        total,
        if total == 1 { "" } else { "s" },
        session.files().len(),
        if session.files().len() == 1 { "" } else { "s" },
    )?;
    writeln!(w, "  Words extracted: {}", words)?;
    if failed > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Failed pages:".red(), failed)?;
        } else {
            writeln!(w, "  Failed pages: {}", failed)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(page: u32, text: &str, error: Option<&str>) -> PageRecord {
        PageRecord {
            file_index: 0,
            file_name: "doc.pdf".to_string(),
            page,
            text: text.to_string(),
            word_count: text.split_whitespace().count(),
            error: error.map(String::from),
            confidence: None,
            preview: None,
            seq: 0,
        }
    }

    #[test]
    fn page_output_includes_header_and_text() {
        let mut buf = Vec::new();
        print_page(&mut buf, &record(2, "hello world", None), ColorMode(false)).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Page 2 (doc.pdf) - 2 words"));
        assert!(out.contains("hello world"));
    }

    #[test]
    fn errored_page_output_shows_error() {
        let mut buf = Vec::new();
        print_page(
            &mut buf,
            &record(1, "", Some("OCR failed")),
            ColorMode(false),
        )
        .unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("ERROR: OCR failed"));
    }
}
