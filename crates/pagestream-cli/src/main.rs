use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagestream_assist::AssistantClient;
use pagestream_core::{Config, FileJob, IngestEvent, Ingestor, SessionState};

mod output;

use output::ColorMode;

/// Progressive document text extraction: PDFs page by page, images in one shot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from PDFs or images, printing pages as they finish
    Extract {
        /// Files to process, in queue order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Always use the single-request batch path, even for PDFs
        #[arg(long)]
        batch_only: bool,

        /// OCR language hint
        #[arg(long)]
        lang: Option<String>,

        /// Write the combined extracted text to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Extract text, then ask the document assistant about it
    Ask {
        /// Files to process, in queue order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Question to ask about the extracted text
        #[arg(short, long)]
        question: Option<String>,

        /// Run the automatic summary analysis instead of a question
        #[arg(long)]
        analyze: bool,

        /// Always use the single-request batch path, even for PDFs
        #[arg(long)]
        batch_only: bool,

        /// OCR language hint
        #[arg(long)]
        lang: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract {
            files,
            batch_only,
            lang,
            output,
            no_color,
        } => extract(files, batch_only, lang, output, no_color).await,
        Command::Ask {
            files,
            question,
            analyze,
            batch_only,
            lang,
            no_color,
        } => ask(files, question, analyze, batch_only, lang, no_color).await,
    }
}

async fn extract(
    files: Vec<PathBuf>,
    batch_only: bool,
    lang: Option<String>,
    output: Option<PathBuf>,
    no_color: bool,
) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let config = build_config(batch_only, lang);
    let jobs = load_jobs(&files)?;

    let session = run_ingestion(jobs, &config, color).await;

    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &session, color)?;

    if let Some(path) = output {
        std::fs::write(&path, session.combined_text())
            .with_context(|| format!("failed to write {}", path.display()))?;
        writeln!(stdout, "Combined text written to {}", path.display())?;
    }

    Ok(())
}

async fn ask(
    files: Vec<PathBuf>,
    question: Option<String>,
    analyze: bool,
    batch_only: bool,
    lang: Option<String>,
    no_color: bool,
) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let config = build_config(batch_only, lang);
    let jobs = load_jobs(&files)?;
    let document_name = jobs
        .last()
        .map(|j| j.name.clone())
        .unwrap_or_else(|| "Document".to_string());

    let session = run_ingestion(jobs, &config, color).await;

    let combined = session.combined_text();
    if combined.is_empty() {
        anyhow::bail!("no text extracted; nothing to ask the assistant about");
    }

    let assistant = AssistantClient::new(&config.assist_url);
    let answer = if analyze {
        assistant
            .analyze(combined, &document_name, "summary")
            .await
            .context("analysis request failed")?
    } else {
        let question = question
            .context("provide --question, or use --analyze for an automatic summary")?;
        assistant
            .chat(&question, combined, &document_name, &[])
            .await
            .context("chat request failed")?
    };

    println!("{}", answer);
    Ok(())
}

/// Resolve configuration: CLI flags > env vars > config files > defaults.
fn build_config(batch_only: bool, lang: Option<String>) -> Config {
    let mut config = Config::from_env();
    if batch_only {
        config.prefer_streaming = false;
    }
    if let Some(lang) = lang {
        config.lang = lang;
    }
    config
}

fn load_jobs(paths: &[PathBuf]) -> anyhow::Result<Vec<FileJob>> {
    let mut jobs = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        jobs.push(FileJob::from_bytes(index, name, data)?);
    }
    Ok(jobs)
}

/// Enqueue the jobs and drive the pipeline, printing each page the moment it
/// arrives and feeding the progress bar from progress events.
async fn run_ingestion(jobs: Vec<FileJob>, config: &Config, color: ColorMode) -> SessionState {
    let total_files = jobs.len();
    let mut session = SessionState::new();
    session.enqueue(jobs);

    let ingestor = Ingestor::new(config);
    let mut stdout = std::io::stdout();
    let mut bar: Option<ProgressBar> = None;

    ingestor
        .process_queue(&mut session, |event| match event {
            IngestEvent::FileStarted { index, name } => {
                let _ = writeln!(stdout, "Processing {} ({} of {})...", name, index + 1, total_files);
                let pb = ProgressBar::new(0);
                pb.set_style(
                    ProgressStyle::with_template("  [{bar:30}] {pos}/{len} pages")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar = Some(pb);
            }
            IngestEvent::Progress { progress } => {
                if let Some(pb) = &bar
                    && progress.total > 0
                {
                    pb.set_length(progress.total as u64);
                    pb.set_position(progress.completed as u64);
                }
            }
            IngestEvent::PageAdded { record } => {
                if let Some(pb) = &bar {
                    pb.suspend(|| {
                        let _ = output::print_page(&mut stdout, &record, color);
                    });
                } else {
                    let _ = output::print_page(&mut stdout, &record, color);
                }
            }
            IngestEvent::FallingBack { name, reason, .. } => {
                let _ = writeln!(
                    stdout,
                    "Streaming failed for {} ({}); retrying over batch upload",
                    name, reason
                );
            }
            IngestEvent::FileSettled { .. } => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
            IngestEvent::QueueFinished => {}
        })
        .await;

    session
}
