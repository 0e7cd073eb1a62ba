//! fia-rag command line
//!
//! Run with: cargo run -p fia-rag -- --help

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use fia_rag::ingestion::PlainTextExtractor;
use fia_rag::reports::{AnalysisType, ReportGenerator};
use fia_rag::{RagConfig, RagService, RetryPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "fia-rag")]
#[command(about = "Question answering over your documents, with cited sources")]
struct Args {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "FIA_RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add text files to the corpus
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Ask a question
    Ask {
        question: String,
        /// Passages to retrieve
        #[arg(short)]
        k: Option<usize>,
    },
    /// Remove a document and its chunks
    Delete { document_id: Uuid },
    /// Corpus statistics
    Status,
    /// List ingested documents
    Documents,
    /// Generate a financial analysis report
    Report {
        #[arg(long, value_enum, default_value_t = AnalysisType::Comprehensive)]
        analysis_type: AnalysisType,
        #[arg(long, default_value = "Company")]
        company: String,
        /// Write the Markdown here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fia_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RagConfig::default(),
    };
    config.apply_env_overrides();

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding backend: {:?}", config.embeddings.backend);
    tracing::info!("  - Generation model: {}", config.llm.model);
    tracing::info!("  - Corpus: {}", config.index.storage_path.display());

    let service = RagService::from_config(config)?;
    let retry = RetryPolicy::default();

    match args.command {
        Command::Ingest { files } => ingest(&service, &retry, &files).await?,
        Command::Ask { question, k } => ask(&service, &retry, &question, k).await?,
        Command::Delete { document_id } => {
            let outcome = service.delete_document(&document_id)?;
            if outcome.removed_count == 0 {
                println!("No document {}", document_id);
            } else {
                service.save_to_storage()?;
                println!("Removed {} chunks of {}", outcome.removed_count, document_id);
            }
        }
        Command::Status => {
            let status = service.status();
            println!("Documents:            {}", status.document_count);
            println!("Chunks:               {}", status.chunk_count);
            println!("Indexed vectors:      {}", status.index_size);
            println!("Text characters:      {}", status.total_text_chars);
            println!("Chunks per document:  {:.1}", status.average_chunks_per_document);
        }
        Command::Documents => {
            let documents = service.documents();
            if documents.is_empty() {
                println!("No documents ingested");
            }
            for record in documents {
                println!(
                    "{}  {}  {:>4} chunks  {}",
                    record.id,
                    record.upload_timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.chunk_count,
                    record.source_filename
                );
            }
        }
        Command::Report {
            analysis_type,
            company,
            output,
        } => report(&service, retry, analysis_type, &company, output.as_deref()).await?,
    }

    Ok(())
}

fn progress_bar(len: usize, unit: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} {{msg}}",
                unit
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

async fn ingest(service: &RagService, retry: &RetryPolicy, files: &[PathBuf]) -> anyhow::Result<()> {
    let extractor = PlainTextExtractor::new()?;
    let pb = progress_bar(files.len(), "files")?;
    let concurrency = service.config().service.max_in_flight();

    let results: Vec<(PathBuf, fia_rag::Result<fia_rag::types::IngestOutcome>)> =
        stream::iter(files.iter().cloned())
            .map(|path| {
                let extractor = &extractor;
                let pb = &pb;
                async move {
                    let result = match extractor.extract_path(&path) {
                        Ok(extracted) => {
                            let document = extracted.into_document();
                            retry.run(|| service.ingest(document.clone())).await
                        }
                        Err(e) => Err(e),
                    };
                    pb.inc(1);
                    (path, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
    pb.finish_and_clear();

    let mut ingested = 0usize;
    for (path, result) in &results {
        match result {
            Ok(outcome) => {
                ingested += 1;
                println!(
                    "{}  {} chunks  {}",
                    outcome.document_id,
                    outcome.inserted_chunk_count,
                    path.display()
                );
            }
            Err(e) => eprintln!("Failed to ingest {}: {}", path.display(), e),
        }
    }

    if ingested > 0 {
        service.save_to_storage()?;
    }
    println!("Ingested {} of {} files", ingested, files.len());

    if ingested < files.len() {
        anyhow::bail!("{} files could not be ingested", files.len() - ingested);
    }
    Ok(())
}

async fn ask(
    service: &RagService,
    retry: &RetryPolicy,
    question: &str,
    k: Option<usize>,
) -> anyhow::Result<()> {
    let answer = retry.run(|| service.ask(question, k)).await?;

    println!("{}\n", answer.text);
    if !answer.cited_chunk_ids.is_empty() {
        println!("Sources (confidence {:.2}):", answer.confidence);
        for chunk_id in &answer.cited_chunk_ids {
            match service.retriever().index().chunk(chunk_id) {
                Some(chunk) => println!("  - {}", chunk.format_source()),
                None => println!("  - {}", chunk_id),
            }
        }
    }
    Ok(())
}

async fn report(
    service: &RagService,
    retry: RetryPolicy,
    analysis_type: AnalysisType,
    company: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let total = analysis_type.questions().len();
    let pb = progress_bar(total, "sections")?;
    let progress = |done: usize, _total: usize| pb.set_position(done as u64);

    let report = ReportGenerator::new(service)
        .with_retry(retry)
        .generate(analysis_type, company, Some(&progress))
        .await;
    pb.finish_and_clear();

    let markdown = report.to_markdown();
    match output {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("writing report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", markdown),
    }

    if report.failed_sections() > 0 {
        tracing::warn!(
            "{} of {} sections could not be answered",
            report.failed_sections(),
            report.sections.len()
        );
    }
    Ok(())
}
