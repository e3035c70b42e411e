use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use localrag_answer::{build_generator, AnswerEvent, RagComponents};
use localrag_cli::{init_logging, load_settings};
use localrag_embed::get_default_embedder;
use localrag_ingest::{IngestionJob, JobStatus};
use localrag_vector::open_index;

/// Typing this instead of a question re-ingests `ingest.source`.
const INGEST_TRIGGER: &str = "__INGEST_TRIGGER__";

#[derive(Parser)]
#[command(name = "localrag-chat", about = "Ask questions over the indexed documents", version)]
struct Cli {
    /// Collection to query (default: index.collection)
    #[arg(long)]
    collection: Option<String>,

    /// Chunks retrieved per question (default: retrieval.top_k)
    #[arg(long)]
    top_k: Option<usize>,
}

fn print_event(event: AnswerEvent) {
    let mut out = std::io::stdout();
    match event {
        AnswerEvent::Token(token) => {
            let _ = write!(out, "{token}");
        }
        AnswerEvent::Sources(block) => {
            let _ = write!(out, "\n\nSources:\n{block}");
        }
        AnswerEvent::Error(message) => {
            let _ = write!(out, "\n\n[error] {message}");
        }
    }
    let _ = out.flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    let mut settings = load_settings(cli.collection)?;
    if let Some(k) = cli.top_k {
        settings.retrieval.top_k = k;
    }
    let settings = Arc::new(settings);

    let embedder = get_default_embedder(&settings.embedding)?;
    let index = open_index(&settings.index).await?;
    let llm = build_generator(&settings.llm)?;
    let model = llm.model_id();
    let parts = RagComponents::new(&settings, index.clone(), embedder.clone(), llm);
    let mut session = parts.session();

    println!("LocalRAG Chat\n=============");
    println!("Collection: {} | model: {model}", settings.index.collection);
    println!("Type a question, {INGEST_TRIGGER} to re-ingest, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else { break };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            break;
        }
        if question == INGEST_TRIGGER {
            println!("Starting ingestion process...");
            let report = IngestionJob::new(settings.clone(), embedder.clone(), index.clone()).with_progress(true).spawn().await?;
            println!("{}", report.render());
            match &report.status {
                JobStatus::Succeeded => println!("Ingestion process completed successfully."),
                JobStatus::NoDocuments => println!("Ingestion process finished without documents."),
                JobStatus::CompletedWithErrors => println!(
                    "Ingestion process completed with errors: {} of {} chunks indexed.",
                    report.chunks_upserted, report.chunks_loaded
                ),
                JobStatus::Failed(reason) => println!("Ingestion process failed: {reason}"),
            }
            continue;
        }

        let (tx, mut rx) = mpsc::channel(64);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(event);
            }
        });
        let answer = session.ask(question, &tx).await;
        drop(tx);
        printer.await?;
        println!();
        tracing::debug!(phase = ?answer.phase, retrieved = answer.retrieved, "answer finished");
    }
    Ok(())
}
