use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use localrag_cli::{init_logging, load_settings};
use localrag_embed::get_default_embedder;
use localrag_ingest::{IngestionJob, JobStatus};
use localrag_vector::open_index;

#[derive(Parser)]
#[command(name = "localrag-ingest", about = "Load, embed and index a document source", version)]
struct Cli {
    /// File or directory to ingest (default: ingest.source)
    path: Option<PathBuf>,

    /// Target collection (default: index.collection)
    #[arg(long)]
    collection: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    let settings = Arc::new(load_settings(cli.collection)?);

    if !cli.json {
        println!("LocalRAG Ingestion\n==================");
        println!("Collection: {}", settings.index.collection);
        println!("Embedder:   {}", settings.embedding.embedder_id());
    }
    let embedder = get_default_embedder(&settings.embedding)?;
    let index = open_index(&settings.index).await?;
    let mut job = IngestionJob::new(settings, embedder, index).with_progress(!cli.no_progress && !cli.json);
    if let Some(path) = cli.path {
        job = job.with_source(path);
    }
    let report = job.run().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", report.render());
        match &report.status {
            JobStatus::Succeeded => println!("\n✅ Ingestion completed successfully!"),
            JobStatus::CompletedWithErrors => println!("\n⚠️  Ingestion completed with errors"),
            JobStatus::NoDocuments => println!("\n⚠️  Nothing was ingested"),
            JobStatus::Failed(reason) => eprintln!("\n❌ Ingestion failed: {reason}"),
        }
    }
    if report.is_failed() {
        std::process::exit(1);
    }
    Ok(())
}
