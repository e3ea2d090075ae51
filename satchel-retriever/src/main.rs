use clap::{Parser, Subcommand};
use half::f16;
use satchel_embed::{EmbeddingProvider, OpenAiProvider, TextGenerator};
use satchel_retriever::config::SatchelConfig;
use satchel_retriever::retrieval::indexing_engine::IndexingEngine;
use satchel_retriever::retrieval::search::{RetrievalEngine, ScoredChunk, format_context};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

/// Index a folder of documents and answer questions from them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "satchel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reload the documents folder: index new and changed files, drop
    /// removed ones, and resynchronize the vector index
    Reload,
    /// Force a full vector index rebuild from the metadata store
    Rebuild,
    /// Show index statistics
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List indexed documents
    Documents {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Retrieve the chunks nearest to a query
    Search {
        /// Free-text query (embedded via the configured provider)
        query: Option<String>,
        /// Raw query embedding values (comma-separated floats), instead
        /// of embedding a text query
        #[arg(long, value_delimiter = ',')]
        embedding: Vec<f32>,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Distance ceiling (squared L2, smaller is more similar)
        #[arg(long)]
        max_distance: Option<f32>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Answer a question using retrieved context
    Ask {
        /// The question to answer
        question: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    documents: usize,
    chunks: usize,
    chunks_with_embedding: usize,
    vector_index: satchel_retriever::retrieval::vector_index::IndexStats,
    supported_types: Vec<String>,
}

#[derive(Serialize)]
struct DocumentOutput {
    id: i64,
    name: String,
    path: String,
    doc_type: String,
    size_bytes: i64,
    content_hash: String,
}

#[derive(Serialize)]
struct SearchHit {
    distance: f32,
    document: String,
    ordinal: usize,
    text: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = SatchelConfig::load(&args.config)?;

    match args.command {
        Commands::Reload => {
            let provider = OpenAiProvider::new(config.embedding.clone())?;
            let mut engine = IndexingEngine::new(config.engine_config()).await?;
            let report = engine.reload_folder(&provider).await?;

            println!(
                "Indexed {} document(s) ({} chunks, {} embeddings)",
                report.documents_indexed, report.chunks_created, report.embeddings_generated
            );
            println!(
                "Unchanged: {}, removed: {}, failed: {}",
                report.documents_unchanged, report.documents_removed, report.documents_failed
            );
            if report.index_rebuilt {
                println!("Vector index was rebuilt to match the store");
            }
            Ok(())
        }
        Commands::Rebuild => {
            let mut engine = IndexingEngine::new(config.engine_config()).await?;
            let count = engine.rebuild_index().await?;
            println!("Vector index rebuilt with {count} vector(s)");
            Ok(())
        }
        Commands::Status { format } => {
            let engine = IndexingEngine::new(config.engine_config()).await?;
            let store = engine.document_index();
            let output = StatusOutput {
                documents: store.count_documents().await?,
                chunks: store.count_chunks().await?,
                chunks_with_embedding: store.count_chunks_with_embedding().await?,
                vector_index: engine.vector_index().stats(),
                supported_types: engine
                    .supported_extensions()
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Summary => {
                    println!("Documents: {}", output.documents);
                    println!("Chunks: {}", output.chunks);
                    println!("Chunks with embedding: {}", output.chunks_with_embedding);
                    println!(
                        "Vector index: {} vector(s), dimension {}, initialized: {}",
                        output.vector_index.vector_count,
                        output.vector_index.dimension,
                        output.vector_index.initialized
                    );
                    println!("Supported types: {}", output.supported_types.join(", "));
                    if output.vector_index.vector_count != output.chunks_with_embedding {
                        println!("Drift detected - run `reload` or `rebuild` to resynchronize");
                    }
                }
            }
            Ok(())
        }
        Commands::Documents { format } => {
            let engine = IndexingEngine::new(config.engine_config()).await?;
            let documents = engine.document_index().list_documents().await?;
            let outputs: Vec<DocumentOutput> = documents
                .into_iter()
                .map(|doc| DocumentOutput {
                    id: doc.id.unwrap_or_default(),
                    name: doc.name,
                    path: doc.path,
                    doc_type: doc.doc_type,
                    size_bytes: doc.size_bytes,
                    content_hash: hex::encode(doc.content_hash),
                })
                .collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outputs)?),
                OutputFormat::Summary => {
                    println!("{} document(s) indexed:", outputs.len());
                    for doc in outputs {
                        println!(
                            "  {} [{}] {} bytes, hash {}",
                            doc.name,
                            doc.doc_type,
                            doc.size_bytes,
                            &doc.content_hash[..12]
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Search {
            query,
            embedding,
            top_k,
            max_distance,
            format,
        } => {
            let query_vector: Vec<f16> = if !embedding.is_empty() {
                embedding.iter().copied().map(f16::from_f32).collect()
            } else if let Some(text) = &query {
                let provider = OpenAiProvider::new(config.embedding.clone())?;
                provider.embed_text(text).await?
            } else {
                anyhow::bail!("provide a text query or --embedding values");
            };

            let engine = IndexingEngine::new(config.engine_config()).await?;
            let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());
            let results = retrieval
                .retrieve(
                    &query_vector,
                    top_k.unwrap_or(config.retrieval.top_k),
                    max_distance.unwrap_or(config.retrieval.max_distance),
                )
                .await?;

            match format {
                OutputFormat::Json => {
                    let hits: Vec<SearchHit> = results.iter().map(search_hit).collect();
                    println!("{}", serde_json::to_string_pretty(&hits)?);
                }
                OutputFormat::Summary => {
                    if results.is_empty() {
                        println!("No relevant context found");
                    } else {
                        println!("Found {} chunk(s):", results.len());
                        for scored in &results {
                            println!(
                                "  distance {:.3} | {} #{} | {}",
                                scored.distance,
                                scored.document.name,
                                scored.chunk.ordinal,
                                preview(&scored.chunk.text, 80)
                            );
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Ask { question } => {
            let provider = OpenAiProvider::new(config.embedding.clone())?;
            let engine = IndexingEngine::new(config.engine_config()).await?;
            let retrieval = RetrievalEngine::new(engine.vector_index(), engine.document_index());

            let query_vector = provider.embed_text(&question).await?;
            let results = retrieval
                .retrieve(
                    &query_vector,
                    config.retrieval.top_k,
                    config.retrieval.max_distance,
                )
                .await?;

            if results.is_empty() {
                println!("No relevant context found in the indexed documents.");
                println!("Try reloading the folder, or rephrase the question.");
                return Ok(());
            }

            let context = format_context(&results);
            let answer = provider.generate(&question, &context).await?;
            println!("{answer}");
            println!();
            println!("Sources:");
            for scored in &results {
                println!(
                    "  {} (chunk {}, distance {:.3})",
                    scored.document.name, scored.chunk.ordinal, scored.distance
                );
            }
            Ok(())
        }
    }
}

fn search_hit(scored: &ScoredChunk) -> SearchHit {
    SearchHit {
        distance: scored.distance,
        document: scored.document.name.clone(),
        ordinal: scored.chunk.ordinal,
        text: scored.chunk.text.clone(),
    }
}

fn preview(text: &str, limit: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.len() <= limit {
        flat
    } else {
        let mut end = limit;
        while !flat.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &flat[..end])
    }
}
