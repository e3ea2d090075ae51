//! Inspect how a file would be segmented, without touching any index.

use clap::Parser;
use satchel_segment::{TextSegmenter, estimate_tokens};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Preview chunk boundaries for a text file")]
struct Args {
    /// File to segment
    file: PathBuf,

    /// Maximum chunk size in bytes
    #[arg(long, default_value_t = 1000)]
    max_size: usize,

    /// Overlap between windows of an oversized paragraph, in bytes
    #[arg(long, default_value_t = 200)]
    overlap: usize,

    /// Emit chunks as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ChunkPreview {
    ordinal: usize,
    len: usize,
    token_estimate: usize,
    text: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let content = std::fs::read_to_string(&args.file)?;

    let segmenter = TextSegmenter::new(args.max_size, args.overlap);
    let chunks = segmenter.segment(&content);

    if args.json {
        let previews: Vec<ChunkPreview> = chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| ChunkPreview {
                ordinal,
                len: text.len(),
                token_estimate: estimate_tokens(&text),
                text,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&previews)?);
    } else {
        println!("{} chunks from {}", chunks.len(), args.file.display());
        for (ordinal, text) in chunks.iter().enumerate() {
            println!(
                "  #{ordinal}: {} bytes, ~{} tokens",
                text.len(),
                estimate_tokens(text)
            );
        }
    }

    Ok(())
}
