use clap::{Parser, Subcommand};
use kittypress::archive::{
    compress_single_file_stream, create_archive, decompress_single_file_stream, extract_archive,
    list_archive, ExtractOptions, PackOptions, SingleFileOptions, STANDALONE_COMPRESSION_LEVEL,
};
use kittypress::io_stream::{ARCHIVE_CHUNK_SIZE, ARCHIVE_COMPRESSION_LEVEL};
use kittypress::progress::ProgressCounter;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kp", about = "KittyPress KP05 archive CLI")]
struct Cli {
    /// Log per-entry and per-worker detail
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack files and directory trees into a .kitty archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Zstd level for embedded payloads
        #[arg(short, long, default_value_t = ARCHIVE_COMPRESSION_LEVEL, allow_hyphen_values = true)]
        level: i32,
        /// Source read size in KiB
        #[arg(long, default_value_t = ARCHIVE_CHUNK_SIZE / 1024)]
        chunk_size: usize,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Unpack an archive; the root name is printed
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Extraction threads (default: min(4, cores))
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Compress one file into a standalone payload
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = STANDALONE_COMPRESSION_LEVEL, allow_hyphen_values = true)]
        level: i32,
        /// Write the uncompressed form
        #[arg(long)]
        store: bool,
    },
    /// Restore a standalone payload
    Decompress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List archive entries
    List {
        input: PathBuf,
        /// Emit entries as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let progress = ProgressCounter::with_callback(|pct| {
        if pct > 0 {
            info!(percent = pct, "progress");
        }
    });

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, level, chunk_size, input } => {
            let opts = PackOptions { level, chunk_size: chunk_size * 1024 };
            let summary = create_archive(&input, &output, &opts, &progress)?;
            println!(
                "Created: {} ({} entries, {} → {} bytes)",
                output.display(),
                summary.entries,
                summary.source_bytes,
                summary.archive_bytes
            );
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, workers } => {
            let root = extract_archive(&input, &output_dir, &ExtractOptions { workers }, &progress)?;
            println!("Unpacked to: {}", output_dir.join(root).display());
        }

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, level, store } => {
            let opts = SingleFileOptions { level, store, ..SingleFileOptions::default() };
            let written = compress_single_file_stream(&input, &output, &opts, &progress)?;
            println!("Compressed: {} ({written} bytes)", output.display());
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output } => {
            let target = decompress_single_file_stream(&input, &output, &progress)?;
            println!("Decompressed: {}", target.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let ar = list_archive(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ar.entries)?);
                return Ok(());
            }
            println!("Archive: {} ({} entries)", input.display(), ar.entries.len());
            println!("{:<40} {:>6} {:>12} {:>12}", "Path", "Ext", "Size", "Payload");
            for e in &ar.entries {
                println!(
                    "{:<40} {:>6} {:>12} {:>12}",
                    e.rel_path, e.extension, e.original_size, e.payload_len
                );
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
