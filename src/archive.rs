//! High-level API: the primary embedding surface.
//!
//! ```no_run
//! use kittypress::archive::{create_archive, extract_archive, ExtractOptions, PackOptions};
//! use kittypress::progress::NoProgress;
//!
//! create_archive(&["photos", "notes.txt"], "out.kitty", &PackOptions::default(), &NoProgress)?;
//! let root = extract_archive("out.kitty", "restored", &ExtractOptions::default(), &NoProgress)?;
//! println!("extracted into {root}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Extraction runs `ParseHeader → PlanRoot → {Empty | Single | PrepareDirs →
//! Parallel} → Done`.  No step is retried; the first error ends the call and
//! whatever was already written stays on disk.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::collect::collect_inputs;
use crate::error::{FormatError, Result};
use crate::extract::parallel::{default_worker_count, extract_entry, extract_parallel, prepare_dirs};
use crate::extract::plan::{plan_extraction, ExtractionPlan};
use crate::io_stream::{ArchiveReader, ArchiveWriter, ARCHIVE_CHUNK_SIZE, ARCHIVE_COMPRESSION_LEVEL};
use crate::path::utf8_name;
use crate::payload;
use crate::progress::ProgressSink;

/// Default level for standalone single-file payloads.  Not tied to
/// [`ARCHIVE_COMPRESSION_LEVEL`].
pub const STANDALONE_COMPRESSION_LEVEL: i32   = 1;
/// Default source read size for standalone payloads.
pub const STANDALONE_CHUNK_SIZE:        usize = 64 * 1024;

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`create_archive`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub level:      i32,
    pub chunk_size: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { level: ARCHIVE_COMPRESSION_LEVEL, chunk_size: ARCHIVE_CHUNK_SIZE }
    }
}

/// Configuration for [`compress_single_file_stream`].
#[derive(Debug, Clone)]
pub struct SingleFileOptions {
    pub level:      i32,
    pub chunk_size: usize,
    /// Write the uncompressed payload form instead.
    pub store:      bool,
}

impl Default for SingleFileOptions {
    fn default() -> Self {
        Self { level: STANDALONE_COMPRESSION_LEVEL, chunk_size: STANDALONE_CHUNK_SIZE, store: false }
    }
}

/// Configuration for [`extract_archive`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Worker threads; `None` picks [`default_worker_count`].
    pub workers: Option<usize>,
}

/// What [`create_archive`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries:       u32,
    pub source_bytes:  u64,
    pub archive_bytes: u64,
}

// ── Create ───────────────────────────────────────────────────────────────────

/// Pack `inputs` (files and directory trees) into a new archive at
/// `destination`.
pub fn create_archive<P, Q>(
    inputs:      &[P],
    destination: Q,
    opts:        &PackOptions,
    progress:    &dyn ProgressSink,
) -> Result<ArchiveSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let destination = destination.as_ref();
    let records = collect_inputs(inputs)?;

    let mut seen = HashSet::with_capacity(records.len());
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.relative_path.as_str())) {
        return Err(FormatError::DuplicatePath(dup.relative_path.clone()).into());
    }

    let source_bytes: u64 = records.iter().map(|r| r.size_hint()).sum();
    progress.reset();
    progress.set_total(source_bytes);

    let out = BufWriter::new(File::create(destination)?);
    let mut writer = ArchiveWriter::with_options(out, opts.level, opts.chunk_size)?;
    info!(files = records.len(), destination = %destination.display(), "creating archive");

    for rec in &records {
        let original_size = rec.size_hint();
        let mut source = File::open(&rec.absolute_path)?;
        writer.add_entry(&rec.relative_path, &rec.extension, original_size, &mut source, progress)?;
    }

    let entries = writer.entry_count();
    let out = writer.finalize()?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    let archive_bytes = file.metadata()?.len();

    Ok(ArchiveSummary { entries, source_bytes, archive_bytes })
}

// ── Extract ──────────────────────────────────────────────────────────────────

/// Scan the archive without decoding any payload.
pub fn list_archive<P: AsRef<Path>>(archive_path: P) -> Result<ArchiveReader<BufReader<File>>> {
    ArchiveReader::open(BufReader::new(File::open(archive_path)?))
}

/// Unpack `archive_path` under `output_folder`.  Returns the root name the
/// planner chose (a file name for single-entry archives).
pub fn extract_archive<P, Q>(
    archive_path:  P,
    output_folder: Q,
    opts:          &ExtractOptions,
    progress:      &dyn ProgressSink,
) -> Result<String>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let archive_path = archive_path.as_ref();
    let output_folder = output_folder.as_ref();

    let mut reader = list_archive(archive_path)?;
    progress.reset();
    progress.set_total(reader.total_payload_bytes);

    let plan = plan_extraction(&reader.entries, output_folder)?;
    let root_name = plan.root_name().to_owned();

    match plan {
        ExtractionPlan::Empty { .. } => {
            debug!("archive has no entries; nothing to extract");
        }
        ExtractionPlan::Single { file, .. } => {
            fs::create_dir_all(output_folder)?;
            let entry = reader.entries[file.entry_index].clone();
            extract_entry(reader.get_mut(), &entry, &file.output_path)?;
            progress.add_processed(entry.payload_len);
        }
        ExtractionPlan::Tree { root_dir, files, .. } => {
            prepare_dirs(&root_dir, &files)?;
            let workers = opts.workers.unwrap_or_else(default_worker_count);
            debug!(entries = files.len(), workers, "extracting in parallel");
            extract_parallel(archive_path, &reader.entries, &files, workers, progress)?;
        }
    }

    info!(root = %root_name, "archive extracted");
    Ok(root_name)
}

// ── Standalone payloads ──────────────────────────────────────────────────────

/// Write `source` as a single payload at `destination`, with no archive
/// wrapper.  Returns the payload length.
pub fn compress_single_file_stream<P, Q>(
    source:      P,
    destination: Q,
    opts:        &SingleFileOptions,
    progress:    &dyn ProgressSink,
) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let source = source.as_ref();
    let mut input = File::open(source)?;
    let original_size = input.metadata()?.len();
    let extension = source.extension().map(utf8_name).unwrap_or_default();

    progress.set_total(original_size);
    let mut out = BufWriter::new(File::create(destination.as_ref())?);
    let written = if opts.store {
        let n = payload::encode_stored(&mut input, &mut out, &extension)?;
        progress.add_processed(original_size);
        n
    } else {
        payload::encode(&mut input, &mut out, original_size, &extension, opts.level, opts.chunk_size, progress)?
    };
    out.flush()?;

    info!(original_size, written, store = opts.store, "compressed single file");
    Ok(written)
}

/// Decode a standalone payload at `source` into `destination`.
///
/// When `destination` has no extension and the payload stores one, the
/// stored extension is appended.  Returns the path actually written.
pub fn decompress_single_file_stream<P, Q>(
    source:      P,
    destination: Q,
    progress:    &dyn ProgressSink,
) -> Result<PathBuf>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = File::open(source.as_ref())?;
    let payload_len = input.metadata()?.len();
    progress.set_total(payload_len);

    let mut reader = BufReader::new(input);
    let header = payload::read_header(&mut reader)?;

    let destination = destination.as_ref();
    let target = if destination.extension().is_none() && !header.extension.is_empty() {
        let mut name = OsString::from(destination.as_os_str());
        name.push(".");
        name.push(&header.extension);
        PathBuf::from(name)
    } else {
        destination.to_path_buf()
    };

    let mut out = BufWriter::new(File::create(&target)?);
    let written = payload::decode_body(&mut reader, &header, Some(payload_len), &mut out)?;
    out.flush()?;
    progress.add_processed(payload_len);

    info!(written, recorded = header.original_size(), target = %target.display(), "decompressed single file");
    Ok(target)
}
