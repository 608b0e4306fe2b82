//! Parallel payload extraction.
//!
//! Every job already has a disjoint output path whose parent directory
//! exists.  Workers claim jobs from one shared atomic cursor, each through
//! its own read handle on the archive file, so neither the handle nor any
//! output file is ever shared and no lock is needed for I/O.  The progress
//! sink is the only shared mutable state.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::debug;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::extract::plan::PlannedFile;
use crate::payload;
use crate::progress::ProgressSink;

/// Upper bound on extraction workers.
pub const MAX_WORKERS:      usize = 4;
/// Worker count when the host's parallelism cannot be determined.
pub const FALLBACK_WORKERS: usize = 2;

/// `min(MAX_WORKERS, available parallelism)`, or [`FALLBACK_WORKERS`].
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().min(MAX_WORKERS))
        .unwrap_or(FALLBACK_WORKERS)
}

/// Create every output directory up front, on the calling thread.
pub fn prepare_dirs(root_dir: &Path, files: &[PlannedFile]) -> Result<()> {
    fs::create_dir_all(root_dir)?;
    for f in files {
        if let Some(parent) = f.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Decode `entry` from `reader` into a new file at `output`.
///
/// The payload header is validated before the output file is created.
pub fn extract_entry<R: Read + Seek>(reader: &mut R, entry: &Entry, output: &Path) -> Result<u64> {
    reader.seek(SeekFrom::Start(entry.payload_offset))?;
    let header = payload::read_header(reader)?;
    let mut out = BufWriter::new(File::create(output)?);
    let written = payload::decode_body(reader, &header, Some(entry.payload_len), &mut out)?;
    out.flush()?;
    Ok(written)
}

/// Extract `files` with up to `workers` threads.
///
/// The first failure stops further claims and is returned once every
/// worker has stopped.  Files finished before the failure stay on disk.
pub fn extract_parallel(
    archive_path: &Path,
    entries:      &[Entry],
    files:        &[PlannedFile],
    workers:      usize,
    progress:     &dyn ProgressSink,
) -> Result<()> {
    let workers = workers.clamp(1, files.len().max(1));
    let cursor = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);

    let results: Vec<Result<usize>> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let (cursor, abort) = (&cursor, &abort);
                s.spawn(move || {
                    let res = run_worker(worker, archive_path, entries, files, cursor, abort, progress);
                    if res.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    res
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(Error::Io(io::Error::new(io::ErrorKind::Other, "extraction worker panicked")))
                })
            })
            .collect()
    });

    let mut extracted = 0;
    for res in results {
        extracted += res?;
    }
    debug!(workers, extracted, "parallel extraction finished");
    Ok(())
}

fn run_worker(
    worker:       usize,
    archive_path: &Path,
    entries:      &[Entry],
    files:        &[PlannedFile],
    cursor:       &AtomicUsize,
    abort:        &AtomicBool,
    progress:     &dyn ProgressSink,
) -> Result<usize> {
    let mut reader = BufReader::new(File::open(archive_path)?);
    let mut done = 0;
    while !abort.load(Ordering::Relaxed) {
        let i = cursor.fetch_add(1, Ordering::Relaxed);
        let Some(job) = files.get(i) else { break };
        let entry = &entries[job.entry_index];
        extract_entry(&mut reader, entry, &job.output_path)?;
        progress.add_processed(entry.payload_len);
        done += 1;
    }
    debug!(worker, done, "worker finished");
    Ok(done)
}
