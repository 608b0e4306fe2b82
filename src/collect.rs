//! Input discovery: turn user-supplied paths into a flat list of files.
//!
//! A directory contributes every regular file beneath it (symlinks to files
//! count as the file they point at), named relative to
//! the directory's parent so the directory itself becomes the top-level
//! segment.  A regular file contributes itself under its bare filename.
//! Anything else (missing paths, sockets, devices) is skipped.  Walk order
//! is whatever the filesystem yields.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::path::{normalize_rel_path, utf8_name};

/// One file to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub absolute_path: PathBuf,
    /// `/`-separated path stored in the archive.
    pub relative_path: String,
    /// Filename suffix without the dot; empty when there is none.
    pub extension:     String,
}

impl InputRecord {
    /// Current size on disk, or 0 if it cannot be determined.
    pub fn size_hint(&self) -> u64 {
        fs::metadata(&self.absolute_path).map(|m| m.len()).unwrap_or(0)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension().map(utf8_name).unwrap_or_default()
}

pub fn collect_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<InputRecord>> {
    let mut records = Vec::new();
    for input in inputs {
        let abs = std::path::absolute(input.as_ref())?;
        if abs.is_dir() {
            collect_dir(&abs, &mut records)?;
        } else if abs.is_file() {
            let Some(name) = abs.file_name() else { continue };
            records.push(InputRecord {
                relative_path: utf8_name(name),
                extension:     extension_of(&abs),
                absolute_path: abs,
            });
        } else {
            warn!(path = %abs.display(), "skipping input: not a file or directory");
        }
    }
    debug!(count = records.len(), "collected inputs");
    Ok(records)
}

fn collect_dir(dir: &Path, records: &mut Vec<InputRecord>) -> Result<()> {
    let base = dir.parent().unwrap_or(dir);
    for ent in WalkDir::new(dir).follow_links(false) {
        let ent = ent.map_err(|e| {
            let msg = e.to_string();
            e.into_io_error().unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, msg))
        })?;
        // Symlinked files are archived as their target; symlinked
        // directories are not descended into.
        let is_file = ent.file_type().is_file()
            || (ent.path_is_symlink() && ent.path().is_file());
        if !is_file {
            continue;
        }
        records.push(InputRecord {
            absolute_path: ent.path().to_path_buf(),
            relative_path: normalize_rel_path(base, ent.path())?,
            extension:     extension_of(ent.path()),
        });
    }
    Ok(())
}
