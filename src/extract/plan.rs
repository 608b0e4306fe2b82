//! Extraction layout.
//!
//! The destination root is synthesised from the archive contents:
//!
//! | entries | layout                                                      |
//! |---------|-------------------------------------------------------------|
//! | 0       | `KittyPress_Empty`, nothing is created                      |
//! | 1       | file `KittyPress_<filename>` directly in the output folder  |
//! | 2+      | directory `KittyPress_<shared top folder>` or `KittyPress_Files` |
//!
//! Stored extensions always win over whatever extension the stored path
//! carries; extensions travel out-of-band so the format does not depend on
//! the filesystem accepting arbitrary names.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::entry::Entry;
use crate::error::{FormatError, Result};
use crate::path::{file_name, to_local_path, top_segment, validate_extension};

pub const ROOT_PREFIX:   &str = "KittyPress_";
pub const EMPTY_ROOT:    &str = "KittyPress_Empty";
pub const FALLBACK_ROOT: &str = "KittyPress_Files";

/// One entry's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub entry_index: usize,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPlan {
    Empty { root_name: String },
    Single { root_name: String, file: PlannedFile },
    Tree { root_name: String, root_dir: PathBuf, files: Vec<PlannedFile> },
}

impl ExtractionPlan {
    pub fn root_name(&self) -> &str {
        match self {
            ExtractionPlan::Empty { root_name }
            | ExtractionPlan::Single { root_name, .. }
            | ExtractionPlan::Tree { root_name, .. } => root_name,
        }
    }
}

/// Replace the extension of `path` with `ext` when `ext` is non-empty.
fn apply_extension(mut path: PathBuf, ext: &str) -> PathBuf {
    if !ext.is_empty() {
        path.set_extension(ext);
    }
    path
}

/// Name of the root directory for a multi-entry archive.
pub fn tree_root_name(entries: &[Entry]) -> String {
    let first = entries.first().map(|e| top_segment(&e.rel_path)).unwrap_or("");
    let shared = !first.is_empty()
        && entries.iter().all(|e| {
            e.rel_path.len() > first.len()
                && e.rel_path.starts_with(first)
                && e.rel_path.as_bytes()[first.len()] == b'/'
        });
    if shared {
        format!("{ROOT_PREFIX}{first}")
    } else {
        FALLBACK_ROOT.to_owned()
    }
}

pub fn plan_extraction(entries: &[Entry], output_folder: &Path) -> Result<ExtractionPlan> {
    match entries {
        [] => Ok(ExtractionPlan::Empty { root_name: EMPTY_ROOT.to_owned() }),
        [only] => {
            validate_extension(&only.extension)?;
            let named = apply_extension(PathBuf::from(file_name(&only.rel_path)), &only.extension);
            let mut root = OsString::from(ROOT_PREFIX);
            root.push(named.as_os_str());
            let root_name = root.to_string_lossy().into_owned();
            Ok(ExtractionPlan::Single {
                file: PlannedFile { entry_index: 0, output_path: output_folder.join(&root) },
                root_name,
            })
        }
        _ => {
            let root_name = tree_root_name(entries);
            let root_dir = output_folder.join(&root_name);
            // Workers write without coordination, so every output path must be unique.
            let mut seen = HashSet::with_capacity(entries.len());
            let mut files = Vec::with_capacity(entries.len());
            for (entry_index, e) in entries.iter().enumerate() {
                validate_extension(&e.extension)?;
                let rel = apply_extension(to_local_path(&e.rel_path)?, &e.extension);
                let output_path = root_dir.join(rel);
                if !seen.insert(output_path.clone()) {
                    return Err(FormatError::DuplicatePath(e.rel_path.clone()).into());
                }
                files.push(PlannedFile { entry_index, output_path });
            }
            Ok(ExtractionPlan::Tree { root_name, root_dir, files })
        }
    }
}
