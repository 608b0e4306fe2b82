//! Crate-wide error taxonomy.
//!
//! Every failure is fatal to the operation that raised it.  There is no
//! partial-success path: an archive or output tree produced by an aborted
//! call must be discarded by the caller.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;

/// Structural violations of the KP05 layout.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic: expected \"KP05\", found {found:02x?}")]
    BadMagic { found: [u8; 4] },
    #[error("Unsupported format version: {0} (only 5 is accepted)")]
    UnsupportedVersion(u8),
    #[error("{field} out of range: {value}")]
    InvalidLength { field: &'static str, value: u64 },
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong { field: &'static str, len: usize, max: usize },
    #[error("{0} is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("Entry path {0:?} is not a safe relative path")]
    UnsafePath(String),
    #[error("Two entries map to the same path {0:?}")]
    DuplicatePath(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Codec error: {0}")]
    Codec(CodecError),
}

// Codec-level I/O failures belong to the I/O class, not the codec class.
impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => Error::Io(e),
            other             => Error::Codec(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn truncated(what: impl std::fmt::Display) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, format!("truncated archive: {what}")))
}
