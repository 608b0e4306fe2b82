//! Streaming archive engine: writer and reader.
//!
//! # Writer
//! [`ArchiveWriter`] appends entries strictly one after another on a single
//! seekable handle.  Each entry header is written with a zero payload
//! length, the payload is streamed straight after it, and the length is
//! patched once known.  The superblock's entry count is patched the same
//! way in `finalize()`.  Concurrent writers on one handle would corrupt
//! each other's patches, so the writer takes `&mut self` throughout.
//!
//! # Reader
//! [`ArchiveReader`] validates the superblock and walks the entry headers
//! once, recording each payload's offset and skipping its bytes without
//! decoding them.  The scan costs O(entry count) regardless of file sizes
//! and gives every later step random access to any payload.
//!
//! # Endianness
//! All binary I/O is strictly little-endian.

use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info};

use crate::entry::{patch_payload_len, Entry, EntryHeader, ENTRY_FLAGS};
use crate::error::{truncated, FormatError, Result};
use crate::path::{to_local_path, validate_extension};
use crate::payload::{self, PayloadHeader};
use crate::progress::ProgressSink;
use crate::superblock::{Superblock, SUPERBLOCK_SIZE};

/// Default level for payloads embedded in an archive: fast, tuned for many
/// small files.
pub const ARCHIVE_COMPRESSION_LEVEL: i32   = -3;
/// Default source read size for archive-embedded payloads.
pub const ARCHIVE_CHUNK_SIZE:        usize = 256 * 1024;

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ArchiveWriter<W: Write + Seek> {
    writer:                W,
    start:                 u64,
    entry_count:           u32,
    pub compression_level: i32,
    pub chunk_size:        usize,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W) -> Result<Self> {
        Self::with_options(writer, ARCHIVE_COMPRESSION_LEVEL, ARCHIVE_CHUNK_SIZE)
    }

    pub fn with_options(mut writer: W, compression_level: i32, chunk_size: usize) -> Result<Self> {
        let start = writer.stream_position()?;
        Superblock::new(0).write(&mut writer)?; // count patched on finalize
        Ok(Self {
            writer,
            start,
            entry_count: 0,
            compression_level,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Append one entry, streaming `source` into its payload.
    /// Returns the payload length written.
    pub fn add_entry<R: Read>(
        &mut self,
        rel_path:      &str,
        extension:     &str,
        original_size: u64,
        source:        &mut R,
        progress:      &dyn ProgressSink,
    ) -> Result<u64> {
        if self.entry_count == u32::MAX {
            return Err(FormatError::InvalidLength {
                field: "entry count",
                value: u64::from(u32::MAX) + 1,
            }
            .into());
        }

        to_local_path(rel_path)?;
        validate_extension(extension)?;

        let header = EntryHeader {
            rel_path:      rel_path.to_owned(),
            flags:         ENTRY_FLAGS,
            original_size,
            payload_len:   0,
            extension:     extension.to_owned(),
        };
        let slot = header.write(&mut self.writer)?;

        let payload_len = payload::encode(
            source,
            &mut self.writer,
            original_size,
            extension,
            self.compression_level,
            self.chunk_size,
            progress,
        )?;
        patch_payload_len(&mut self.writer, slot, payload_len)?;

        self.entry_count += 1;
        debug!(rel_path, original_size, payload_len, "added entry");
        Ok(payload_len)
    }

    /// Patch the entry count into the superblock and hand back the sink,
    /// positioned at the end of the archive.
    pub fn finalize(mut self) -> Result<W> {
        let end = self.writer.stream_position()?;
        self.writer.seek(SeekFrom::Start(self.start))?;
        Superblock::new(self.entry_count).write(&mut self.writer)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        info!(entries = self.entry_count, bytes = end - self.start, "archive finalized");
        Ok(self.writer)
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ArchiveReader<R: Read + Seek> {
    reader:                  R,
    pub superblock:          Superblock,
    pub entries:             Vec<Entry>,
    /// Sum of every entry's payload length.
    pub total_payload_bytes: u64,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Validate the superblock and scan every entry header.
    ///
    /// Fails on a magic or version mismatch, on an unsafe entry path, and on
    /// a payload that would run past the end of the stream.
    pub fn open(mut reader: R) -> Result<Self> {
        let start = reader.stream_position()?;
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(start))?;

        let superblock = Superblock::read(&mut reader)?;

        // The count is untrusted; do not let it size the allocation.
        let mut entries = Vec::with_capacity(superblock.entry_count.min(4096) as usize);
        let mut total_payload_bytes = 0u64;

        for i in 0..superblock.entry_count {
            let header = EntryHeader::read(&mut reader)?;
            let payload_offset = reader.stream_position()?;
            let end = payload_offset
                .checked_add(header.payload_len)
                .filter(|&end| end <= stream_len)
                .ok_or_else(|| {
                    truncated(format_args!(
                        "entry {i} ({}) declares {} payload bytes at offset {payload_offset}",
                        header.rel_path, header.payload_len
                    ))
                })?;
            reader.seek(SeekFrom::Start(end))?;

            total_payload_bytes += header.payload_len;
            entries.push(Entry::from_header(header, payload_offset)?);
        }

        debug!(
            entries = entries.len(),
            total_payload_bytes,
            header_bytes = SUPERBLOCK_SIZE,
            "scanned archive headers"
        );
        Ok(Self { reader, superblock, entries, total_payload_bytes })
    }

    /// Decode entry `index` into `sink`.
    pub fn read_entry<W: Write>(&mut self, index: usize, sink: &mut W) -> Result<PayloadHeader> {
        let entry = self.entries.get(index).ok_or(FormatError::InvalidLength {
            field: "entry index",
            value: index as u64,
        })?;
        let (offset, len) = (entry.payload_offset, entry.payload_len);
        self.reader.seek(SeekFrom::Start(offset))?;
        payload::decode(&mut self.reader, Some(len), sink)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
