use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{FormatError, Result};
use crate::path::{to_local_path, validate_extension};

/// Entry flags byte.  Reserved; always written as 1.
pub const ENTRY_FLAGS: u8 = 1;

/// Per-file header preceding each payload inside an archive.
///
/// ```text
/// rel_path_len(2) | rel_path | flags(1) | original_size(8) | payload_len(8) | ext_len(2) | ext
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// `/`-separated path inside the archive.
    pub rel_path:      String,
    pub flags:         u8,
    /// Best-effort size of the source file; 0 when it could not be read.
    pub original_size: u64,
    /// Exact length of the payload that follows this header.
    pub payload_len:   u64,
    /// Stored extension, no leading dot, may be empty.
    pub extension:     String,
}

fn check_len(field: &'static str, value: &str) -> Result<u16> {
    u16::try_from(value.len()).map_err(|_| {
        FormatError::FieldTooLong { field, len: value.len(), max: u16::MAX as usize }.into()
    })
}

impl EntryHeader {
    /// Write the header.  Returns the absolute position of the
    /// `payload_len` field so it can be patched with [`patch_payload_len`].
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<u64> {
        let path_len = check_len("entry path", &self.rel_path)?;
        let ext_len = check_len("extension", &self.extension)?;

        writer.write_u16::<LittleEndian>(path_len)?;
        writer.write_all(self.rel_path.as_bytes())?;
        writer.write_u8(self.flags)?;
        writer.write_u64::<LittleEndian>(self.original_size)?;
        let slot = writer.stream_position()?;
        writer.write_u64::<LittleEndian>(self.payload_len)?;
        writer.write_u16::<LittleEndian>(ext_len)?;
        writer.write_all(self.extension.as_bytes())?;
        Ok(slot)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let path_len = reader.read_u16::<LittleEndian>()?;
        let mut path = vec![0u8; path_len as usize];
        reader.read_exact(&mut path)?;
        let rel_path = String::from_utf8(path).map_err(|_| FormatError::NotUtf8("entry path"))?;

        let flags = reader.read_u8()?;
        let original_size = reader.read_u64::<LittleEndian>()?;
        let payload_len = reader.read_u64::<LittleEndian>()?;

        let ext_len = reader.read_u16::<LittleEndian>()?;
        let mut ext = vec![0u8; ext_len as usize];
        reader.read_exact(&mut ext)?;
        let extension = String::from_utf8(ext).map_err(|_| FormatError::NotUtf8("extension"))?;

        Ok(Self { rel_path, flags, original_size, payload_len, extension })
    }
}

/// Overwrite the `payload_len` field at `slot`, then return to where the
/// writer was.
pub fn patch_payload_len<W: Write + Seek>(writer: &mut W, slot: u64, payload_len: u64) -> Result<()> {
    let resume = writer.stream_position()?;
    writer.seek(SeekFrom::Start(slot))?;
    writer.write_u64::<LittleEndian>(payload_len)?;
    writer.seek(SeekFrom::Start(resume))?;
    Ok(())
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// A scanned entry: its header plus where its payload starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub rel_path:       String,
    pub extension:      String,
    pub flags:          u8,
    pub original_size:  u64,
    pub payload_len:    u64,
    pub payload_offset: u64,
}

impl Entry {
    /// Validate the stored path and extension and attach the payload offset.
    pub fn from_header(header: EntryHeader, payload_offset: u64) -> Result<Self> {
        to_local_path(&header.rel_path)?;
        validate_extension(&header.extension)?;
        Ok(Self {
            rel_path:       header.rel_path,
            extension:      header.extension,
            flags:          header.flags,
            original_size:  header.original_size,
            payload_len:    header.payload_len,
            payload_offset,
        })
    }

    /// First byte after this entry's payload.
    pub fn end_offset(&self) -> u64 {
        self.payload_offset + self.payload_len
    }
}
