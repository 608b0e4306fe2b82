//! Self-describing single-file payload.
//!
//! A payload is the unit that carries one file's bytes.  It is embedded
//! verbatim after each archive entry header, and on its own it is the
//! standalone single-file format; both are decoded by the same routines.
//!
//! ```text
//! magic(4) | is_compressed(1) | ext_len(8) | ext
//!   compressed: codec(1) | original_size(8) | compressed_size(8) | body
//!   stored:     raw_size(8) | body
//! ```
//!
//! The writer only emits the compressed form.  The stored form is still
//! decoded so that payloads produced by `encode_stored` stay readable.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::debug;

use crate::codec::{get_codec, get_codec_by_id, CodecId};
use crate::error::{truncated, FormatError, Result};
use crate::path::validate_extension;
use crate::progress::{ProgressBatch, ProgressSink};
use crate::superblock::MAGIC;

/// Hard ceiling on a declared compressed body; anything larger is treated
/// as hostile and rejected before a buffer is allocated.
pub const MAX_COMPRESSED_SIZE: u64 = 2_000_000_000;
/// Longest extension a payload may carry.
pub const MAX_EXTENSION_LEN: usize = 255;
/// Source bytes accumulated before a progress report.
pub const PROGRESS_BATCH: u64 = 1024 * 1024;

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadBody {
    Compressed { codec: CodecId, original_size: u64, compressed_size: u64 },
    Stored { raw_size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Stored extension, no leading dot, may be empty.
    pub extension: String,
    pub body:      PayloadBody,
}

impl PayloadHeader {
    /// Bytes occupied by the header on disk.
    pub fn header_len(&self) -> u64 {
        let fixed = 4 + 1 + 8 + self.extension.len() as u64;
        match self.body {
            PayloadBody::Compressed { .. } => fixed + 1 + 8 + 8,
            PayloadBody::Stored { .. }     => fixed + 8,
        }
    }

    /// Bytes occupied by the body that follows the header.
    pub fn body_len(&self) -> u64 {
        match self.body {
            PayloadBody::Compressed { compressed_size, .. } => compressed_size,
            PayloadBody::Stored { raw_size }                => raw_size,
        }
    }

    /// Size of the original file as recorded by the writer.
    pub fn original_size(&self) -> u64 {
        match self.body {
            PayloadBody::Compressed { original_size, .. } => original_size,
            PayloadBody::Stored { raw_size }              => raw_size,
        }
    }
}

fn write_prefix<W: Write>(sink: &mut W, compressed: bool, extension: &str) -> Result<()> {
    if extension.len() > MAX_EXTENSION_LEN {
        return Err(FormatError::FieldTooLong {
            field: "extension",
            len:   extension.len(),
            max:   MAX_EXTENSION_LEN,
        }
        .into());
    }
    sink.write_all(MAGIC)?;
    sink.write_u8(compressed as u8)?;
    sink.write_u64::<LittleEndian>(extension.len() as u64)?;
    sink.write_all(extension.as_bytes())?;
    Ok(())
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Stream `source` into `sink` as a compressed payload at the sink's current
/// position.
///
/// `compressed_size` is unknown until the encoder finishes, so an 8-byte
/// slot is reserved and patched afterwards; the sink is left positioned at
/// the end of the payload.  Consumed source bytes are reported to
/// `progress` in [`PROGRESS_BATCH`] steps.  Returns the payload length.
pub fn encode<R, W>(
    source:        &mut R,
    sink:          &mut W,
    original_size: u64,
    extension:     &str,
    level:         i32,
    chunk_size:    usize,
    progress:      &dyn ProgressSink,
) -> Result<u64>
where
    R: Read,
    W: Write + Seek,
{
    let start = sink.stream_position()?;
    write_prefix(sink, true, extension)?;
    sink.write_u8(CodecId::Zstd.into())?;
    sink.write_u64::<LittleEndian>(original_size)?;

    let size_slot = sink.stream_position()?;
    sink.write_u64::<LittleEndian>(0)?; // patched below
    let body_start = size_slot + 8;

    let mut batch = ProgressBatch::new(progress, PROGRESS_BATCH);
    let consumed = get_codec(CodecId::Zstd).compress_stream(
        source,
        sink,
        level,
        chunk_size,
        &mut |n| batch.add(n),
    )?;
    batch.flush();

    let end = sink.stream_position()?;
    let compressed_size = end - body_start;
    sink.seek(SeekFrom::Start(size_slot))?;
    sink.write_u64::<LittleEndian>(compressed_size)?;
    sink.seek(SeekFrom::Start(end))?;

    debug!(consumed, compressed_size, level, "encoded payload");
    Ok(end - start)
}

/// Write `source` as a stored (uncompressed) payload.  Returns the payload
/// length.
pub fn encode_stored<R, W>(source: &mut R, sink: &mut W, extension: &str) -> Result<u64>
where
    R: Read,
    W: Write + Seek,
{
    let start = sink.stream_position()?;
    write_prefix(sink, false, extension)?;

    let size_slot = sink.stream_position()?;
    sink.write_u64::<LittleEndian>(0)?; // patched below
    let raw_size = io::copy(source, sink)?;

    let end = sink.stream_position()?;
    sink.seek(SeekFrom::Start(size_slot))?;
    sink.write_u64::<LittleEndian>(raw_size)?;
    sink.seek(SeekFrom::Start(end))?;
    Ok(end - start)
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Read and validate a payload header.
///
/// Fails on a magic mismatch, an oversized or path-like extension, an unknown codec, or a
/// compressed size of zero or above [`MAX_COMPRESSED_SIZE`].  Nothing is
/// allocated for the body here.
pub fn read_header<R: Read>(reader: &mut R) -> Result<PayloadHeader> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FormatError::BadMagic { found: magic }.into());
    }

    let is_compressed = reader.read_u8()? != 0;

    let ext_len = reader.read_u64::<LittleEndian>()?;
    if ext_len > MAX_EXTENSION_LEN as u64 {
        return Err(FormatError::InvalidLength { field: "extension length", value: ext_len }.into());
    }
    let mut ext = vec![0u8; ext_len as usize];
    reader.read_exact(&mut ext)?;
    let extension = String::from_utf8(ext).map_err(|_| FormatError::NotUtf8("extension"))?;
    validate_extension(&extension)?;

    if !is_compressed {
        let raw_size = reader.read_u64::<LittleEndian>()?;
        return Ok(PayloadHeader { extension, body: PayloadBody::Stored { raw_size } });
    }

    let codec = get_codec_by_id(reader.read_u8()?)?.codec_id();
    let original_size = reader.read_u64::<LittleEndian>()?;
    let compressed_size = reader.read_u64::<LittleEndian>()?;
    if compressed_size == 0 || compressed_size > MAX_COMPRESSED_SIZE {
        return Err(FormatError::InvalidLength {
            field: "compressed size",
            value: compressed_size,
        }
        .into());
    }

    Ok(PayloadHeader {
        extension,
        body: PayloadBody::Compressed { codec, original_size, compressed_size },
    })
}

/// Decode the body that follows `header` into `sink`.  Returns the number of
/// bytes written.
///
/// When `declared_len` is known (the entry's payload length, or the size of
/// a standalone file) the header plus body must fit inside it.
pub fn decode_body<R, W>(
    reader:       &mut R,
    header:       &PayloadHeader,
    declared_len: Option<u64>,
    sink:         &mut W,
) -> Result<u64>
where
    R: Read,
    W: Write,
{
    if let Some(limit) = declared_len {
        let needed = header.header_len() + header.body_len();
        if needed > limit {
            return Err(FormatError::InvalidLength { field: "payload length", value: needed }.into());
        }
    }

    match header.body {
        PayloadBody::Compressed { codec, original_size, compressed_size } => {
            let mut compressed = vec![0u8; compressed_size as usize];
            reader.read_exact(&mut compressed).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    truncated(format_args!("compressed body of {compressed_size} bytes"))
                }
                _ => e.into(),
            })?;
            let written = get_codec(codec).decompress(&compressed, sink)?;
            if written != original_size {
                // original_size is advisory: it was sampled before streaming.
                debug!(written, original_size, "decoded size differs from recorded size");
            }
            debug!(codec = codec.name(), compressed_size, written, "decoded payload");
            Ok(written)
        }
        PayloadBody::Stored { raw_size } => {
            let copied = io::copy(&mut reader.take(raw_size), sink)?;
            if copied != raw_size {
                return Err(truncated(format_args!("stored body of {raw_size} bytes")));
            }
            Ok(copied)
        }
    }
}

/// Read a full payload from `reader` into `sink`, returning its header.
pub fn decode<R, W>(reader: &mut R, declared_len: Option<u64>, sink: &mut W) -> Result<PayloadHeader>
where
    R: Read,
    W: Write,
{
    let header = read_header(reader)?;
    decode_body(reader, &header, declared_len, sink)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::error::Error;
    use crate::progress::{NoProgress, ProgressCounter};
    use proptest::prelude::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    fn encoded(data: &[u8], ext: &str) -> Vec<u8> {
        let mut sink = Cursor::new(Vec::new());
        let len = encode(&mut &data[..], &mut sink, data.len() as u64, ext, -3, 1024, &NoProgress)
            .unwrap();
        let bytes = sink.into_inner();
        assert_eq!(len, bytes.len() as u64);
        bytes
    }

    #[test]
    fn compressed_size_slot_is_patched() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let bytes = encoded(&data, "txt");

        let header = read_header(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.extension, "txt");
        assert_eq!(header.header_len() + header.body_len(), bytes.len() as u64);
        assert!(matches!(
            header.body,
            PayloadBody::Compressed { codec: CodecId::Zstd, original_size: 4300, .. }
        ));
    }

    #[test]
    fn decode_restores_bytes_and_leaves_reader_at_payload_end() {
        let data: Vec<u8> = (0..70_000u32).map(|i| (i * 31 % 256) as u8).collect();
        let mut bytes = encoded(&data, "");
        bytes.extend_from_slice(b"NEXT");

        let mut reader = Cursor::new(&bytes);
        let mut out = Vec::new();
        let header = decode(&mut reader, None, &mut out).unwrap();
        assert_eq!(header.extension, "");
        assert_eq!(out, data);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn encode_respects_existing_sink_position() {
        let mut sink = Cursor::new(b"prefix".to_vec());
        sink.seek(SeekFrom::End(0)).unwrap();
        let len = encode(&mut &b"abc"[..], &mut sink, 3, "bin", 1, 16, &NoProgress).unwrap();
        let bytes = sink.into_inner();
        assert_eq!(&bytes[..6], b"prefix");
        assert_eq!(len, bytes.len() as u64 - 6);

        let mut out = Vec::new();
        decode(&mut Cursor::new(&bytes[6..]), Some(len), &mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u64>>);

    impl ProgressSink for Recorder {
        fn reset(&self) {}
        fn set_total(&self, _: u64) {}
        fn add_processed(&self, bytes: u64) {
            self.0.lock().unwrap().push(bytes);
        }
    }

    #[test]
    fn progress_is_reported_in_batches() {
        let data = vec![1u8; 3 * 1024 * 1024 + 10];
        let counter = ProgressCounter::new();
        counter.set_total(data.len() as u64);
        let mut sink = Cursor::new(Vec::new());
        encode(&mut &data[..], &mut sink, data.len() as u64, "", -3, 256 * 1024, &counter).unwrap();
        assert_eq!(counter.processed(), data.len() as u64);

        let recorder = Recorder::default();
        let mut sink = Cursor::new(Vec::new());
        encode(&mut &data[..], &mut sink, data.len() as u64, "", -3, 64 * 1024, &recorder).unwrap();
        let reports = recorder.0.into_inner().unwrap();
        let (last, full) = reports.split_last().unwrap();
        assert!(full.iter().all(|&n| n >= PROGRESS_BATCH), "{reports:?}");
        assert_eq!(full.len(), 3);
        assert_eq!(*last, 10);
        assert_eq!(reports.iter().sum::<u64>(), data.len() as u64);
    }

    #[test]
    fn extensions_with_path_syntax_are_rejected() {
        for ext in ["/..", "a/b", ".."] {
            let mut bytes = MAGIC.to_vec();
            bytes.push(0);
            bytes.extend_from_slice(&(ext.len() as u64).to_le_bytes());
            bytes.extend_from_slice(ext.as_bytes());
            bytes.extend_from_slice(&0u64.to_le_bytes());
            let err = read_header(&mut Cursor::new(&bytes)).unwrap_err();
            assert!(matches!(err, Error::Format(FormatError::UnsafePath(_))), "{ext:?}");
        }
    }

    #[test]
    fn stored_form_is_still_decodable() {
        let mut sink = Cursor::new(Vec::new());
        let len = encode_stored(&mut &b"raw bytes"[..], &mut sink, "dat").unwrap();
        let bytes = sink.into_inner();
        assert_eq!(len, bytes.len() as u64);
        assert_eq!(bytes[4], 0);

        let mut out = Vec::new();
        let header = decode(&mut Cursor::new(&bytes), Some(len), &mut out).unwrap();
        assert_eq!(header.body, PayloadBody::Stored { raw_size: 9 });
        assert_eq!(header.extension, "dat");
        assert_eq!(out, b"raw bytes");
    }

    #[test]
    fn truncated_stored_body_is_io_error() {
        let mut sink = Cursor::new(Vec::new());
        encode_stored(&mut &b"0123456789"[..], &mut sink, "").unwrap();
        let mut bytes = sink.into_inner();
        bytes.truncate(bytes.len() - 3);

        let err = decode(&mut Cursor::new(&bytes), None, &mut io::sink()).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encoded(b"abc", "x");
        bytes[0] = b'Z';
        let err = decode(&mut Cursor::new(&bytes), None, &mut io::sink()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));
    }

    #[test]
    fn unknown_codec_is_fatal() {
        let mut bytes = encoded(b"abc", "x");
        // magic(4) + flag(1) + ext_len(8) + "x"(1)
        bytes[14] = 9;
        let err = decode(&mut Cursor::new(&bytes), None, &mut io::sink()).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::UnknownCodec(9))));
    }

    #[test]
    fn oversized_extension_length_is_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.push(1);
        bytes.extend_from_slice(&256u64.to_le_bytes());
        let err = read_header(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::InvalidLength { field: "extension length", value: 256 })
        ));

        let long = "e".repeat(MAX_EXTENSION_LEN + 1);
        let err = encode(&mut &b""[..], &mut Cursor::new(Vec::new()), 0, &long, 1, 16, &NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::FieldTooLong { .. })));
    }

    fn forged(compressed_size: u64) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.push(1);
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&10u64.to_le_bytes());
        bytes.extend_from_slice(&compressed_size.to_le_bytes());
        bytes
    }

    #[test]
    fn forged_compressed_sizes_are_rejected_before_allocation() {
        for size in [0, MAX_COMPRESSED_SIZE + 1, u64::MAX] {
            let err = read_header(&mut Cursor::new(forged(size))).unwrap_err();
            assert!(matches!(
                err,
                Error::Format(FormatError::InvalidLength { field: "compressed size", value }) if value == size
            ));
        }
    }

    #[test]
    fn body_larger_than_declared_length_is_rejected() {
        let bytes = forged(1000);
        let header = read_header(&mut Cursor::new(&bytes)).unwrap();
        let err = decode_body(&mut Cursor::new(Vec::new()), &header, Some(100), &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::InvalidLength { field: "payload length", .. })));
    }

    #[test]
    fn short_compressed_body_is_io_error() {
        let mut bytes = forged(1000);
        bytes.extend_from_slice(&[0u8; 10]);
        let err = decode(&mut Cursor::new(&bytes), None, &mut io::sink()).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    proptest! {
        #[test]
        fn any_bytes_and_extension_survive_framing(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            ext in "[a-z0-9]{0,8}",
            chunk in 1usize..512,
        ) {
            let mut sink = Cursor::new(Vec::new());
            let len = encode(&mut &data[..], &mut sink, data.len() as u64, &ext, 1, chunk, &NoProgress).unwrap();
            let bytes = sink.into_inner();
            prop_assert_eq!(len, bytes.len() as u64);

            let mut out = Vec::new();
            let header = decode(&mut Cursor::new(&bytes), Some(len), &mut out).unwrap();
            prop_assert_eq!(header.extension, ext);
            prop_assert_eq!(out, data);
        }
    }
}
