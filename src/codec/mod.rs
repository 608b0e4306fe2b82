//! Codec registry.
//!
//! A codec is identified on disk by a single byte inside each compressed
//! payload.  The set of identifiers is frozen: a reader that meets an
//! identifier it does not know MUST fail immediately.  There is no
//! negotiation and no fallback to another codec.
//!
//! Codecs are driven as streams.  Compression consumes the source in
//! bounded chunks so that arbitrarily large files never have to be held in
//! memory; decompression works from the bounded, already-validated
//! compressed body and writes to the sink as it goes.

use std::io::{self, Read, Write};
use thiserror::Error;

/// Zstandard.  The only codec defined for KP05.
pub const CODEC_ZSTD: u8 = 1;

/// Output chunk used while draining a decoder into the sink.
const DECODE_CHUNK: usize = 256 * 1024;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecId {
    Zstd = CODEC_ZSTD,
}

impl CodecId {
    /// Resolve an on-disk identifier.  Unknown identifiers are fatal.
    pub fn from_u8(id: u8) -> Result<Self, CodecError> {
        match id {
            CODEC_ZSTD => Ok(CodecId::Zstd),
            other      => Err(CodecError::UnknownCodec(other)),
        }
    }

    /// Human-readable name (diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Zstd => "zstd",
        }
    }
}

impl From<CodecId> for u8 {
    fn from(id: CodecId) -> u8 {
        id as u8
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Unsupported codec id {0}; cannot decode without it")]
    UnknownCodec(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;

    /// Stream `src` through the encoder into `dst`, reading at most
    /// `chunk_size` bytes at a time.  `on_consumed` is told how many source
    /// bytes each chunk held.  Returns the total number of source bytes.
    fn compress_stream(
        &self,
        src:         &mut dyn Read,
        dst:         &mut dyn Write,
        level:       i32,
        chunk_size:  usize,
        on_consumed: &mut dyn FnMut(u64),
    ) -> Result<u64, CodecError>;

    /// Fully decompress `data` into `dst`.  Returns the decoded length.
    fn decompress(&self, data: &[u8], dst: &mut dyn Write) -> Result<u64, CodecError>;
}

// ── Built-in codecs ──────────────────────────────────────────────────────────

pub struct ZstdCodec;

impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }

    fn compress_stream(
        &self,
        src:         &mut dyn Read,
        dst:         &mut dyn Write,
        level:       i32,
        chunk_size:  usize,
        on_consumed: &mut dyn FnMut(u64),
    ) -> Result<u64, CodecError> {
        let mut encoder = zstd::stream::write::Encoder::new(dst, level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut consumed = 0u64;
        loop {
            let n = match src.read(&mut buf) {
                Ok(0)  => break,
                Ok(n)  => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::Io(e)),
            };
            encoder
                .write_all(&buf[..n])
                .map_err(|e| CodecError::Compression(e.to_string()))?;
            consumed += n as u64;
            on_consumed(n as u64);
        }

        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(consumed)
    }

    fn decompress(&self, data: &[u8], dst: &mut dyn Write) -> Result<u64, CodecError> {
        let mut decoder = zstd::stream::read::Decoder::with_buffer(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;

        let mut buf = vec![0u8; DECODE_CHUNK];
        let mut produced = 0u64;
        loop {
            let n = match decoder.read(&mut buf) {
                Ok(0)  => break,
                Ok(n)  => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::Decompression(e.to_string())),
            };
            dst.write_all(&buf[..n])?;
            produced += n as u64;
        }
        Ok(produced)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Zstd => Box::new(ZstdCodec),
    }
}

/// Resolve an on-disk identifier to a built-in codec.
///
/// The caller MUST NOT fall back to any other codec on error.
pub fn get_codec_by_id(id: u8) -> Result<Box<dyn Codec>, CodecError> {
    CodecId::from_u8(id).map(get_codec)
}
