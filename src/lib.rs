pub mod error;
pub mod superblock;
pub mod codec;
pub mod payload;
pub mod entry;
pub mod path;
pub mod collect;
pub mod progress;
pub mod io_stream;
pub mod extract;
pub mod archive;

pub use error::{Error, FormatError, Result};
pub use superblock::Superblock;
pub use codec::{CodecId, get_codec};
pub use entry::Entry;
pub use progress::{NoProgress, ProgressCounter, ProgressSink};
pub use io_stream::{ArchiveReader, ArchiveWriter};
pub use archive::{
    compress_single_file_stream, create_archive, decompress_single_file_stream, extract_archive,
    list_archive, ArchiveSummary, ExtractOptions, PackOptions, SingleFileOptions,
};
