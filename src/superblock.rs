use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{FormatError, Result};

/// Shared tag for the archive header and every nested payload.
pub const MAGIC: &[u8; 4] = b"KP05";
/// The single accepted format version.  No range or compatibility check.
pub const VERSION: u8 = 5;
/// magic(4) + version(1) + entry_count(4)
pub const SUPERBLOCK_SIZE: u64 = 9;

/// Global archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version:     u8,
    pub entry_count: u32,
}

impl Superblock {
    pub fn new(entry_count: u32) -> Self {
        Self { version: VERSION, entry_count }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u8(self.version)?;
        writer.write_u32::<LittleEndian>(self.entry_count)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic }.into());
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version).into());
        }
        let entry_count = reader.read_u32::<LittleEndian>()?;
        Ok(Self { version, entry_count })
    }
}
