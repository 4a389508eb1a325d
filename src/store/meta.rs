//! Store file container format.
//!
//! A store is a single self-describing file:
//!
//! ```text
//! +------------------------------+ 0
//! | Superblock (4096 bytes)      |
//! +------------------------------+ 4096
//! | Mesh universe section        |  count:u64, keys:u32[N], crc32
//! +------------------------------+
//! | Perfect hash section         |  self-checksummed blob, crc32
//! +------------------------------+ data_off (4096-aligned)
//! | Chunk grid (sparse)          |
//! +------------------------------+
//! ```
//!
//! ## Superblock
//!
//! ```text
//! +-----------+---------+-------+-----------+-----------+
//! | magic (8) | version | flags | time_rows | mesh_cols |
//! +-----------+---------+-------+-----------+-----------+
//! | chunk geometry | section offsets/lengths | data_off |
//! +------------------------------------------------------+
//! | epoch string | compose record (composed stores only) |
//! +------------------------------------------------------+
//! | crc32 | zero padding to 4096                         |
//! +------------------------------------------------------+
//! ```
//!
//! All fixed-width integers are big-endian; the compose record is a
//! bincode value. The superblock is rewritten in place when the time
//! extent changes or when a composition is declared; the sections are
//! written once at creation.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read};
use std::os::unix::fs::FileExt;

use crate::error::Result;
use crate::{errdata, errinput};
use crate::Error;

pub const SUPERBLOCK_SIZE: usize = 4096;
const MAGIC: &[u8; 8] = b"MESHDB\0S";
const VERSION: u32 = 1;
const FLAG_COMPOSED: u32 = 1;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Reference to the historical slab of a composed store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRecord {
    /// Path of the store file serving rows `[0, split_rows)`.
    pub source_path: String,
    /// Logical row where the store's own grid takes over.
    pub split_rows: u64,
}

#[derive(Debug, Clone)]
pub struct StoreMeta {
    pub time_rows: u64,
    pub mesh_cols: u64,
    pub chunk_rows: u32,
    pub chunk_cols: u32,
    /// Epoch attribute, `YYYY-MM-DD HH:MM:SS`.
    pub epoch: String,
    pub universe_off: u64,
    pub universe_len: u64,
    pub mph_off: u64,
    pub mph_len: u64,
    pub data_off: u64,
    pub compose: Option<ComposeRecord>,
}

impl StoreMeta {
    pub fn is_composed(&self) -> bool {
        self.compose.is_some()
    }

    pub fn encode(&self) -> Result<[u8; SUPERBLOCK_SIZE]> {
        let mut body = Vec::with_capacity(256);
        body.extend_from_slice(MAGIC);
        body.write_u32::<BigEndian>(VERSION).unwrap();
        let flags = if self.compose.is_some() {
            FLAG_COMPOSED
        } else {
            0
        };
        body.write_u32::<BigEndian>(flags).unwrap();
        body.write_u64::<BigEndian>(self.time_rows).unwrap();
        body.write_u64::<BigEndian>(self.mesh_cols).unwrap();
        body.write_u32::<BigEndian>(self.chunk_rows).unwrap();
        body.write_u32::<BigEndian>(self.chunk_cols).unwrap();
        body.write_u64::<BigEndian>(self.universe_off).unwrap();
        body.write_u64::<BigEndian>(self.universe_len).unwrap();
        body.write_u64::<BigEndian>(self.mph_off).unwrap();
        body.write_u64::<BigEndian>(self.mph_len).unwrap();
        body.write_u64::<BigEndian>(self.data_off).unwrap();

        let epoch = self.epoch.as_bytes();
        if epoch.len() > u8::MAX as usize {
            return errinput!("epoch string too long: {} bytes", epoch.len());
        }
        body.push(epoch.len() as u8);
        body.extend_from_slice(epoch);

        if let Some(record) = &self.compose {
            let encoded = bincode::serialize(record)?;
            body.write_u32::<BigEndian>(encoded.len() as u32).unwrap();
            body.extend_from_slice(&encoded);
        }

        if body.len() + 4 > SUPERBLOCK_SIZE {
            return errinput!("superblock overflow: {} bytes", body.len());
        }

        let mut block = [0u8; SUPERBLOCK_SIZE];
        block[..body.len()].copy_from_slice(&body);
        let checksum = CRC32.checksum(&body);
        (&mut block[body.len()..body.len() + 4])
            .write_u32::<BigEndian>(checksum)
            .unwrap();
        Ok(block)
    }

    pub fn decode(block: &[u8; SUPERBLOCK_SIZE]) -> Result<Self> {
        let mut cursor = Cursor::new(&block[..]);

        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if magic != *MAGIC {
            return errdata!("not a meshdb store file");
        }

        let version = cursor.read_u32::<BigEndian>()?;
        if version != VERSION {
            return errdata!("unsupported store version: {version}");
        }

        let flags = cursor.read_u32::<BigEndian>()?;
        let time_rows = cursor.read_u64::<BigEndian>()?;
        let mesh_cols = cursor.read_u64::<BigEndian>()?;
        let chunk_rows = cursor.read_u32::<BigEndian>()?;
        let chunk_cols = cursor.read_u32::<BigEndian>()?;
        let universe_off = cursor.read_u64::<BigEndian>()?;
        let universe_len = cursor.read_u64::<BigEndian>()?;
        let mph_off = cursor.read_u64::<BigEndian>()?;
        let mph_len = cursor.read_u64::<BigEndian>()?;
        let data_off = cursor.read_u64::<BigEndian>()?;

        let epoch_len = cursor.read_u8()? as usize;
        let mut epoch_bytes = vec![0u8; epoch_len];
        cursor.read_exact(&mut epoch_bytes)?;
        let epoch = String::from_utf8(epoch_bytes)
            .map_err(|_| Error::InvalidData("epoch attribute is not utf-8".to_string()))?;

        let compose = if flags & FLAG_COMPOSED != 0 {
            let record_len = cursor.read_u32::<BigEndian>()? as usize;
            if record_len > SUPERBLOCK_SIZE {
                return errdata!("compose record length {record_len} exceeds superblock");
            }
            let mut record_bytes = vec![0u8; record_len];
            cursor.read_exact(&mut record_bytes)?;
            Some(bincode::deserialize(&record_bytes)?)
        } else {
            None
        };

        let body_len = cursor.position() as usize;
        let stored = cursor.read_u32::<BigEndian>()?;
        if CRC32.checksum(&block[..body_len]) != stored {
            return errdata!("superblock checksum mismatch");
        }

        if chunk_rows == 0 || chunk_cols == 0 {
            return errdata!("zero chunk geometry");
        }

        Ok(Self {
            time_rows,
            mesh_cols,
            chunk_rows,
            chunk_cols,
            epoch,
            universe_off,
            universe_len,
            mph_off,
            mph_len,
            data_off,
            compose,
        })
    }

    pub fn read_from(file: &File) -> Result<Self> {
        let mut block = [0u8; SUPERBLOCK_SIZE];
        file.read_exact_at(&mut block, 0)
            .map_err(|e| Error::InvalidData(format!("cannot read superblock: {e}")))?;
        Self::decode(&block)
    }

    pub fn write_to(&self, file: &File) -> Result<()> {
        let block = self.encode()?;
        file.write_all_at(&block, 0)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Write a section payload followed by its CRC32. Returns the section's
/// on-disk length.
pub fn write_section(file: &File, off: u64, payload: &[u8]) -> Result<u64> {
    file.write_all_at(payload, off)?;
    let mut trailer = [0u8; 4];
    (&mut trailer[..])
        .write_u32::<BigEndian>(CRC32.checksum(payload))
        .unwrap();
    file.write_all_at(&trailer, off + payload.len() as u64)?;
    Ok(payload.len() as u64 + 4)
}

/// Read a section written by [`write_section`], verifying its checksum.
pub fn read_section(file: &File, off: u64, len: u64) -> Result<Vec<u8>> {
    if len < 4 {
        return errdata!("section at {off} too short: {len} bytes");
    }
    let mut bytes = vec![0u8; len as usize];
    file.read_exact_at(&mut bytes, off)?;

    let (payload, trailer) = bytes.split_at(bytes.len() - 4);
    let stored = Cursor::new(trailer).read_u32::<BigEndian>()?;
    if CRC32.checksum(payload) != stored {
        return errdata!("section at {off} checksum mismatch");
    }
    bytes.truncate(len as usize - 4);
    Ok(bytes)
}

/// Encode the ordered mesh universe as a section payload.
pub fn encode_universe(keys: &[u32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + keys.len() * 4);
    payload.write_u64::<BigEndian>(keys.len() as u64).unwrap();
    for &key in keys {
        payload.write_u32::<BigEndian>(key).unwrap();
    }
    payload
}

/// Decode a universe section payload.
pub fn decode_universe(payload: &[u8]) -> Result<Vec<u32>> {
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u64::<BigEndian>()? as usize;
    if payload.len() != 8 + count * 4 {
        return errdata!(
            "universe section claims {count} keys but holds {} bytes",
            payload.len()
        );
    }
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(cursor.read_u32::<BigEndian>()?);
    }
    Ok(keys)
}

/// Round an offset up to the next 4096-byte boundary.
pub fn align_up(offset: u64) -> u64 {
    offset.div_ceil(4096) * 4096
}
