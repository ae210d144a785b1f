//! Region files: header index and chunk record I/O.
//!
//! A region file stores up to 32x32 chunks in 4 KiB sectors. The first two
//! sectors are the header: 1024 big-endian location entries
//! (`sector offset:24 | sector count:8`, zero = absent) followed by 1024
//! timestamps. Each chunk record is a big-endian `u32` length, a compression
//! byte, then the payload.
//!
//! Only records of type 3 (uncompressed) and 4 (LZ4) are readable. Other
//! types, such as zlib (2) written by other tools, fail with a format error,
//! so the repair pass skips those chunks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::error::Error;
use crate::core::types::Result;
use super::chunk::ChunkPos;

/// Chunks per region along x and z
pub const REGION_WIDTH: i32 = 32;
/// Chunk slots per region
pub const CHUNKS_PER_REGION: usize = (REGION_WIDTH * REGION_WIDTH) as usize;
/// Allocation unit of a region file
pub const SECTOR_SIZE: usize = 4096;

const LOCATION_TABLE_SIZE: usize = CHUNKS_PER_REGION * 4;
const HEADER_SECTORS: u32 = 2;
const MAX_SECTORS_PER_CHUNK: usize = u8::MAX as usize;
/// Length field plus compression byte
const RECORD_HEADER_SIZE: usize = 5;

/// Payload stored as-is
pub const COMPRESSION_NONE: u8 = 3;
/// Payload compressed with LZ4 (size-prepended block)
pub const COMPRESSION_LZ4: u8 = 4;

/// Header slot of a local chunk position
pub fn slot_index(local_x: usize, local_z: usize) -> usize {
    local_x + local_z * REGION_WIDTH as usize
}

/// First chunk coordinate of a region along one axis, `None` if the
/// region's chunks don't fit in `i32`
fn region_origin(region: i32) -> Option<i32> {
    let origin = region.checked_mul(REGION_WIDTH)?;
    origin.checked_add(REGION_WIDTH - 1)?;
    Some(origin)
}

/// Parse `r.<x>.<z>.<ext>` into region coordinates.
///
/// Names whose chunk coordinates would overflow `i32` are rejected.
pub fn parse_region_file_name(name: &str) -> Option<(i32, i32)> {
    let mut parts = name.split('.');
    if parts.next()? != "r" {
        return None;
    }
    let x = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    parts.next()?;
    region_origin(x)?;
    region_origin(z)?;
    Some((x, z))
}

/// File name for a region
pub fn region_file_name(region_x: i32, region_z: i32, extension: &str) -> String {
    format!("r.{}.{}.{}", region_x, region_z, extension)
}

fn format_error(path: &Path, msg: impl std::fmt::Display) -> Error {
    Error::FileFormat(format!("{}: {}", path.display(), msg))
}

fn read_table(bytes: &[u8]) -> Box<[u32; CHUNKS_PER_REGION]> {
    let mut table = Box::new([0u32; CHUNKS_PER_REGION]);
    for (entry, raw) in table.iter_mut().zip(bytes.chunks_exact(4)) {
        *entry = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    }
    table
}

/// Chunk presence table of one region file.
///
/// Only the location table is read; chunk payloads are never touched.
#[derive(Debug)]
pub struct RegionIndex {
    path: PathBuf,
    region_x: i32,
    region_z: i32,
    present: Box<[bool; CHUNKS_PER_REGION]>,
}

impl RegionIndex {
    /// Create an unopened index; every chunk reads as absent until [`open`](Self::open)
    pub fn new(path: impl AsRef<Path>, region_x: i32, region_z: i32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            region_x,
            region_z,
            present: Box::new([false; CHUNKS_PER_REGION]),
        }
    }

    /// Build and open an index, taking the coordinates from the file name
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (region_x, region_z) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_region_file_name)
            .ok_or_else(|| format_error(path, "not a region file name"))?;

        let mut index = Self::new(path, region_x, region_z);
        index.open()?;
        Ok(index)
    }

    /// Read the location table. Files shorter than the two header sectors
    /// are rejected.
    pub fn open(&mut self) -> Result<()> {
        let mut file = File::open(&self.path)?;
        if (file.metadata()?.len() as usize) < HEADER_SECTORS as usize * SECTOR_SIZE {
            return Err(format_error(&self.path, "truncated header"));
        }
        let mut table = vec![0u8; LOCATION_TABLE_SIZE];
        file.read_exact(&mut table).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => format_error(&self.path, "truncated header"),
            _ => Error::Io(e),
        })?;

        for (present, location) in self.present.iter_mut().zip(read_table(&table).iter()) {
            *present = *location != 0;
        }
        Ok(())
    }

    pub fn region_x(&self) -> i32 {
        self.region_x
    }

    pub fn region_z(&self) -> i32 {
        self.region_z
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the header marks a chunk as stored; false outside `0..32`
    pub fn chunk_exists(&self, local_x: usize, local_z: usize) -> bool {
        local_x < REGION_WIDTH as usize
            && local_z < REGION_WIDTH as usize
            && self.present[slot_index(local_x, local_z)]
    }

    /// Absolute positions of stored chunks, x-major then z.
    ///
    /// Empty for a region whose chunk coordinates don't fit in `i32`.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        let width = REGION_WIDTH as usize;
        let origin = region_origin(self.region_x).zip(region_origin(self.region_z));
        (0..width)
            .flat_map(move |x| (0..width).map(move |z| (x, z)))
            .filter(|&(x, z)| self.chunk_exists(x, z))
            .filter_map(move |(x, z)| {
                let (origin_x, origin_z) = origin?;
                Some(ChunkPos::new(origin_x + x as i32, origin_z + z as i32))
            })
    }

    /// Number of stored chunks
    pub fn chunk_count(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }
}

/// Open region file supporting chunk record reads and writes
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    locations: Box<[u32; CHUNKS_PER_REGION]>,
    /// Sectors in use, including the header
    sector_count: u32,
}

impl RegionFile {
    /// Open a region file, creating an empty one if it doesn't exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len() as usize;
        if len == 0 {
            file.write_all(&vec![0u8; HEADER_SECTORS as usize * SECTOR_SIZE])?;
            file.flush()?;
        } else if len < HEADER_SECTORS as usize * SECTOR_SIZE {
            return Err(format_error(&path, "truncated header"));
        }

        file.seek(SeekFrom::Start(0))?;
        let mut table = vec![0u8; LOCATION_TABLE_SIZE];
        file.read_exact(&mut table)?;
        let locations = read_table(&table);

        let len = file.metadata()?.len() as usize;
        let sector_count = len.div_ceil(SECTOR_SIZE) as u32;

        Ok(Self {
            path,
            file,
            locations,
            sector_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_exists(&self, local_x: usize, local_z: usize) -> bool {
        self.location(local_x, local_z).is_some_and(|l| l != 0)
    }

    fn location(&self, local_x: usize, local_z: usize) -> Option<u32> {
        if local_x >= REGION_WIDTH as usize || local_z >= REGION_WIDTH as usize {
            return None;
        }
        Some(self.locations[slot_index(local_x, local_z)])
    }

    /// Read and decompress a chunk payload, `None` if the slot is empty
    pub fn read_chunk(&mut self, local_x: usize, local_z: usize) -> Result<Option<Vec<u8>>> {
        let location = match self.location(local_x, local_z) {
            Some(0) | None => return Ok(None),
            Some(location) => location,
        };

        let offset = location >> 8;
        let sectors = (location & 0xff) as usize;
        if offset < HEADER_SECTORS || offset + sectors as u32 > self.sector_count {
            return Err(format_error(&self.path, format!(
                "chunk ({}, {}) points outside the file", local_x, local_z
            )));
        }

        self.file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;
        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.file.read_exact(&mut header)?;

        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if length == 0 || length + 4 > sectors * SECTOR_SIZE {
            return Err(format_error(&self.path, format!(
                "chunk ({}, {}) has invalid length {}", local_x, local_z, length
            )));
        }

        let mut payload = vec![0u8; length - 1];
        self.file.read_exact(&mut payload)?;

        match header[4] {
            COMPRESSION_NONE => Ok(Some(payload)),
            COMPRESSION_LZ4 => lz4_flex::decompress_size_prepended(&payload)
                .map(Some)
                .map_err(|e| format_error(&self.path, format!("LZ4 decompression failed: {}", e))),
            other => Err(format_error(&self.path, format!("unsupported compression type {}", other))),
        }
    }

    /// Compress and store a chunk payload.
    ///
    /// The record is written in place when it fits the chunk's current
    /// sectors, otherwise appended at the end of the file.
    pub fn write_chunk(&mut self, local_x: usize, local_z: usize, payload: &[u8]) -> Result<()> {
        let location = self.location(local_x, local_z).ok_or_else(|| {
            format_error(&self.path, format!("local chunk ({}, {}) out of range", local_x, local_z))
        })?;

        let compressed = lz4_flex::compress_prepend_size(payload);
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + compressed.len());
        record.extend_from_slice(&(compressed.len() as u32 + 1).to_be_bytes());
        record.push(COMPRESSION_LZ4);
        record.extend_from_slice(&compressed);

        let needed = record.len().div_ceil(SECTOR_SIZE);
        if needed > MAX_SECTORS_PER_CHUNK {
            return Err(format_error(&self.path, format!(
                "chunk ({}, {}) needs {} sectors", local_x, local_z, needed
            )));
        }
        record.resize(needed * SECTOR_SIZE, 0);

        let (old_offset, old_sectors) = (location >> 8, (location & 0xff) as usize);
        let offset = if location != 0 && old_sectors >= needed {
            old_offset
        } else {
            let end = self.sector_count;
            self.sector_count += needed as u32;
            end
        };

        self.file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;
        self.file.write_all(&record)?;

        let slot = slot_index(local_x, local_z);
        let location = (offset << 8) | needed as u32;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        self.file.seek(SeekFrom::Start(slot as u64 * 4))?;
        self.file.write_all(&location.to_be_bytes())?;
        self.file.seek(SeekFrom::Start((LOCATION_TABLE_SIZE + slot * 4) as u64))?;
        self.file.write_all(&timestamp.to_be_bytes())?;
        self.file.flush()?;

        self.locations[slot] = location;
        Ok(())
    }
}
