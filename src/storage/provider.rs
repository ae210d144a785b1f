//! World provider detection and the region-file (Anvil) provider

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::Error;
use crate::core::types::Result;
use super::chunk::{Chunk, ChunkPos, MAX_WORLD_HEIGHT, SECTION_HEIGHT};
use super::codec::{deserialize_chunk, serialize_chunk};
use super::region::{region_file_name, RegionFile};

/// World metadata file every provider expects
pub const LEVEL_DAT: &str = "level.dat";
/// Directory holding region files
pub const REGION_DIR: &str = "region";
/// Extension of Anvil region files
pub const ANVIL_EXTENSION: &str = "mca";
/// Directory holding LevelDB worlds
const LEVELDB_DIR: &str = "db";

/// Storage layouts a world directory can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Region files with `.mca` extension
    Anvil,
    /// Legacy region files with `.mcr` extension
    McRegion,
    /// Bedrock-style LevelDB database
    LevelDb,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Anvil => write!(f, "Anvil"),
            ProviderKind::McRegion => write!(f, "McRegion"),
            ProviderKind::LevelDb => write!(f, "LevelDB"),
        }
    }
}

fn has_file_with_extension(dir: &Path, extension: &str) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.flatten().any(|entry| {
                entry.path().extension().is_some_and(|ext| ext == extension)
            })
        })
        .unwrap_or(false)
}

impl ProviderKind {
    /// Identify the layout of a world directory, `None` if nothing matches
    pub fn detect(world_dir: &Path) -> Option<Self> {
        if !world_dir.join(LEVEL_DAT).exists() {
            return None;
        }

        let region_dir = world_dir.join(REGION_DIR);
        if region_dir.is_dir() {
            if !has_file_with_extension(&region_dir, ANVIL_EXTENSION)
                && has_file_with_extension(&region_dir, "mcr")
            {
                return Some(ProviderKind::McRegion);
            }
            return Some(ProviderKind::Anvil);
        }

        if world_dir.join(LEVELDB_DIR).is_dir() {
            return Some(ProviderKind::LevelDb);
        }

        None
    }

    /// Region file extension, for region-based layouts
    pub fn region_extension(self) -> Option<&'static str> {
        match self {
            ProviderKind::Anvil => Some(ANVIL_EXTENSION),
            ProviderKind::McRegion => Some("mcr"),
            ProviderKind::LevelDb => None,
        }
    }
}

/// Chunk storage backed by `region/r.<x>.<z>.mca` files.
///
/// Region files are opened lazily and kept open until
/// [`release_caches`](Self::release_caches).
pub struct AnvilProvider {
    world_dir: PathBuf,
    region_dir: PathBuf,
    world_height: u32,
    regions: HashMap<(i32, i32), RegionFile>,
}

impl fmt::Debug for AnvilProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnvilProvider")
            .field("world_dir", &self.world_dir)
            .field("world_height", &self.world_height)
            .field("open_regions", &self.regions.len())
            .finish()
    }
}

impl AnvilProvider {
    /// Open a world directory
    pub fn open(world_dir: impl AsRef<Path>, world_height: u32) -> Result<Self> {
        let world_dir = world_dir.as_ref().to_path_buf();

        if world_height == 0
            || world_height > MAX_WORLD_HEIGHT
            || world_height as usize % SECTION_HEIGHT != 0
        {
            return Err(Error::ProviderInit(format!(
                "world height {} is not a multiple of {} in 1..={}",
                world_height, SECTION_HEIGHT, MAX_WORLD_HEIGHT
            )));
        }

        let level_dat = world_dir.join(LEVEL_DAT);
        if !level_dat.is_file() {
            return Err(Error::ProviderInit(format!("{} is not a file", level_dat.display())));
        }

        let region_dir = world_dir.join(REGION_DIR);
        fs::read_dir(&region_dir).map_err(|e| {
            Error::ProviderInit(format!("cannot read {}: {}", region_dir.display(), e))
        })?;

        Ok(Self {
            world_dir,
            region_dir,
            world_height,
            regions: HashMap::new(),
        })
    }

    /// Create an empty world directory and open it
    pub fn create(world_dir: impl AsRef<Path>, world_height: u32) -> Result<Self> {
        let world_dir = world_dir.as_ref();
        fs::create_dir_all(world_dir.join(REGION_DIR))?;
        let level_dat = world_dir.join(LEVEL_DAT);
        if !level_dat.exists() {
            fs::write(&level_dat, b"")?;
        }
        Self::open(world_dir, world_height)
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    pub fn region_dir(&self) -> &Path {
        &self.region_dir
    }

    pub fn world_height(&self) -> u32 {
        self.world_height
    }

    fn region_path(&self, region: (i32, i32)) -> PathBuf {
        self.region_dir.join(region_file_name(region.0, region.1, ANVIL_EXTENSION))
    }

    fn region(&mut self, region: (i32, i32), create: bool) -> Result<Option<&mut RegionFile>> {
        if !self.regions.contains_key(&region) {
            let path = self.region_path(region);
            if !create && !path.exists() {
                return Ok(None);
            }
            self.regions.insert(region, RegionFile::open(&path)?);
        }
        Ok(self.regions.get_mut(&region))
    }

    /// Load a chunk, `None` if it isn't stored.
    ///
    /// The chunk keeps the height it was saved with, which may differ from
    /// [`world_height`](Self::world_height).
    pub fn load_chunk(&mut self, x: i32, z: i32) -> Result<Option<Chunk>> {
        let pos = ChunkPos::new(x, z);
        let (lx, lz) = pos.local();

        let Some(region) = self.region(pos.region(), false)? else {
            return Ok(None);
        };
        let Some(payload) = region.read_chunk(lx, lz)? else {
            return Ok(None);
        };

        let chunk = deserialize_chunk(&payload)?;
        if chunk.pos() != pos {
            return Err(Error::FileFormat(format!(
                "slot for chunk ({}, {}) holds chunk ({}, {})",
                x, z, chunk.pos().x, chunk.pos().z
            )));
        }
        Ok(Some(chunk))
    }

    /// Write a chunk back to its region file
    pub fn save_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        let pos = chunk.pos();
        let (lx, lz) = pos.local();
        let payload = serialize_chunk(chunk)?;

        match self.region(pos.region(), true)? {
            Some(region) => region.write_chunk(lx, lz, &payload),
            None => Err(Error::FileFormat(format!(
                "no region file for chunk ({}, {})", pos.x, pos.z
            ))),
        }
    }

    /// Close every cached region file
    pub fn release_caches(&mut self) {
        self.regions.clear();
    }

    /// Number of region files currently held open
    pub fn open_region_count(&self) -> usize {
        self.regions.len()
    }
}
