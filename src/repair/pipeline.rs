//! The repair run: validate, scan region headers, remap chunk by chunk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::storage::chunk::{Chunk, ChunkPos, CHUNK_SIZE, SECTION_HEIGHT};
use crate::storage::provider::{AnvilProvider, ProviderKind, ANVIL_EXTENSION};
use crate::storage::region::{parse_region_file_name, RegionIndex};
use super::config::RepairConfig;
use super::fixer::BlockFixer;

/// `percentage` value of a run that completed every chunk
pub const FINISHED: i32 = -1;

/// Phase of a repair run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepairState {
    #[default]
    Idle,
    Validating,
    Scanning,
    Repairing,
    Done,
    Failed,
    Cancelled,
}

impl RepairState {
    /// Whether the run has stopped
    pub fn is_terminal(self) -> bool {
        matches!(self, RepairState::Done | RepairState::Failed | RepairState::Cancelled)
    }
}

/// Snapshot of a repair run, as seen by its owner
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepairStatus {
    pub state: RepairState,
    /// 0-100 while running, [`FINISHED`] once every chunk is done
    pub percentage: i32,
    /// Empty unless validation failed
    pub error: String,
    pub elapsed_secs: f64,
    /// Chunks repaired so far
    pub chunk_count: usize,
}

impl RepairStatus {
    /// True only for a run that went through every chunk
    pub fn is_finished(&self) -> bool {
        self.percentage == FINISHED
    }
}

/// Shared cancellation flag, polled between chunks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Run every non-air block below `world_height` through `fixer`.
///
/// Layers at or above `world_height` are left alone even when the chunk is
/// taller. Returns the number of blocks that changed.
pub fn remap_chunk(chunk: &mut Chunk, fixer: &dyn BlockFixer, world_height: u32) -> usize {
    let mut changed = 0;
    let top = (world_height.min(chunk.world_height())) as usize;

    for sy in 0..top.div_ceil(SECTION_HEIGHT) {
        // Missing sections are all air
        if !chunk.has_section(sy) {
            continue;
        }

        for y in sy * SECTION_HEIGHT..((sy + 1) * SECTION_HEIGHT).min(top) {
            for z in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let id = chunk.get_block_id(x, y, z);
                    if id == 0 {
                        continue;
                    }
                    let data = chunk.get_block_data(x, y, z);

                    let (new_id, new_data) = fixer.fix(id, data);
                    if (new_id, new_data) != (id, data) {
                        chunk.set_block_id(x, y, z, new_id);
                        chunk.set_block_data(x, y, z, new_data);
                        changed += 1;
                    }
                }
            }
        }
    }

    changed
}

/// List every stored chunk in a region directory by reading region headers.
///
/// Files are visited in name order. Unreadable or corrupt region files are
/// logged and skipped.
pub fn scan_region_dir(region_dir: &Path, extension: &str) -> Vec<ChunkPos> {
    let entries = match fs::read_dir(region_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {}", region_dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();

    let mut chunks = Vec::new();
    for path in files {
        let Some((region_x, region_z)) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_region_file_name)
        else {
            warn!("Skipping {}: not a region file name", path.display());
            continue;
        };

        let mut index = RegionIndex::new(&path, region_x, region_z);
        if let Err(e) = index.open() {
            warn!("Skipping region file {}: {}", path.display(), e);
            continue;
        }
        chunks.extend(index.chunks());
    }

    chunks
}

/// A repair run over one world directory
pub struct WorldRepair {
    world_dir: PathBuf,
    fixer: Arc<dyn BlockFixer>,
    config: RepairConfig,
}

impl WorldRepair {
    pub fn new(world_dir: impl AsRef<Path>, fixer: impl BlockFixer + 'static) -> Self {
        Self {
            world_dir: world_dir.as_ref().to_path_buf(),
            fixer: Arc::new(fixer),
            config: RepairConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    pub fn world_dir(&self) -> &Path {
        &self.world_dir
    }

    /// Run to completion on the current thread
    pub fn run(&self, cancel: &CancelToken) -> RepairStatus {
        let (progress, _rx) = watch::channel(RepairStatus::default());
        self.run_with_progress(cancel, &progress)
    }

    /// Run to completion, publishing a snapshot after every phase change and chunk
    pub fn run_with_progress(
        &self,
        cancel: &CancelToken,
        progress: &watch::Sender<RepairStatus>,
    ) -> RepairStatus {
        let mut status = RepairStatus {
            state: RepairState::Validating,
            ..RepairStatus::default()
        };
        progress.send_replace(status.clone());

        let mut provider = match self.validate() {
            Ok(provider) => provider,
            Err(e) => {
                error!("Cannot fix world {}: {}", self.world_dir.display(), e);
                status.state = RepairState::Failed;
                status.error = e.to_string();
                progress.send_replace(status.clone());
                return status;
            }
        };

        let start = Instant::now();
        status.state = RepairState::Scanning;
        progress.send_replace(status.clone());

        let chunks = scan_region_dir(provider.region_dir(), ANVIL_EXTENSION);
        let total = chunks.len();
        info!("Fixing {} chunks in {}", total, self.world_dir.display());

        status.state = RepairState::Repairing;
        progress.send_replace(status.clone());

        for (index, &pos) in chunks.iter().enumerate() {
            match self.repair_chunk(&mut provider, pos) {
                Ok(true) => status.chunk_count += 1,
                Ok(false) => debug!("Chunk ({}, {}) vanished before repair", pos.x, pos.z),
                Err(e) => warn!("Skipping chunk ({}, {}): {}", pos.x, pos.z, e),
            }

            status.percentage = ((index + 1) * 100 / total) as i32;
            status.elapsed_secs = start.elapsed().as_secs_f64();

            let interval = self.config.progress_log_interval;
            if interval > 0 && (index + 1) % interval == 0 {
                info!("{}/{} chunks fixed", index + 1, total);
            } else {
                debug!("{}/{} chunks fixed", index + 1, total);
            }

            if cancel.is_cancelled() {
                info!("World fix cancelled after {}/{} chunks", index + 1, total);
                status.state = RepairState::Cancelled;
                progress.send_replace(status.clone());
                return status;
            }
            progress.send_replace(status.clone());
        }

        status.state = RepairState::Done;
        status.percentage = FINISHED;
        status.elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "World fixed in {:.1}s, affected {} chunks",
            status.elapsed_secs, status.chunk_count
        );
        progress.send_replace(status.clone());
        status
    }

    /// Check the world directory and open its provider
    fn validate(&self) -> Result<AnvilProvider> {
        if !self.world_dir.is_dir() {
            return Err(Error::NotFound(self.world_dir.clone()));
        }

        let kind = ProviderKind::detect(&self.world_dir).ok_or(Error::UnknownProvider)?;
        if kind != ProviderKind::Anvil {
            return Err(Error::UnsupportedProvider(kind));
        }

        AnvilProvider::open(&self.world_dir, self.config.world_height).map_err(|e| match e {
            Error::ProviderInit(_) => e,
            other => Error::ProviderInit(other.to_string()),
        })
    }

    /// Load, remap and save one chunk. `Ok(false)` if it isn't stored.
    fn repair_chunk(&self, provider: &mut AnvilProvider, pos: ChunkPos) -> Result<bool> {
        let result = self.remap_stored_chunk(provider, pos);
        provider.release_caches();
        result
    }

    fn remap_stored_chunk(&self, provider: &mut AnvilProvider, pos: ChunkPos) -> Result<bool> {
        let Some(mut chunk) = provider.load_chunk(pos.x, pos.z)? else {
            return Ok(false);
        };

        let changed = remap_chunk(&mut chunk, self.fixer.as_ref(), provider.world_height());
        debug!("Chunk ({}, {}): {} blocks remapped", pos.x, pos.z, changed);

        provider.save_chunk(&chunk)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::region::{RegionFile, SECTOR_SIZE};
    use crate::storage::provider::{LEVEL_DAT, REGION_DIR};
    use tempfile::TempDir;

    const HEIGHT: u32 = 256;

    fn stone_to_granite(id: u16, data: u8) -> (u16, u8) {
        if id == 1 { (2, data) } else { (id, data) }
    }

    fn filled_chunk(x: i32, z: i32, id: u16) -> Chunk {
        let mut chunk = Chunk::new(ChunkPos::new(x, z), HEIGHT);
        for y in 0..HEIGHT as usize {
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    chunk.set_block_id(lx, y, lz, id);
                }
            }
        }
        chunk
    }

    /// World with chunks (0, 0) and (1, 0) full of stone
    fn stone_world() -> TempDir {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut provider = AnvilProvider::create(dir.path(), HEIGHT).unwrap();
        provider.save_chunk(&filled_chunk(0, 0, 1)).unwrap();
        provider.save_chunk(&filled_chunk(1, 0, 1)).unwrap();
        dir
    }

    fn all_blocks_are(provider: &mut AnvilProvider, x: i32, z: i32, id: u16) -> bool {
        let chunk = provider.load_chunk(x, z).unwrap().expect("chunk not found");
        (0..HEIGHT as usize).all(|y| {
            (0..CHUNK_SIZE).all(|lz| (0..CHUNK_SIZE).all(|lx| chunk.get_block_id(lx, y, lz) == id))
        })
    }

    #[test]
    fn test_remap_chunk_skips_air() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), HEIGHT);
        chunk.set_block_id(0, 0, 0, 1);
        chunk.set_block_id(5, 200, 5, 3);

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let counting = |id: u16, data: u8| {
            calls.fetch_add(1, Ordering::Relaxed);
            stone_to_granite(id, data)
        };

        assert_eq!(remap_chunk(&mut chunk, &counting, HEIGHT), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(chunk.get_block_id(0, 0, 0), 2);
        assert_eq!(chunk.get_block_id(5, 200, 5), 3);
    }

    #[test]
    fn test_remap_chunk_writes_data() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), HEIGHT);
        chunk.set_block_id(1, 1, 1, 35);
        chunk.set_block_data(1, 1, 1, 4);

        remap_chunk(&mut chunk, &|id: u16, data: u8| (id + 1, data + 1), HEIGHT);
        assert_eq!(chunk.get_block_id(1, 1, 1), 36);
        assert_eq!(chunk.get_block_data(1, 1, 1), 5);
    }

    #[test]
    fn test_remap_chunk_stops_at_world_height() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), HEIGHT);
        chunk.set_block_id(3, 5, 3, 1);
        chunk.set_block_id(3, 15, 3, 1);
        chunk.set_block_id(3, 16, 3, 1);
        chunk.set_block_id(3, 200, 3, 1);

        assert_eq!(remap_chunk(&mut chunk, &stone_to_granite, 16), 2);
        assert_eq!(chunk.get_block_id(3, 5, 3), 2);
        assert_eq!(chunk.get_block_id(3, 15, 3), 2);
        assert_eq!(chunk.get_block_id(3, 16, 3), 1);
        assert_eq!(chunk.get_block_id(3, 200, 3), 1);
    }

    #[test]
    fn test_scan_orders_and_skips_bad_regions() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let region_dir = dir.path();

        let mut region = RegionFile::open(region_dir.join("r.0.0.mca")).unwrap();
        region.write_chunk(2, 0, b"a").unwrap();
        region.write_chunk(0, 1, b"b").unwrap();
        let mut region = RegionFile::open(region_dir.join("r.-1.0.mca")).unwrap();
        region.write_chunk(31, 31, b"c").unwrap();

        fs::write(region_dir.join("r.5.5.mca"), [0u8; 16]).unwrap();
        // Chunk coordinates of this region overflow i32
        let mut far = RegionFile::open(region_dir.join("r.100000000.0.mca")).unwrap();
        far.write_chunk(0, 0, b"d").unwrap();
        fs::write(region_dir.join("notes.txt"), b"ignored").unwrap();
        fs::write(region_dir.join("r.1.1.mcr"), vec![0u8; 2 * SECTOR_SIZE]).unwrap();

        let chunks = scan_region_dir(region_dir, "mca");
        assert_eq!(chunks, vec![
            ChunkPos::new(-1, 31),
            ChunkPos::new(0, 1),
            ChunkPos::new(2, 0),
        ]);
    }

    #[test]
    fn test_end_to_end_repair() {
        let world = stone_world();

        let status = WorldRepair::new(world.path(), stone_to_granite).run(&CancelToken::new());

        assert_eq!(status.state, RepairState::Done);
        assert_eq!(status.error, "");
        assert_eq!(status.chunk_count, 2);
        assert_eq!(status.percentage, FINISHED);
        assert!(status.is_finished());

        let mut provider = AnvilProvider::open(world.path(), HEIGHT).unwrap();
        assert!(all_blocks_are(&mut provider, 0, 0, 2));
        assert!(all_blocks_are(&mut provider, 1, 0, 2));
    }

    #[test]
    fn test_cancel_after_first_chunk() {
        let world = stone_world();
        let cancel = CancelToken::new();

        // Request cancellation while the first chunk is being remapped
        let trigger = cancel.clone();
        let fixer = move |id: u16, data: u8| {
            trigger.cancel();
            stone_to_granite(id, data)
        };

        let status = WorldRepair::new(world.path(), fixer).run(&cancel);

        assert_eq!(status.state, RepairState::Cancelled);
        assert_eq!(status.chunk_count, 1);
        assert_eq!(status.percentage, 50);
        assert!(!status.is_finished());
        assert_eq!(status.error, "");

        let mut provider = AnvilProvider::open(world.path(), HEIGHT).unwrap();
        assert!(all_blocks_are(&mut provider, 0, 0, 2));
        assert!(all_blocks_are(&mut provider, 1, 0, 1));
    }

    #[test]
    fn test_missing_world() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let status = WorldRepair::new(dir.path().join("nope"), stone_to_granite)
            .run(&CancelToken::new());

        assert_eq!(status.state, RepairState::Failed);
        assert_eq!(status.error, "File not found");
        assert_eq!(status.chunk_count, 0);
        assert_eq!(status.percentage, 0);
    }

    #[test]
    fn test_unknown_provider() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let status = WorldRepair::new(dir.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.error, "Unknown provider");
    }

    #[test]
    fn test_unsupported_provider() {
        let dir = TempDir::new().expect("failed to create temp dir");
        fs::write(dir.path().join(LEVEL_DAT), b"").unwrap();
        fs::create_dir(dir.path().join("db")).unwrap();

        let status = WorldRepair::new(dir.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Failed);
        assert_eq!(status.error, "Fixing chunks is not supported for the LevelDB provider");
    }

    #[test]
    fn test_provider_init_error() {
        let dir = TempDir::new().expect("failed to create temp dir");
        // level.dat exists but is a directory
        fs::create_dir(dir.path().join(LEVEL_DAT)).unwrap();
        fs::create_dir(dir.path().join(REGION_DIR)).unwrap();

        let status = WorldRepair::new(dir.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Failed);
        assert!(status.error.starts_with("Error while loading provider: "));
    }

    #[test]
    fn test_config_height_limits_repair() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut provider = AnvilProvider::create(dir.path(), HEIGHT).unwrap();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), HEIGHT);
        chunk.set_block_id(0, 10, 0, 1);
        chunk.set_block_id(0, 200, 0, 1);
        provider.save_chunk(&chunk).unwrap();
        drop(provider);

        let config = RepairConfig { world_height: 16, ..RepairConfig::default() };
        let status = WorldRepair::new(dir.path(), stone_to_granite)
            .with_config(config)
            .run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Done);
        assert_eq!(status.chunk_count, 1);

        let mut provider = AnvilProvider::open(dir.path(), HEIGHT).unwrap();
        let chunk = provider.load_chunk(0, 0).unwrap().expect("chunk not found");
        assert_eq!(chunk.world_height(), HEIGHT);
        assert_eq!(chunk.get_block_id(0, 10, 0), 2);
        assert_eq!(chunk.get_block_id(0, 200, 0), 1);
    }

    #[test]
    fn test_undecodable_chunk_skipped() {
        let world = stone_world();
        {
            // Slot (2, 0) has a valid location but the payload isn't a chunk
            let mut region = RegionFile::open(world.path().join(REGION_DIR).join("r.0.0.mca")).unwrap();
            region.write_chunk(2, 0, b"junk").unwrap();
        }

        let status = WorldRepair::new(world.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Done);
        assert_eq!(status.error, "");
        assert_eq!(status.chunk_count, 2);
        assert_eq!(status.percentage, FINISHED);

        let mut provider = AnvilProvider::open(world.path(), HEIGHT).unwrap();
        assert!(all_blocks_are(&mut provider, 0, 0, 2));
        assert!(all_blocks_are(&mut provider, 1, 0, 2));
        assert!(provider.load_chunk(2, 0).is_err());
    }

    #[test]
    fn test_empty_world_finishes() {
        let dir = TempDir::new().expect("failed to create temp dir");
        AnvilProvider::create(dir.path(), HEIGHT).unwrap();

        let status = WorldRepair::new(dir.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Done);
        assert_eq!(status.chunk_count, 0);
        assert_eq!(status.percentage, FINISHED);
    }

    #[test]
    fn test_corrupt_region_skipped() {
        let world = stone_world();
        fs::write(world.path().join(REGION_DIR).join("r.3.3.mca"), [0u8; 100]).unwrap();

        let status = WorldRepair::new(world.path(), stone_to_granite).run(&CancelToken::new());
        assert_eq!(status.state, RepairState::Done);
        assert_eq!(status.chunk_count, 2);
    }

    #[test]
    fn test_progress_snapshots() {
        let world = stone_world();
        let (tx, rx) = watch::channel(RepairStatus::default());

        let status = WorldRepair::new(world.path(), stone_to_granite)
            .run_with_progress(&CancelToken::new(), &tx);

        assert_eq!(*rx.borrow(), status);
        assert!(rx.borrow().state.is_terminal());
    }
}
