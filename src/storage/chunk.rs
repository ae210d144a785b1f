//! In-memory chunk columns split into 16-high sections

use crate::edit::buffer::BlockSink;

/// Chunk footprint in blocks along x and z
pub const CHUNK_SIZE: usize = 16;
/// Height of one section in blocks
pub const SECTION_HEIGHT: usize = 16;
/// Blocks per section
pub const SECTION_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * SECTION_HEIGHT;
/// Height used for worlds that don't say otherwise
pub const DEFAULT_WORLD_HEIGHT: u32 = 256;
/// Tallest supported column; section indices fit in a `u8`
pub const MAX_WORLD_HEIGHT: u32 = 256 * SECTION_HEIGHT as u32;

/// Chunk column coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing this chunk
    pub fn region(&self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }

    /// Position inside its region, both in `0..32`
    pub fn local(&self) -> (usize, usize) {
        ((self.x & 31) as usize, (self.z & 31) as usize)
    }
}

/// 16x16x16 block section with nibble-packed data
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    ids: Vec<u16>,
    data: Vec<u8>,
}

impl Default for Section {
    fn default() -> Self {
        Self {
            ids: vec![0; SECTION_VOLUME],
            data: vec![0; SECTION_VOLUME / 2],
        }
    }
}

impl Section {
    /// Build from raw arrays, `None` if the lengths are wrong
    pub fn from_raw(ids: Vec<u16>, data: Vec<u8>) -> Option<Self> {
        if ids.len() != SECTION_VOLUME || data.len() != SECTION_VOLUME / 2 {
            return None;
        }
        Some(Self { ids, data })
    }

    #[inline]
    fn index(x: usize, y: usize, z: usize) -> usize {
        (y << 8) | (z << 4) | x
    }

    pub fn block_id(&self, x: usize, y: usize, z: usize) -> u16 {
        self.ids[Self::index(x, y, z)]
    }

    pub fn set_block_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
        self.ids[Self::index(x, y, z)] = id;
    }

    pub fn block_data(&self, x: usize, y: usize, z: usize) -> u8 {
        let i = Self::index(x, y, z);
        let byte = self.data[i >> 1];
        if i & 1 == 0 { byte & 0x0f } else { byte >> 4 }
    }

    pub fn set_block_data(&mut self, x: usize, y: usize, z: usize, data: u8) {
        let i = Self::index(x, y, z);
        let byte = &mut self.data[i >> 1];
        if i & 1 == 0 {
            *byte = (*byte & 0xf0) | (data & 0x0f);
        } else {
            *byte = (*byte & 0x0f) | ((data & 0x0f) << 4);
        }
    }

    /// True when every block is air
    pub fn is_empty(&self) -> bool {
        self.ids.iter().all(|&id| id == 0)
    }

    pub fn ids(&self) -> &[u16] {
        &self.ids
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A 16 x height x 16 column of blocks
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pos: ChunkPos,
    height: u32,
    sections: Vec<Option<Section>>,
}

impl Chunk {
    /// Create an all-air chunk. `height` is rounded up to whole sections.
    pub fn new(pos: ChunkPos, height: u32) -> Self {
        let count = (height as usize).div_ceil(SECTION_HEIGHT);
        Self {
            pos,
            height: (count * SECTION_HEIGHT) as u32,
            sections: vec![None; count],
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Number of block layers in the column
    pub fn world_height(&self) -> u32 {
        self.height
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Whether section `sy` holds any stored blocks
    pub fn has_section(&self, sy: usize) -> bool {
        matches!(self.sections.get(sy), Some(Some(_)))
    }

    pub fn section(&self, sy: usize) -> Option<&Section> {
        self.sections.get(sy)?.as_ref()
    }

    /// Install a section, replacing whatever was at `sy`
    pub fn set_section(&mut self, sy: usize, section: Section) {
        if let Some(slot) = self.sections.get_mut(sy) {
            *slot = Some(section);
        }
    }

    /// Present sections with their index
    pub fn sections(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .filter_map(|(sy, s)| s.as_ref().map(|s| (sy, s)))
    }

    fn in_bounds(&self, x: usize, y: usize, z: usize) -> bool {
        x < CHUNK_SIZE && z < CHUNK_SIZE && y < self.height as usize
    }

    pub fn get_block_id(&self, x: usize, y: usize, z: usize) -> u16 {
        if !self.in_bounds(x, y, z) {
            return 0;
        }
        self.section(y / SECTION_HEIGHT)
            .map_or(0, |s| s.block_id(x, y % SECTION_HEIGHT, z))
    }

    pub fn get_block_data(&self, x: usize, y: usize, z: usize) -> u8 {
        if !self.in_bounds(x, y, z) {
            return 0;
        }
        self.section(y / SECTION_HEIGHT)
            .map_or(0, |s| s.block_data(x, y % SECTION_HEIGHT, z))
    }

    /// Set a block id. Writing air into a missing section is a no-op.
    pub fn set_block_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        if let Some(section) = self.section_for_write(y / SECTION_HEIGHT, id != 0) {
            section.set_block_id(x, y % SECTION_HEIGHT, z, id);
        }
    }

    pub fn set_block_data(&mut self, x: usize, y: usize, z: usize, data: u8) {
        if !self.in_bounds(x, y, z) {
            return;
        }
        if let Some(section) = self.section_for_write(y / SECTION_HEIGHT, data != 0) {
            section.set_block_data(x, y % SECTION_HEIGHT, z, data);
        }
    }

    fn section_for_write(&mut self, sy: usize, create: bool) -> Option<&mut Section> {
        let slot = self.sections.get_mut(sy)?;
        if slot.is_none() && create {
            *slot = Some(Section::default());
        }
        slot.as_mut()
    }

    /// Drop sections that only contain air
    pub fn prune_empty_sections(&mut self) {
        for slot in &mut self.sections {
            if slot.as_ref().is_some_and(Section::is_empty) {
                *slot = None;
            }
        }
    }
}

impl BlockSink for Chunk {
    /// Accepts absolute world coordinates inside this column
    fn set_block(&mut self, x: i32, y: i32, z: i32, id: u16, data: u8) -> bool {
        let lx = x - self.pos.x * CHUNK_SIZE as i32;
        let lz = z - self.pos.z * CHUNK_SIZE as i32;
        if !(0..CHUNK_SIZE as i32).contains(&lx)
            || !(0..CHUNK_SIZE as i32).contains(&lz)
            || !(0..self.height as i32).contains(&y)
        {
            return false;
        }

        let (lx, y, lz) = (lx as usize, y as usize, lz as usize);
        self.set_block_id(lx, y, lz, id);
        self.set_block_data(lx, y, lz, data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_pos_region() {
        assert_eq!(ChunkPos::new(0, 0).region(), (0, 0));
        assert_eq!(ChunkPos::new(33, -1).region(), (1, -1));
        assert_eq!(ChunkPos::new(33, -1).local(), (1, 31));
        assert_eq!(ChunkPos::new(-32, -33).region(), (-1, -2));
    }

    #[test]
    fn test_new_chunk_is_air() {
        let chunk = Chunk::new(ChunkPos::new(0, 0), DEFAULT_WORLD_HEIGHT);
        assert_eq!(chunk.world_height(), 256);
        assert_eq!(chunk.section_count(), 16);
        assert_eq!(chunk.get_block_id(3, 100, 3), 0);
        assert_eq!(chunk.sections().count(), 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut chunk = Chunk::new(ChunkPos::new(2, -1), 256);
        chunk.set_block_id(1, 70, 15, 35);
        chunk.set_block_data(1, 70, 15, 14);
        chunk.set_block_data(0, 70, 15, 3);

        assert_eq!(chunk.get_block_id(1, 70, 15), 35);
        assert_eq!(chunk.get_block_data(1, 70, 15), 14);
        assert_eq!(chunk.get_block_data(0, 70, 15), 3);
        assert!(chunk.has_section(4));
        assert!(!chunk.has_section(3));
    }

    #[test]
    fn test_air_write_does_not_allocate() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 256);
        chunk.set_block_id(0, 0, 0, 0);
        chunk.set_block_data(0, 0, 0, 0);
        assert_eq!(chunk.sections().count(), 0);
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 32);
        chunk.set_block_id(16, 0, 0, 1);
        chunk.set_block_id(0, 32, 0, 1);
        assert_eq!(chunk.get_block_id(0, 32, 0), 0);
        assert_eq!(chunk.sections().count(), 0);
    }

    #[test]
    fn test_prune_empty_sections() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        chunk.set_block_id(0, 20, 0, 5);
        chunk.set_block_id(0, 20, 0, 0);
        assert!(chunk.has_section(1));
        chunk.prune_empty_sections();
        assert!(!chunk.has_section(1));
    }

    #[test]
    fn test_block_sink_uses_world_coords() {
        let mut chunk = Chunk::new(ChunkPos::new(-1, 2), 256);
        assert!(chunk.set_block(-16, 64, 32, 7, 1));
        assert!(!chunk.set_block(0, 64, 32, 7, 1));
        assert!(!chunk.set_block(-16, 300, 32, 7, 1));

        assert_eq!(chunk.get_block_id(0, 64, 0), 7);
        assert_eq!(chunk.get_block_data(0, 64, 0), 1);
    }
}
