//! Region-file world storage: chunks, region headers and provider detection

pub mod chunk;
pub mod codec;
pub mod region;
pub mod provider;

pub use chunk::{
    Chunk, ChunkPos, Section,
    CHUNK_SIZE, DEFAULT_WORLD_HEIGHT, MAX_WORLD_HEIGHT, SECTION_HEIGHT,
};
pub use codec::{serialize_chunk, deserialize_chunk};
pub use region::{
    RegionFile, RegionIndex,
    parse_region_file_name, region_file_name, slot_index,
    REGION_WIDTH, SECTOR_SIZE,
};
pub use provider::{AnvilProvider, ProviderKind};
