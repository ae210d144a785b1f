//! Chunk payload serialization.
//!
//! Payloads are rkyv archives of [`ChunkData`]; only non-empty sections are
//! written. Compression happens one level up, in the region record.

use rkyv::{Archive, Deserialize, Serialize};
use rkyv::util::AlignedVec;

use crate::core::error::Error;
use crate::core::types::Result;
use super::chunk::{Chunk, ChunkPos, Section, MAX_WORLD_HEIGHT, SECTION_HEIGHT};

/// Serializable section
#[derive(Archive, Deserialize, Serialize)]
pub struct SectionData {
    pub y: u8,
    pub ids: Vec<u16>,
    pub data: Vec<u8>,
}

/// Serializable chunk column
#[derive(Archive, Deserialize, Serialize)]
pub struct ChunkData {
    pub x: i32,
    pub z: i32,
    pub height: u32,
    pub sections: Vec<SectionData>,
}

/// Serialize a chunk to bytes (uncompressed)
pub fn serialize_chunk(chunk: &Chunk) -> Result<Vec<u8>> {
    let sections = chunk
        .sections()
        .filter(|(_, section)| !section.is_empty())
        .map(|(sy, section)| {
            let y = u8::try_from(sy)
                .map_err(|_| Error::FileFormat(format!("section index {} does not fit a byte", sy)))?;
            Ok(SectionData {
                y,
                ids: section.ids().to_vec(),
                data: section.data().to_vec(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let data = ChunkData {
        x: chunk.pos().x,
        z: chunk.pos().z,
        height: chunk.world_height(),
        sections,
    };

    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&data)
        .map_err(|e| Error::FileFormat(e.to_string()))?;

    Ok(bytes.to_vec())
}

/// Deserialize a chunk from bytes (uncompressed)
pub fn deserialize_chunk(bytes: &[u8]) -> Result<Chunk> {
    // Archives must be read from aligned memory
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);

    let data = rkyv::from_bytes::<ChunkData, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::FileFormat(format!("invalid chunk payload: {}", e)))?;

    if data.height == 0 || data.height > MAX_WORLD_HEIGHT {
        return Err(Error::FileFormat(format!(
            "chunk height {} outside 1..={}",
            data.height, MAX_WORLD_HEIGHT
        )));
    }

    let mut chunk = Chunk::new(ChunkPos::new(data.x, data.z), data.height);
    for section in data.sections {
        let sy = section.y as usize;
        if sy * SECTION_HEIGHT >= chunk.world_height() as usize {
            return Err(Error::FileFormat(format!(
                "section {} above chunk height {}",
                sy,
                chunk.world_height()
            )));
        }
        let section = Section::from_raw(section.ids, section.data).ok_or_else(|| {
            Error::FileFormat(format!("section {} has wrong array sizes", sy))
        })?;
        chunk.set_section(sy, section);
    }

    Ok(chunk)
}
