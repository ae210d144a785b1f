//! Packed block values and decoded edit records.

use crate::core::types::IVec3;

/// Mask for the auxiliary data stored in the low bits of a [`BlockValue`]
pub const DATA_MASK: u8 = 0x0f;

const DATA_BITS: u32 = 4;

/// A `(block id, block data)` pair packed as `id << 4 | data`.
///
/// Only the low four bits of the data survive packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockValue(u32);

impl BlockValue {
    pub const AIR: Self = Self(0);

    pub fn new(id: u16, data: u8) -> Self {
        Self(((id as u32) << DATA_BITS) | (data & DATA_MASK) as u32)
    }

    pub fn id(self) -> u16 {
        (self.0 >> DATA_BITS) as u16
    }

    pub fn data(self) -> u8 {
        (self.0 as u8) & DATA_MASK
    }

    pub fn is_air(self) -> bool {
        self.id() == 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// One decoded edit: a block value at a world coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEdit {
    pub pos: IVec3,
    pub id: u16,
    pub data: u8,
}

impl BlockEdit {
    pub fn new(x: i32, y: i32, z: i32, id: u16, data: u8) -> Self {
        Self {
            pos: IVec3::new(x, y, z),
            id,
            data,
        }
    }

    pub fn value(&self) -> BlockValue {
        BlockValue::new(self.id, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let value = BlockValue::new(35, 14);
        assert_eq!(value.raw(), 35 << 4 | 14);
        assert_eq!(value.id(), 35);
        assert_eq!(value.data(), 14);
    }

    #[test]
    fn test_data_truncated_to_nibble() {
        let value = BlockValue::new(1, 0x1f);
        assert_eq!(value.data(), 0x0f);
        assert_eq!(value.id(), 1);
    }

    #[test]
    fn test_air() {
        assert!(BlockValue::AIR.is_air());
        assert!(BlockValue::new(0, 3).is_air());
        assert!(!BlockValue::new(u16::MAX, 0).is_air());
        assert_eq!(BlockValue::new(u16::MAX, 0).id(), u16::MAX);
    }
}
