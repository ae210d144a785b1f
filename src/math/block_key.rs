//! Reversible packing of block coordinates into a single `u64` key.
//!
//! Layout (most significant bit first): `x:26 | y:12 | z:26`, each field
//! stored in two's complement. This covers x/z in `[-2^25, 2^25)` and
//! y in `[-2^11, 2^11)`, which is wider than any region-file world.

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};

const XZ_BITS: u32 = 26;
const Y_BITS: u32 = 12;

const XZ_MASK: u64 = (1 << XZ_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;

const X_SHIFT: u32 = Y_BITS + XZ_BITS;
const Y_SHIFT: u32 = XZ_BITS;

/// Smallest x/z coordinate that can be packed
pub const MIN_XZ: i32 = -(1 << (XZ_BITS - 1));
/// Largest x/z coordinate that can be packed
pub const MAX_XZ: i32 = (1 << (XZ_BITS - 1)) - 1;
/// Smallest y coordinate that can be packed
pub const MIN_Y: i32 = -(1 << (Y_BITS - 1));
/// Largest y coordinate that can be packed
pub const MAX_Y: i32 = (1 << (Y_BITS - 1)) - 1;

/// A block coordinate packed into one scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(u64);

impl BlockKey {
    /// Check whether a coordinate can be packed
    pub fn in_range(x: i32, y: i32, z: i32) -> bool {
        (MIN_XZ..=MAX_XZ).contains(&x)
            && (MIN_Y..=MAX_Y).contains(&y)
            && (MIN_XZ..=MAX_XZ).contains(&z)
    }

    /// Pack a coordinate, rejecting anything outside the key domain
    pub fn pack(x: i32, y: i32, z: i32) -> Result<Self> {
        if !Self::in_range(x, y, z) {
            return Err(Error::CoordinateOutOfRange { x, y, z });
        }

        Ok(Self(
            ((x as u64 & XZ_MASK) << X_SHIFT)
                | ((y as u64 & Y_MASK) << Y_SHIFT)
                | (z as u64 & XZ_MASK),
        ))
    }

    /// Pack a vector coordinate
    pub fn from_ivec3(pos: IVec3) -> Result<Self> {
        Self::pack(pos.x, pos.y, pos.z)
    }

    /// Unpack back to `(x, y, z)`
    pub fn unpack(self) -> (i32, i32, i32) {
        // Shift each field to the top, then sign-extend back down.
        let x = (self.0 as i64) >> X_SHIFT;
        let y = ((self.0 << (64 - X_SHIFT)) as i64) >> (64 - Y_BITS);
        let z = ((self.0 << (64 - XZ_BITS)) as i64) >> (64 - XZ_BITS);
        (x as i32, y as i32, z as i32)
    }

    /// Unpack into a vector
    pub fn to_ivec3(self) -> IVec3 {
        let (x, y, z) = self.unpack();
        IVec3::new(x, y, z)
    }

    /// Raw packed value
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Wrap a raw value produced by [`BlockKey::raw`]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}
