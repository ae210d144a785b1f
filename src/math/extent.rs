//! Integer bounding box over block coordinates

use crate::core::types::IVec3;

/// Inclusive axis-aligned box of block coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockExtent {
    pub min: IVec3,
    pub max: IVec3,
}

impl BlockExtent {
    /// Create extent from min and max corners (inclusive)
    pub fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    /// Extent covering a single block
    pub fn from_point(p: IVec3) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest extent covering every point, `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = IVec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let mut extent = Self::from_point(points.next()?);
        for p in points {
            extent.expand(p);
        }
        Some(extent)
    }

    /// Grow to include point
    pub fn expand(&mut self, p: IVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Number of blocks along each axis
    pub fn size(&self) -> IVec3 {
        self.max - self.min + IVec3::ONE
    }

    /// Total block count of the box
    pub fn volume(&self) -> u64 {
        let s = self.size();
        s.x as u64 * s.y as u64 * s.z as u64
    }

    /// Check if point is inside (inclusive)
    pub fn contains(&self, p: IVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}
