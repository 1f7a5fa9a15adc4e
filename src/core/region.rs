//! Axis-aligned boxes over raster coordinates.
//!
//! A [`Region`] is an index (signed) plus a size (unsigned) per axis. Axis 0 is
//! the fastest-varying one (columns), the last axis the slowest (rows), so
//! "row-major" splitting cuts along the last axis first.
//!
//! All operations are pure. The only way to build a malformed region is from
//! signed sizes, which [`Region::try_new`] rejects with
//! [`RegionError::NegativeSize`].

use crate::core::error::RegionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of axes of every region handled by the engine.
pub const DIMENSION: usize = 2;

/// An N-dimensional box: `index` is the first pixel, `size` the extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Index of the first pixel along each axis.
    pub index: [i64; DIMENSION],
    /// Number of pixels along each axis.
    pub size: [u64; DIMENSION],
}

impl Region {
    /// Create a region from an index and a size.
    pub fn new(index: [i64; DIMENSION], size: [u64; DIMENSION]) -> Self {
        Self { index, size }
    }

    /// Create a region anchored at the origin.
    pub fn from_size(size: [u64; DIMENSION]) -> Self {
        Self {
            index: [0; DIMENSION],
            size,
        }
    }

    /// Create a region from signed sizes, rejecting negative extents.
    pub fn try_new(index: [i64; DIMENSION], size: [i64; DIMENSION]) -> Result<Self, RegionError> {
        let mut checked = [0u64; DIMENSION];
        for axis in 0..DIMENSION {
            if size[axis] < 0 {
                return Err(RegionError::NegativeSize {
                    axis,
                    size: size[axis],
                });
            }
            checked[axis] = size[axis] as u64;
        }
        Ok(Self::new(index, checked))
    }

    /// The empty region at the origin.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extent along axis 0.
    pub fn width(&self) -> u64 {
        self.size[0]
    }

    /// Extent along axis 1.
    pub fn height(&self) -> u64 {
        self.size[1]
    }

    /// Exclusive upper bound along `axis`.
    pub fn upper(&self, axis: usize) -> i64 {
        self.index[axis] + self.size[axis] as i64
    }

    /// Number of pixels covered.
    pub fn pixel_count(&self) -> u64 {
        self.size.iter().product()
    }

    /// Whether the region covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Intersection of two regions, `None` when they do not overlap.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let mut index = [0i64; DIMENSION];
        let mut size = [0u64; DIMENSION];
        for axis in 0..DIMENSION {
            let lo = self.index[axis].max(other.index[axis]);
            let hi = self.upper(axis).min(other.upper(axis));
            if hi <= lo {
                return None;
            }
            index[axis] = lo;
            size[axis] = (hi - lo) as u64;
        }
        Some(Region::new(index, size))
    }

    /// Crop this region to `bounds`.
    ///
    /// Fails when no pixel of the region lies inside `bounds`.
    pub fn crop(&self, bounds: &Region) -> Result<Region, RegionError> {
        self.intersect(bounds).ok_or(RegionError::OutsideBounds {
            region: *self,
            bounds: *bounds,
        })
    }

    /// Whether every pixel of `other` lies inside this region.
    ///
    /// An empty region is contained in anything.
    pub fn contains(&self, other: &Region) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..DIMENSION).all(|axis| {
            other.index[axis] >= self.index[axis] && other.upper(axis) <= self.upper(axis)
        })
    }

    /// Whether a pixel index lies inside this region.
    pub fn contains_index(&self, index: [i64; DIMENSION]) -> bool {
        (0..DIMENSION).all(|axis| index[axis] >= self.index[axis] && index[axis] < self.upper(axis))
    }

    /// Smallest region covering both operands. Empty operands are ignored.
    pub fn union(&self, other: &Region) -> Region {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        let mut index = [0i64; DIMENSION];
        let mut size = [0u64; DIMENSION];
        for axis in 0..DIMENSION {
            let lo = self.index[axis].min(other.index[axis]);
            let hi = self.upper(axis).max(other.upper(axis));
            index[axis] = lo;
            size[axis] = (hi - lo) as u64;
        }
        Region::new(index, size)
    }

    /// Grow the region by `radius` pixels on both sides of every axis.
    pub fn padded(&self, radius: [u64; DIMENSION]) -> Region {
        let mut padded = *self;
        for axis in 0..DIMENSION {
            padded.index[axis] -= radius[axis] as i64;
            padded.size[axis] += 2 * radius[axis];
        }
        padded
    }

    /// Translate the region by `delta`.
    pub fn shifted(&self, delta: [i64; DIMENSION]) -> Region {
        let mut shifted = *self;
        for axis in 0..DIMENSION {
            shifted.index[axis] += delta[axis];
        }
        shifted
    }

    /// Row-major linear offset (in pixels) of `index` inside this region.
    pub fn linear_offset(&self, index: [i64; DIMENSION]) -> Option<usize> {
        if !self.contains_index(index) {
            return None;
        }
        let mut offset = 0u64;
        let mut stride = 1u64;
        for axis in 0..DIMENSION {
            offset += (index[axis] - self.index[axis]) as u64 * stride;
            stride *= self.size[axis];
        }
        Some(offset as usize)
    }

    /// Split into at most `pieces` regions along the slowest-varying axis.
    ///
    /// Axes of extent 1 are skipped. Every piece but the last has
    /// `ceil(extent / pieces)` lines; the last one takes what remains, so fewer
    /// than `pieces` regions may come back. `pieces == 0` yields the region
    /// itself.
    pub fn split_row_major(&self, pieces: usize) -> Vec<Region> {
        if pieces <= 1 || self.is_empty() {
            return vec![*self];
        }

        let mut axis = DIMENSION - 1;
        while self.size[axis] == 1 {
            if axis == 0 {
                return vec![*self];
            }
            axis -= 1;
        }

        let range = self.size[axis];
        let per_piece = range.div_ceil(pieces as u64);
        let used = range.div_ceil(per_piece);

        (0..used)
            .map(|i| {
                let mut piece = *self;
                piece.index[axis] = self.index[axis] + (i * per_piece) as i64;
                piece.size[axis] = if i == used - 1 {
                    range - i * per_piece
                } else {
                    per_piece
                };
                piece
            })
            .collect()
    }

    /// Strips of `lines` rows, last strip truncated.
    pub fn strips(&self, lines: u64) -> Vec<Region> {
        self.tiles([self.width().max(1), lines])
    }

    /// Tiles of `tile` pixels in row-major order, edge tiles cropped.
    pub fn tiles(&self, tile: [u64; DIMENSION]) -> Vec<Region> {
        if self.is_empty() || tile.iter().any(|&t| t == 0) {
            return vec![*self];
        }

        let mut tiles = Vec::new();
        let mut y = 0u64;
        while y < self.height() {
            let h = tile[1].min(self.height() - y);
            let mut x = 0u64;
            while x < self.width() {
                let w = tile[0].min(self.width() - x);
                tiles.push(Region::new(
                    [self.index[0] + x as i64, self.index[1] + y as i64],
                    [w, h],
                ));
                x += tile[0];
            }
            y += tile[1];
        }
        tiles
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {} | {}x{}]",
            self.index[0], self.index[1], self.size[0], self.size[1]
        )
    }
}
