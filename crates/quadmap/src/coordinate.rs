//! Quadtree tile addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Deepest level a [`TileCoordinate`] can address.
///
/// At this level a row or column index still fits in a `u32`.
pub const MAX_LEVEL: u8 = 31;

/// Position of a child tile inside its parent.
///
/// The discriminant is the child's index in [`TileCoordinate::children`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    /// All quadrants in child order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Column and row offset of this quadrant at the child level.
    #[must_use]
    pub fn offset(self) -> (u32, u32) {
        match self {
            Quadrant::NorthWest => (0, 0),
            Quadrant::NorthEast => (1, 0),
            Quadrant::SouthWest => (0, 1),
            Quadrant::SouthEast => (1, 1),
        }
    }

    fn from_offset(dx: u32, dy: u32) -> Self {
        match (dx & 1, dy & 1) {
            (0, 0) => Quadrant::NorthWest,
            (1, 0) => Quadrant::NorthEast,
            (0, _) => Quadrant::SouthWest,
            _ => Quadrant::SouthEast,
        }
    }
}

/// Address of one tile: zoom level plus column and row.
///
/// Columns grow eastwards and rows southwards. The value is immutable once
/// built and is used as the request key for tile content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    level: u8,
    x: u32,
    y: u32,
}

impl TileCoordinate {
    /// The level-0 tile covering the whole map.
    pub const ROOT: TileCoordinate = TileCoordinate {
        level: 0,
        x: 0,
        y: 0,
    };

    /// Build a coordinate, checking that it lies inside the quadtree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCoordinate`] when `level` exceeds
    /// [`MAX_LEVEL`] or `x`/`y` are outside `[0, 2^level)`.
    pub fn new(level: u8, x: u32, y: u32) -> Result<Self> {
        if level > MAX_LEVEL || x >= Self::tiles_per_axis(level) || y >= Self::tiles_per_axis(level)
        {
            return Err(Error::MalformedCoordinate { level, x, y });
        }
        Ok(Self { level, x, y })
    }

    /// Number of tiles along one axis at `level` (levels above [`MAX_LEVEL`] saturate).
    #[must_use]
    pub fn tiles_per_axis(level: u8) -> u32 {
        1u32 << level.min(MAX_LEVEL)
    }

    /// Zoom level (0 is the root).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Column index.
    #[must_use]
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row index.
    #[must_use]
    pub fn y(&self) -> u32 {
        self.y
    }

    /// The four children, in [`Quadrant`] order, or `None` at [`MAX_LEVEL`].
    #[must_use]
    pub fn children(&self) -> Option<[TileCoordinate; 4]> {
        if self.level >= MAX_LEVEL {
            return None;
        }
        Some(Quadrant::ALL.map(|q| self.child_unchecked(q)))
    }

    /// The child in quadrant `q`, or `None` at [`MAX_LEVEL`].
    #[must_use]
    pub fn child(&self, q: Quadrant) -> Option<TileCoordinate> {
        (self.level < MAX_LEVEL).then(|| self.child_unchecked(q))
    }

    fn child_unchecked(&self, q: Quadrant) -> TileCoordinate {
        let (dx, dy) = q.offset();
        TileCoordinate {
            level: self.level + 1,
            x: self.x * 2 + dx,
            y: self.y * 2 + dy,
        }
    }

    /// The parent tile, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<TileCoordinate> {
        (self.level > 0).then(|| TileCoordinate {
            level: self.level - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Which quadrant of its parent this tile occupies, or `None` for the root.
    #[must_use]
    pub fn quadrant(&self) -> Option<Quadrant> {
        (self.level > 0).then(|| Quadrant::from_offset(self.x, self.y))
    }

    /// The ancestor at `level`, or `None` if `level` is deeper than this tile.
    #[must_use]
    pub fn ancestor_at(&self, level: u8) -> Option<TileCoordinate> {
        let shift = self.level.checked_sub(level)?;
        Some(TileCoordinate {
            level,
            x: self.x >> shift,
            y: self.y >> shift,
        })
    }

    /// Whether `other` lies inside this tile (a tile contains itself).
    #[must_use]
    pub fn contains(&self, other: &TileCoordinate) -> bool {
        other.ancestor_at(self.level) == Some(*self)
    }

    /// Normalized `(u_min, v_min, u_max, v_max)` footprint, with `v` running
    /// north to south.
    #[must_use]
    pub fn normalized_bounds(&self) -> (f64, f64, f64, f64) {
        let n = f64::from(Self::tiles_per_axis(self.level));
        let (x, y) = (f64::from(self.x), f64::from(self.y));
        (x / n, y / n, (x + 1.0) / n, (y + 1.0) / n)
    }

    /// Whether the two tiles share an edge of positive length.
    ///
    /// Works across levels; overlapping tiles are not adjacent.
    #[must_use]
    pub fn shares_edge_with(&self, other: &TileCoordinate) -> bool {
        let level = self.level.max(other.level);
        let a = self.span_at(level);
        let b = other.span_at(level);

        let touch_x = a.2 == b.0 || b.2 == a.0;
        let touch_y = a.3 == b.1 || b.3 == a.1;
        let overlap_x = a.0 < b.2 && b.0 < a.2;
        let overlap_y = a.1 < b.3 && b.1 < a.3;
        (touch_x && overlap_y) || (touch_y && overlap_x)
    }

    /// Integer footprint `(x0, y0, x1, y1)` expressed in tiles of a deeper `level`.
    fn span_at(&self, level: u8) -> (u64, u64, u64, u64) {
        let shift = level - self.level;
        let (x, y) = (u64::from(self.x) << shift, u64::from(self.y) << shift);
        let size = 1u64 << shift;
        (x, y, x + size, y + size)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}
