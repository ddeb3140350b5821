//! Tiled storage of a square matrix.
//!
//! A matrix of dimension `n` is split into an `nt × nt` grid of square tiles of dimension `ts`,
//! with `n == nt * ts`. Each [`Tile`] owns its own contiguous row-major buffer, so that tiles can
//! be borrowed independently of their neighbors.
//!
//! The grid itself is stored block column by block column, so the tiles of a block column form a
//! contiguous run of [`TileGrid::tiles_mut`]. The schedulers split that slice into disjoint
//! mutable borrows without any locking.

mod grid;
mod tilemut;
mod tileown;
mod tileref;

pub use grid::TileGrid;
pub use tilemut::TileMut;
pub use tileown::Tile;
pub use tileref::TileRef;

/// Position of a tile in a [`TileGrid`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Block row index.
    pub row: usize,
    /// Block column index.
    pub col: usize,
}

impl TileId {
    /// Creates a tile position from its block row and block column.
    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl core::fmt::Display for TileId {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// This error signifies that a matrix cannot be split into tiles, because its dimension is not a
/// positive multiple of the tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSizeError {
    /// Dimension of the matrix.
    pub dim: usize,
    /// Requested tile size.
    pub tile_size: usize,
}

impl core::fmt::Display for TileSizeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "matrix dimension {} is not a positive multiple of the tile size {}",
            self.dim, self.tile_size,
        )
    }
}

impl std::error::Error for TileSizeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use reborrow::*;

    fn fill(mut dst: TileMut<'_>, value: f64) {
        for i in 0..dst.size() {
            dst.row_mut(i).fill(value);
        }
    }

    #[test]
    fn test_views() {
        let mut tile = Tile::from_fn(3, |i, j| (3 * i + j) as f64);
        assert_eq!(tile.row(1), [3.0, 4.0, 5.0]);

        let mut view = tile.as_mut();
        view.write(2, 0, -1.0);
        assert_eq!(view.rb().read(2, 0), -1.0);

        fill(view.rb_mut(), 7.0);
        let view = view.into_const();
        assert_eq!(view.as_slice(), [7.0; 9]);
        assert_eq!(view.rb().row(0), [7.0; 3]);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds() {
        let tile = Tile::zeros(2);
        tile.read(0, 2);
    }

    #[test]
    fn test_tile_id() {
        let id = TileId::new(3, 1);
        assert_eq!(id.to_string(), "(3, 1)");
        assert!(TileId::new(0, 2) < TileId::new(1, 0));
    }
}
