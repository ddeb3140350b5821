use super::{Tile, TileMut, TileRef, TileSizeError};
use crate::assert;

/// Square matrix split into an `nt × nt` grid of `ts × ts` tiles.
///
/// Tiles are stored in block-column-major order, the tile at block row `row` and block column
/// `col` being at index `col * nt + row`.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    tiles: Vec<Tile>,
    dim: usize,
    tile_size: usize,
    n_tiles: usize,
}

impl TileGrid {
    /// Returns the number of tiles along each dimension of a grid holding a matrix of dimension
    /// `dim` with tiles of dimension `tile_size`, without allocating it.
    ///
    /// Fails if `dim` is not a positive multiple of `tile_size`.
    #[inline]
    pub fn n_tiles_for(dim: usize, tile_size: usize) -> Result<usize, TileSizeError> {
        if dim == 0 || tile_size == 0 || dim % tile_size != 0 {
            Err(TileSizeError { dim, tile_size })
        } else {
            Ok(dim / tile_size)
        }
    }

    /// Returns a grid of zero tiles for a matrix of dimension `dim`.
    ///
    /// Fails if `dim` is not a positive multiple of `tile_size`.
    pub fn new(dim: usize, tile_size: usize) -> Result<Self, TileSizeError> {
        let n_tiles = Self::n_tiles_for(dim, tile_size)?;
        let mut tiles = Vec::with_capacity(n_tiles * n_tiles);
        tiles.resize_with(n_tiles * n_tiles, || Tile::zeros(tile_size));
        Ok(Self {
            tiles,
            dim,
            tile_size,
            n_tiles,
        })
    }

    /// Splits the row-major matrix `flat` of dimension `dim` into tiles of dimension
    /// `tile_size`, each tile receiving a copy of its region of the matrix.
    ///
    /// Fails if `dim` is not a positive multiple of `tile_size`.
    ///
    /// # Panics
    /// Panics if `flat.len() != dim * dim`.
    #[track_caller]
    pub fn from_flat(flat: &[f64], dim: usize, tile_size: usize) -> Result<Self, TileSizeError> {
        let mut grid = Self::new(dim, tile_size)?;
        grid.copy_from_flat(flat);
        Ok(grid)
    }

    /// Copies the row-major matrix `flat` into the existing tiles, without reallocating them.
    ///
    /// # Panics
    /// Panics if `flat.len() != self.dim() * self.dim()`.
    #[track_caller]
    pub fn copy_from_flat(&mut self, flat: &[f64]) {
        assert!(flat.len() == self.dim * self.dim);
        let (n, ts, nt) = (self.dim, self.tile_size, self.n_tiles);

        for (idx, tile) in self.tiles.iter_mut().enumerate() {
            let (col, row) = (idx / nt, idx % nt);
            for i in 0..ts {
                let src = &flat[(row * ts + i) * n + col * ts..][..ts];
                tile.row_mut(i).copy_from_slice(src);
            }
        }
    }

    /// Writes the content of every tile back into the row-major matrix `flat`.
    ///
    /// # Panics
    /// Panics if `flat.len() != self.dim() * self.dim()`.
    #[track_caller]
    pub fn copy_to_flat(&self, flat: &mut [f64]) {
        assert!(flat.len() == self.dim * self.dim);
        let (n, ts, nt) = (self.dim, self.tile_size, self.n_tiles);

        for (idx, tile) in self.tiles.iter().enumerate() {
            let (col, row) = (idx / nt, idx % nt);
            for i in 0..ts {
                flat[(row * ts + i) * n + col * ts..][..ts].copy_from_slice(tile.row(i));
            }
        }
    }

    /// Returns the row-major matrix held by the tiles.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut flat = vec![0.0; self.dim * self.dim];
        self.copy_to_flat(&mut flat);
        flat
    }

    /// Returns the dimension of the full matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the dimension of each tile.
    #[inline]
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Returns the number of tiles along each dimension of the grid.
    #[inline]
    pub fn n_tiles(&self) -> usize {
        self.n_tiles
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        assert!(all(row < self.n_tiles, col < self.n_tiles));
        col * self.n_tiles + row
    }

    /// Returns a view over the tile at the given position.
    #[track_caller]
    #[inline]
    pub fn tile(&self, row: usize, col: usize) -> TileRef<'_> {
        self.tiles[self.index(row, col)].as_ref()
    }

    /// Returns a mutable view over the tile at the given position.
    #[track_caller]
    #[inline]
    pub fn tile_mut(&mut self, row: usize, col: usize) -> TileMut<'_> {
        let idx = self.index(row, col);
        self.tiles[idx].as_mut()
    }

    /// Returns every tile, in block-column-major order.
    #[inline]
    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    fn matrix(n: usize) -> Vec<f64> {
        (0..n * n).map(|idx| idx as f64 + 0.5).collect()
    }

    #[test]
    fn test_roundtrip() {
        for (n, ts) in [(1, 1), (4, 1), (4, 2), (4, 4), (12, 3), (12, 4), (64, 16)] {
            let a = matrix(n);
            let grid = TileGrid::from_flat(&a, n, ts).unwrap();
            assert_eq!(grid.n_tiles(), n / ts);
            assert_eq!(grid.to_flat(), a);
        }
    }

    #[test]
    fn test_tile_addressing() {
        let (n, ts) = (12, 4);
        let a = matrix(n);
        let grid = TileGrid::from_flat(&a, n, ts).unwrap();

        for row in 0..3 {
            for col in 0..3 {
                let tile = grid.tile(row, col);
                for i in 0..ts {
                    for j in 0..ts {
                        assert_eq!(tile.read(i, j), a[(row * ts + i) * n + col * ts + j]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_reset_reuses_tiles() {
        let (n, ts) = (8, 4);
        let a = matrix(n);
        let mut grid = TileGrid::from_flat(&a, n, ts).unwrap();
        let ptr = grid.tile(1, 0).as_slice().as_ptr();

        grid.tile_mut(1, 0).write(0, 0, -1.0);
        assert_ne!(grid.to_flat(), a);

        grid.copy_from_flat(&a);
        assert_eq!(grid.to_flat(), a);
        assert_eq!(grid.tile(1, 0).as_slice().as_ptr(), ptr);
    }

    #[test]
    fn test_tile_size_error() {
        assert_eq!(
            TileGrid::new(10, 4).unwrap_err(),
            TileSizeError {
                dim: 10,
                tile_size: 4
            }
        );
        assert!(TileGrid::new(8, 0).is_err());
        assert!(TileGrid::new(0, 4).is_err());
        assert!(TileGrid::from_flat(&matrix(10), 10, 3).is_err());
        assert_eq!(TileGrid::n_tiles_for(1024, 32), Ok(32));
    }

    #[test]
    #[should_panic]
    fn test_wrong_buffer_length() {
        let _ = TileGrid::from_flat(&[0.0; 15], 4, 2);
    }
}
