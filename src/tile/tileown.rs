use super::{TileMut, TileRef};

/// Owned square tile, stored in its own row-major buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    data: Box<[f64]>,
    size: usize,
}

impl Tile {
    /// Returns a `size × size` tile filled with zeros.
    pub fn zeros(size: usize) -> Self {
        Self {
            data: vec![0.0; size * size].into_boxed_slice(),
            size,
        }
    }

    /// Returns a `size × size` tile whose element at `(i, j)` is `f(i, j)`.
    pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                data.push(f(i, j));
            }
        }
        Self {
            data: data.into_boxed_slice(),
            size,
        }
    }

    /// Returns the dimension of the tile.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn as_ref(&self) -> TileRef<'_> {
        TileRef::from_slice(&self.data, self.size)
    }

    #[inline]
    pub fn as_mut(&mut self) -> TileMut<'_> {
        TileMut::from_slice_mut(&mut self.data, self.size)
    }

    /// Returns the element at the given position.
    #[track_caller]
    #[inline]
    pub fn read(&self, row: usize, col: usize) -> f64 {
        self.as_ref().read(row, col)
    }

    /// Returns the given row of the tile.
    #[track_caller]
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        self.as_ref().row(row)
    }

    /// Returns the given row of the tile.
    #[track_caller]
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.size..][..self.size]
    }

    /// Returns the underlying row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
