use super::TileRef;
use crate::assert;
use reborrow::*;

/// Mutable view over a square tile stored in row-major order.
#[derive(Debug)]
pub struct TileMut<'a> {
    data: &'a mut [f64],
    size: usize,
}

impl<'short> Reborrow<'short> for TileMut<'_> {
    type Target = TileRef<'short>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        TileRef::from_slice(&*self.data, self.size)
    }
}

impl<'short> ReborrowMut<'short> for TileMut<'_> {
    type Target = TileMut<'short>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        TileMut {
            data: &mut *self.data,
            size: self.size,
        }
    }
}

impl<'a> IntoConst for TileMut<'a> {
    type Target = TileRef<'a>;

    #[inline]
    fn into_const(self) -> Self::Target {
        TileRef::from_slice(self.data, self.size)
    }
}

impl<'a> TileMut<'a> {
    /// Creates a mutable view over a row-major buffer holding a `size × size` tile.
    ///
    /// # Panics
    /// Panics if `data.len() != size * size`.
    #[track_caller]
    #[inline]
    pub fn from_slice_mut(data: &'a mut [f64], size: usize) -> Self {
        assert!(data.len() == size * size);
        Self { data, size }
    }

    /// Returns the dimension of the tile.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the element at the given position.
    #[track_caller]
    #[inline]
    pub fn read(&self, row: usize, col: usize) -> f64 {
        self.rb().read(row, col)
    }

    /// Writes `value` at the given position.
    #[track_caller]
    #[inline]
    pub fn write(&mut self, row: usize, col: usize, value: f64) {
        assert!(all(row < self.size, col < self.size));
        self.data[row * self.size + col] = value;
    }

    /// Returns the given row of the tile.
    #[track_caller]
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.size..][..self.size]
    }

    /// Returns the underlying row-major buffer.
    #[inline]
    pub fn into_slice_mut(self) -> &'a mut [f64] {
        self.data
    }
}
