use crate::assert;
use reborrow::*;

/// Immutable view over a square tile stored in row-major order.
#[derive(Copy, Clone, Debug)]
pub struct TileRef<'a> {
    data: &'a [f64],
    size: usize,
}

impl<'short> Reborrow<'short> for TileRef<'_> {
    type Target = TileRef<'short>;

    #[inline]
    fn rb(&'short self) -> Self::Target {
        *self
    }
}

impl<'short> ReborrowMut<'short> for TileRef<'_> {
    type Target = TileRef<'short>;

    #[inline]
    fn rb_mut(&'short mut self) -> Self::Target {
        *self
    }
}

impl<'a> IntoConst for TileRef<'a> {
    type Target = TileRef<'a>;

    #[inline]
    fn into_const(self) -> Self::Target {
        self
    }
}

impl<'a> TileRef<'a> {
    /// Creates a view over a row-major buffer holding a `size × size` tile.
    ///
    /// # Panics
    /// Panics if `data.len() != size * size`.
    #[track_caller]
    #[inline]
    pub fn from_slice(data: &'a [f64], size: usize) -> Self {
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
        assert!(all(row < self.size, col < self.size));
        self.data[row * self.size + col]
    }

    /// Returns the given row of the tile.
    #[track_caller]
    #[inline]
    pub fn row(self, row: usize) -> &'a [f64] {
        &self.data[row * self.size..][..self.size]
    }

    /// Returns the underlying row-major buffer.
    #[inline]
    pub fn as_slice(self) -> &'a [f64] {
        self.data
    }
}
