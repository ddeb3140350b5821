//! Block kernels operating on single tiles.
//!
//! Every kernel mutates exactly one output tile in place and only reads its other arguments. The
//! kernels do not allocate, and do not check their numerical preconditions: feeding a tile that
//! is not positive definite to [`factorize_diagonal`] produces `NaN`s rather than an error.
//!
//! | Kernel | Operation | BLAS/LAPACK equivalent |
//! |--------|-----------|------------------------|
//! | [`factorize_diagonal`] | `A := chol(A)` (lower) | `potrf` |
//! | [`solve_triangular`] | `B := B × L⁻ᵀ` | `trsm` |
//! | [`multiply_update`] | `C := C − A × Bᵀ` | `gemm` |
//! | [`rank_update`] | `C := C − A × Aᵀ` (lower) | `syrk` |

use crate::{assert, debug_assert, TileMut, TileRef};

/// Set of block kernels used by the tiled factorization.
///
/// The schedulers only rely on the mathematical contract of each method, so any implementation
/// satisfying it (naive loops, an optimized backend, an instrumented wrapper) can be plugged in.
pub trait BlockKernels: Sync {
    /// Overwrites the lower triangle of `diag` with its Cholesky factor.
    fn factorize_diagonal(&self, diag: TileMut<'_>);
    /// Overwrites `panel` with `panel × diag⁻ᵀ`, where `diag` is lower triangular.
    fn solve_triangular(&self, diag: TileRef<'_>, panel: TileMut<'_>);
    /// Overwrites `dst` with `dst − lhs × rhsᵀ`.
    fn multiply_update(&self, lhs: TileRef<'_>, rhs: TileRef<'_>, dst: TileMut<'_>);
    /// Overwrites the lower triangle of `dst` with that of `dst − lhs × lhsᵀ`.
    fn rank_update(&self, lhs: TileRef<'_>, dst: TileMut<'_>);
}

/// Kernels implemented by the free functions of this module.
#[derive(Copy, Clone, Debug, Default)]
pub struct Reference;

impl BlockKernels for Reference {
    #[inline]
    fn factorize_diagonal(&self, diag: TileMut<'_>) {
        factorize_diagonal(diag)
    }

    #[inline]
    fn solve_triangular(&self, diag: TileRef<'_>, panel: TileMut<'_>) {
        solve_triangular(diag, panel)
    }

    #[inline]
    fn multiply_update(&self, lhs: TileRef<'_>, rhs: TileRef<'_>, dst: TileMut<'_>) {
        multiply_update(lhs, rhs, dst)
    }

    #[inline]
    fn rank_update(&self, lhs: TileRef<'_>, dst: TileMut<'_>) {
        rank_update(lhs, dst)
    }
}

#[inline(always)]
fn dot(lhs: &[f64], rhs: &[f64]) -> f64 {
    debug_assert!(lhs.len() == rhs.len());
    let len = lhs.len() / 4 * 4;
    let (lhs_head, lhs_tail) = lhs.split_at(len);
    let (rhs_head, rhs_tail) = rhs.split_at(len);

    let mut acc = [0.0f64; 4];
    for (l, r) in lhs_head.chunks_exact(4).zip(rhs_head.chunks_exact(4)) {
        acc[0] += l[0] * r[0];
        acc[1] += l[1] * r[1];
        acc[2] += l[2] * r[2];
        acc[3] += l[3] * r[3];
    }

    let mut sum = (acc[0] + acc[1]) + (acc[2] + acc[3]);
    for (l, r) in lhs_tail.iter().zip(rhs_tail) {
        sum += l * r;
    }
    sum
}

/// Computes the Cholesky factor `L` of the tile `diag` such that `L` is lower triangular and
/// `L × Lᵀ == diag`, and stores it in the lower triangle of `diag`.
///
/// Only the lower triangle of `diag` is read, and the strictly upper triangle is not modified.
pub fn factorize_diagonal(diag: TileMut<'_>) {
    let n = diag.size();
    let data = diag.into_slice_mut();

    for j in 0..n {
        let (row_j, below) = data[j * n..].split_at_mut(n);

        // l_jj = sqrt(a_jj - l_j,0..j · l_j,0..j)
        let l_jj = (row_j[j] - dot(&row_j[..j], &row_j[..j])).sqrt();
        row_j[j] = l_jj;

        // l_ij = (a_ij - l_i,0..j · l_j,0..j) / l_jj
        let row_j = &row_j[..j];
        for row_i in below.chunks_exact_mut(n) {
            row_i[j] = (row_i[j] - dot(&row_i[..j], row_j)) / l_jj;
        }
    }
}

/// Computes `X` such that `X × diagᵀ == panel`, and stores it in `panel`.
///
/// `diag` is interpreted as a lower triangular matrix (diagonal included), and its strictly upper
/// triangle is not accessed.
///
/// # Panics
/// Panics if the tiles have different sizes.
#[track_caller]
pub fn solve_triangular(diag: TileRef<'_>, panel: TileMut<'_>) {
    assert!(diag.size() == panel.size());
    let n = diag.size();

    // each row x of the panel solves diag × xᵀ = bᵀ by forward substitution
    for x in panel.into_slice_mut().chunks_exact_mut(n) {
        for c in 0..n {
            let l_c = diag.row(c);
            x[c] = (x[c] - dot(&x[..c], &l_c[..c])) / l_c[c];
        }
    }
}

/// Computes `dst - lhs × rhsᵀ` and stores the result in `dst`.
///
/// # Panics
/// Panics if the tiles have different sizes.
#[track_caller]
pub fn multiply_update(lhs: TileRef<'_>, rhs: TileRef<'_>, dst: TileMut<'_>) {
    assert!(all(lhs.size() == dst.size(), rhs.size() == dst.size()));
    let n = dst.size();
    let mut dst = dst;

    for i in 0..n {
        let lhs_i = lhs.row(i);
        let dst_i = dst.row_mut(i);
        for (j, dst_ij) in dst_i.iter_mut().enumerate() {
            *dst_ij -= dot(lhs_i, rhs.row(j));
        }
    }
}

/// Computes `dst - lhs × lhsᵀ` and stores the lower triangle of the result in the lower triangle
/// of `dst`.
///
/// The strictly upper triangle of `dst` is not accessed.
///
/// # Panics
/// Panics if the tiles have different sizes.
#[track_caller]
pub fn rank_update(lhs: TileRef<'_>, dst: TileMut<'_>) {
    assert!(lhs.size() == dst.size());
    let n = dst.size();
    let mut dst = dst;

    for i in 0..n {
        let lhs_i = lhs.row(i);
        let dst_i = &mut dst.row_mut(i)[..i + 1];
        for (j, dst_ij) in dst_i.iter_mut().enumerate() {
            *dst_ij -= dot(lhs_i, lhs.row(j));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert, Tile};
    use assert_approx_eq::assert_approx_eq;

    const UPPER: f64 = 99.0;

    fn random_tile(n: usize) -> Tile {
        Tile::from_fn(n, |_, _| rand::random::<f64>())
    }

    fn random_lower(n: usize) -> Tile {
        Tile::from_fn(n, |i, j| {
            if i == j {
                1.0 + rand::random::<f64>()
            } else if i > j {
                rand::random::<f64>()
            } else {
                UPPER
            }
        })
    }

    #[test]
    fn test_dot() {
        for n in 0..11 {
            let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let b: Vec<f64> = (0..n).map(|i| (2 * i + 1) as f64).collect();
            let expected: f64 = a.iter().zip(&b).map(|(a, b)| a * b).sum();
            assert_eq!(dot(&a, &b), expected);
        }
    }

    #[test]
    fn test_factorize_diagonal_known() {
        let l = [[2.0, 0.0, 0.0], [1.0, 3.0, 0.0], [2.0, 1.0, 4.0]];
        let mut a = Tile::from_fn(3, |i, j| {
            if j > i {
                UPPER
            } else {
                (0..3).map(|p| l[i][p] * l[j][p]).sum()
            }
        });

        factorize_diagonal(a.as_mut());

        for i in 0..3 {
            for j in 0..3 {
                if j > i {
                    assert_eq!(a.read(i, j), UPPER);
                } else {
                    assert_eq!(a.read(i, j), l[i][j]);
                }
            }
        }
    }

    #[test]
    fn test_factorize_diagonal_reconstructs() {
        for n in [1, 2, 5, 16, 33] {
            let r = random_tile(n);
            let a = Tile::from_fn(n, |i, j| {
                let mut acc = if i == j { n as f64 } else { 0.0 };
                for p in 0..n {
                    acc += r.read(i, p) * r.read(j, p);
                }
                acc
            });

            let mut l = a.clone();
            factorize_diagonal(l.as_mut());

            for i in 0..n {
                for j in 0..=i {
                    let mut acc = 0.0;
                    for p in 0..=j {
                        acc += l.read(i, p) * l.read(j, p);
                    }
                    assert_approx_eq!(acc, a.read(i, j), 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_solve_triangular() {
        for n in [1, 3, 8, 17] {
            let l = random_lower(n);
            let b = random_tile(n);
            let mut x = b.clone();

            solve_triangular(l.as_ref(), x.as_mut());

            // x × lᵀ == b
            for i in 0..n {
                for j in 0..n {
                    let mut acc = 0.0;
                    for p in 0..=j {
                        acc += x.read(i, p) * l.read(j, p);
                    }
                    assert_approx_eq!(acc, b.read(i, j), 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_multiply_update() {
        for n in [1, 4, 7, 16] {
            let a = random_tile(n);
            let b = random_tile(n);
            let c = random_tile(n);
            let mut dst = c.clone();

            multiply_update(a.as_ref(), b.as_ref(), dst.as_mut());

            for i in 0..n {
                for j in 0..n {
                    let mut acc = c.read(i, j);
                    for p in 0..n {
                        acc -= a.read(i, p) * b.read(j, p);
                    }
                    assert_approx_eq!(dst.read(i, j), acc, 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_rank_update_lower_only() {
        for n in [1, 4, 9] {
            let a = random_tile(n);
            let c = Tile::from_fn(n, |i, j| if j > i { UPPER } else { rand::random() });
            let mut dst = c.clone();

            rank_update(a.as_ref(), dst.as_mut());

            for i in 0..n {
                for j in 0..n {
                    if j > i {
                        assert_eq!(dst.read(i, j), UPPER);
                    } else {
                        let mut acc = c.read(i, j);
                        for p in 0..n {
                            acc -= a.read(i, p) * a.read(j, p);
                        }
                        assert_approx_eq!(dst.read(i, j), acc, 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_size_mismatch() {
        let a = Tile::zeros(2);
        let mut c = Tile::zeros(3);
        rank_update(a.as_ref(), c.as_mut());
    }
}
