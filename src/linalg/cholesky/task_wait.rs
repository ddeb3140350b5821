use super::Step;
use crate::utils::thread::parallelism_degree;
use crate::{BlockKernels, Parallelism, TileGrid};

/// Computes the Cholesky factor of the matrix held by `grid`, spawning one rayon task per kernel
/// call.
///
/// The diagonal factorization of each step runs on the calling thread, before the scope of the
/// panel solves that read it is opened. The panel solves are spawned and awaited, followed by the
/// trailing updates, which are spawned and awaited as well before the next step starts.
///
/// When `parallelism` allows a single thread, every kernel runs in program order on the calling
/// thread instead.
pub fn cholesky_in_place<K: BlockKernels>(
    grid: &mut TileGrid,
    kernels: &K,
    parallelism: Parallelism,
) {
    if parallelism_degree(parallelism) == 1 {
        return super::sequential::cholesky_in_place(grid, kernels);
    }

    let nt = grid.n_tiles();

    for k in 0..nt {
        let Step {
            diag,
            panel,
            trailing,
        } = Step::new(grid, k);

        kernels.factorize_diagonal(diag.as_mut());
        let diag = diag.as_ref();

        rayon::scope(|s| {
            for tile in panel.iter_mut() {
                s.spawn(move |_| kernels.solve_triangular(diag, tile.as_mut()));
            }
        });
        let panel = &*panel;

        rayon::scope(|s| {
            for (jj, col) in trailing.chunks_mut(nt).enumerate() {
                let j = k + 1 + jj;
                let rhs = panel[jj].as_ref();

                // tiles (j, j), then (i, j) for i in j + 1..nt
                let (col_diag, below) = col[j..].split_at_mut(1);
                let col_diag = &mut col_diag[0];
                s.spawn(move |_| kernels.rank_update(rhs, col_diag.as_mut()));

                for (ii, tile) in below.iter_mut().enumerate() {
                    let lhs = panel[jj + 1 + ii].as_ref();
                    s.spawn(move |_| kernels.multiply_update(lhs, rhs, tile.as_mut()));
                }
            }
        });
    }
}
