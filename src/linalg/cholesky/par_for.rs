use super::Step;
use crate::utils::thread::{for_each_chunk_mut, for_each_mut};
use crate::{BlockKernels, Parallelism, TileGrid};

/// Computes the Cholesky factor of the matrix held by `grid`, running the panel solves of each
/// step as a parallel loop, then the off-diagonal updates of each row of the trailing matrix as
/// another parallel loop.
///
/// Each loop returns once all its iterations are done, so no two steps ever overlap.
pub fn cholesky_in_place<K: BlockKernels>(
    grid: &mut TileGrid,
    kernels: &K,
    parallelism: Parallelism,
) {
    let nt = grid.n_tiles();

    for k in 0..nt {
        let Step {
            diag,
            panel,
            trailing,
        } = Step::new(grid, k);

        kernels.factorize_diagonal(diag.as_mut());
        let diag = diag.as_ref();

        for_each_mut(
            panel,
            |_, tile| kernels.solve_triangular(diag, tile.as_mut()),
            parallelism,
        );
        let panel = &*panel;

        for i in k + 1..nt {
            let lhs = panel[i - k - 1].as_ref();

            // block columns k + 1..i, each updated at block row i
            for_each_chunk_mut(
                &mut trailing[..(i - k - 1) * nt],
                nt,
                |jj, col| kernels.multiply_update(lhs, panel[jj].as_ref(), col[i].as_mut()),
                parallelism,
            );
            kernels.rank_update(lhs, trailing[(i - k - 1) * nt + i].as_mut());
        }
    }
}
