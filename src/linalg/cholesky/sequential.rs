use super::Step;
use crate::{BlockKernels, TileGrid};

/// Computes the Cholesky factor of the matrix held by `grid`, calling every kernel in program
/// order on the current thread.
pub fn cholesky_in_place<K: BlockKernels>(grid: &mut TileGrid, kernels: &K) {
    let nt = grid.n_tiles();

    for k in 0..nt {
        let Step {
            diag,
            panel,
            trailing,
        } = Step::new(grid, k);

        kernels.factorize_diagonal(diag.as_mut());
        let diag = diag.as_ref();

        for tile in panel.iter_mut() {
            kernels.solve_triangular(diag, tile.as_mut());
        }
        let panel = &*panel;

        for i in k + 1..nt {
            let lhs = panel[i - k - 1].as_ref();
            for j in k + 1..i {
                let rhs = panel[j - k - 1].as_ref();
                kernels.multiply_update(lhs, rhs, trailing[(j - k - 1) * nt + i].as_mut());
            }
            kernels.rank_update(lhs, trailing[(i - k - 1) * nt + i].as_mut());
        }
    }
}
