//! Tiled right-looking Cholesky factorization.
//!
//! Given a symmetric positive-definite matrix `A` stored in a [`TileGrid`], the factorization
//! computes the lower triangular matrix `L` such that `A == L × Lᵀ`, overwriting the lower block
//! triangle of the grid. Tiles strictly above the block diagonal are never accessed.
//!
//! Step `k` of the factorization, for `k` in `0..nt`, consists of:
//!
//! 1. factorizing the diagonal tile `(k, k)`,
//! 2. solving the panel tiles `(i, k)` for `i` in `k + 1..nt` against it,
//! 3. updating the trailing tiles `(i, j)` for `k < j < i` with `(i, k) × (j, k)ᵀ`, and the
//!    diagonal tiles `(i, i)` with `(i, k) × (i, k)ᵀ`.
//!
//! Every scheduler applies the same kernels to each tile, in the same relative order, so all of
//! them produce bitwise identical factors.

use crate::utils::task_graph::Access;
use crate::{BlockKernels, Parallelism, Reference, Tile, TileGrid, TileId};

pub mod par_for;
pub mod reconstruct;
pub mod sequential;
pub mod task_deps;
pub mod task_wait;

/// Scheduling strategy of the tiled factorization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Every kernel runs in program order on the calling thread.
    Sequential,
    /// Data-parallel loops over the panel and over each row of the trailing update.
    ParallelFor,
    /// One task per kernel call, with a barrier after the panel and after the trailing update.
    TaskWait,
    /// One task per kernel call, ordered only by the tiles it reads and writes.
    TaskDeps,
}

impl Strategy {
    /// Every strategy, sequential first.
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::ParallelFor,
        Strategy::TaskWait,
        Strategy::TaskDeps,
    ];

    /// Short name of the strategy.
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::ParallelFor => "par-for",
            Strategy::TaskWait => "task-wait",
            Strategy::TaskDeps => "task-deps",
        }
    }
}

impl core::fmt::Display for Strategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Block kernel invoked by the factorization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// [`BlockKernels::factorize_diagonal`].
    FactorizeDiagonal,
    /// [`BlockKernels::solve_triangular`].
    SolveTriangular,
    /// [`BlockKernels::multiply_update`].
    MultiplyUpdate,
    /// [`BlockKernels::rank_update`].
    RankUpdate,
}

/// One kernel call of the factorization: the kernel, the step it belongs to, and the tile it
/// writes. The tiles it reads are implied by those three.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KernelCall {
    pub kind: KernelKind,
    pub step: usize,
    pub target: TileId,
}

impl KernelCall {
    /// Returns the tiles read by the call, excluding its target.
    pub fn inputs(&self) -> Vec<TileId> {
        let k = self.step;
        let TileId { row: i, col: j } = self.target;
        match self.kind {
            KernelKind::FactorizeDiagonal => Vec::new(),
            KernelKind::SolveTriangular => vec![TileId::new(k, k)],
            KernelKind::MultiplyUpdate => vec![TileId::new(i, k), TileId::new(j, k)],
            KernelKind::RankUpdate => vec![TileId::new(i, k)],
        }
    }

    /// Returns every tile accessed by the call, along with how it is accessed.
    pub fn accesses(&self) -> Vec<(TileId, Access)> {
        let mut accesses: Vec<_> = self
            .inputs()
            .into_iter()
            .map(|id| (id, Access::In))
            .collect();
        accesses.push((self.target, Access::InOut));
        accesses
    }
}

/// Returns every kernel call of the factorization of an `n_tiles × n_tiles` grid, in the order
/// of the sequential algorithm.
pub fn kernel_calls(n_tiles: usize) -> Vec<KernelCall> {
    let nt = n_tiles;
    let mut calls = Vec::new();
    let call = |kind, step, row, col| KernelCall {
        kind,
        step,
        target: TileId::new(row, col),
    };

    for k in 0..nt {
        calls.push(call(KernelKind::FactorizeDiagonal, k, k, k));
        for i in k + 1..nt {
            calls.push(call(KernelKind::SolveTriangular, k, i, k));
        }
        for i in k + 1..nt {
            for j in k + 1..i {
                calls.push(call(KernelKind::MultiplyUpdate, k, i, j));
            }
            calls.push(call(KernelKind::RankUpdate, k, i, i));
        }
    }
    calls
}

/// Disjoint borrows of the tiles touched by one step of the factorization.
pub(crate) struct Step<'a> {
    /// Tile `(k, k)`.
    pub diag: &'a mut Tile,
    /// Tiles `(i, k)` for `i` in `k + 1..nt`.
    pub panel: &'a mut [Tile],
    /// Block columns `k + 1..nt`, each of them holding `nt` tiles indexed by block row.
    pub trailing: &'a mut [Tile],
}

impl<'a> Step<'a> {
    #[inline]
    pub fn new(grid: &'a mut TileGrid, k: usize) -> Self {
        let nt = grid.n_tiles();
        let (left, trailing) = grid.tiles_mut().split_at_mut((k + 1) * nt);
        let (diag, panel) = left[k * nt + k..].split_at_mut(1);
        Self {
            diag: &mut diag[0],
            panel,
            trailing,
        }
    }
}

/// Overwrites the lower block triangle of `grid` with the Cholesky factor of the matrix it holds,
/// using the reference kernels.
///
/// The matrix must be symmetric positive definite, and only its lower block triangle is read.
/// Tiles strictly above the block diagonal are left untouched, and so are the strictly upper
/// triangles of the diagonal tiles.
///
/// # Example
/// ```
/// use tiled_cholesky::{cholesky_in_place, Parallelism, Strategy, TileGrid};
///
/// let a = [
///     4.0, 2.0, 4.0, //
///     2.0, 10.0, 5.0, //
///     4.0, 5.0, 21.0,
/// ];
/// let mut grid = TileGrid::from_flat(&a, 3, 1).unwrap();
/// cholesky_in_place(&mut grid, Strategy::ParallelFor, Parallelism::Rayon(0));
///
/// let l = grid.to_flat();
/// assert_eq!([l[0], l[3], l[4], l[6], l[7], l[8]], [2.0, 1.0, 3.0, 2.0, 1.0, 4.0]);
/// ```
#[track_caller]
pub fn cholesky_in_place(grid: &mut TileGrid, strategy: Strategy, parallelism: Parallelism) {
    cholesky_in_place_with(grid, strategy, parallelism, &Reference)
}

/// Same as [`cholesky_in_place`], with user provided kernels.
#[track_caller]
pub fn cholesky_in_place_with<K: BlockKernels>(
    grid: &mut TileGrid,
    strategy: Strategy,
    parallelism: Parallelism,
    kernels: &K,
) {
    log::debug!(
        "tiled cholesky: strategy={strategy}, n={}, ts={}, nt={}, parallelism={parallelism:?}",
        grid.dim(),
        grid.tile_size(),
        grid.n_tiles(),
    );

    #[cfg(feature = "perf-warn")]
    if matches!(strategy, Strategy::TaskWait | Strategy::TaskDeps)
        && grid.tile_size() < 16
        && crate::__perf_warn!(SMALL_TILE_WARN)
    {
        log::warn!(
            target: "tiled_cholesky_perf",
            "task-based schedulers prefer tiles of dimension at least 16 to amortize the scheduling overhead. Found tiles of dimension {}.",
            grid.tile_size(),
        );
    }

    match strategy {
        Strategy::Sequential => sequential::cholesky_in_place(grid, kernels),
        Strategy::ParallelFor => par_for::cholesky_in_place(grid, kernels, parallelism),
        Strategy::TaskWait => task_wait::cholesky_in_place(grid, kernels, parallelism),
        Strategy::TaskDeps => task_deps::cholesky_in_place(grid, kernels, parallelism),
    }
}
