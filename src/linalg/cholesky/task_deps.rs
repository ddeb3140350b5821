//! Dependency-driven tiled factorization.
//!
//! Every kernel call is submitted to a [`TaskGraph`] along with the tiles it reads and the tile it
//! writes, in the order of the sequential algorithm. The graph then lets a call start as soon as
//! the calls producing its inputs are done, so that the diagonal factorization of step `k + 1`
//! may run while the trailing updates of step `k` that do not feed it are still in flight.
//!
//! Each task locks the tiles it accesses with `try_read`/`try_write`. Contention on one of these
//! locks means two conflicting calls ran concurrently, which is reported by a panic.

use super::{kernel_calls, KernelCall, KernelKind};
use crate::utils::task_graph::{ExecutionTrace, TaskGraph};
use crate::{BlockKernels, Parallelism, Tile, TileGrid, TileId};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// Tiles of a grid, each behind its own lock.
struct TileCells<'t> {
    cells: Vec<RwLock<&'t mut Tile>>,
    n_tiles: usize,
}

impl<'t> TileCells<'t> {
    fn new(grid: &'t mut TileGrid) -> Self {
        let n_tiles = grid.n_tiles();
        Self {
            cells: grid.tiles_mut().iter_mut().map(RwLock::new).collect(),
            n_tiles,
        }
    }

    #[inline]
    fn cell(&self, id: TileId) -> &RwLock<&'t mut Tile> {
        &self.cells[id.col * self.n_tiles + id.row]
    }

    #[track_caller]
    fn read(&self, id: TileId) -> RwLockReadGuard<'_, &'t mut Tile> {
        match self.cell(id).try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => {
                panic!("tile {id} was read while being written by another task")
            }
        }
    }

    #[track_caller]
    fn write(&self, id: TileId) -> RwLockWriteGuard<'_, &'t mut Tile> {
        match self.cell(id).try_write() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => {
                panic!("tile {id} was written while being accessed by another task")
            }
        }
    }
}

fn run_call<K: BlockKernels>(cells: &TileCells<'_>, kernels: &K, call: KernelCall) {
    let k = call.step;
    let target = call.target;
    let mut dst = cells.write(target);

    match call.kind {
        KernelKind::FactorizeDiagonal => kernels.factorize_diagonal(dst.as_mut()),
        KernelKind::SolveTriangular => {
            let diag = cells.read(TileId::new(k, k));
            kernels.solve_triangular(diag.as_ref(), dst.as_mut());
        }
        KernelKind::MultiplyUpdate => {
            let lhs = cells.read(TileId::new(target.row, k));
            let rhs = cells.read(TileId::new(target.col, k));
            kernels.multiply_update(lhs.as_ref(), rhs.as_ref(), dst.as_mut());
        }
        KernelKind::RankUpdate => {
            let lhs = cells.read(TileId::new(target.row, k));
            kernels.rank_update(lhs.as_ref(), dst.as_mut());
        }
    }
}

fn build_graph<'a, K: BlockKernels>(
    cells: &'a TileCells<'_>,
    kernels: &'a K,
) -> (TaskGraph<'a, TileId>, Vec<KernelCall>) {
    let calls = kernel_calls(cells.n_tiles);
    let mut graph = TaskGraph::new();
    for &call in &calls {
        graph.submit(&call.accesses(), move || run_call(cells, kernels, call));
    }
    (graph, calls)
}

/// Computes the Cholesky factor of the matrix held by `grid`, ordering the kernel calls only by
/// the tiles they access.
///
/// With [`Parallelism::None`], every kernel runs in program order on the calling thread.
pub fn cholesky_in_place<K: BlockKernels>(
    grid: &mut TileGrid,
    kernels: &K,
    parallelism: Parallelism,
) {
    let cells = TileCells::new(grid);
    let (graph, _) = build_graph(&cells, kernels);
    graph.run(parallelism);
}

/// Same as [`cholesky_in_place`], additionally returning the execution trace of the task graph.
///
/// The `i`-th task of the trace runs the `i`-th returned kernel call.
pub fn cholesky_in_place_traced<K: BlockKernels>(
    grid: &mut TileGrid,
    kernels: &K,
    parallelism: Parallelism,
) -> (ExecutionTrace, Vec<KernelCall>) {
    let cells = TileCells::new(grid);
    let (graph, calls) = build_graph(&cells, kernels);
    (graph.run_traced(parallelism), calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::cholesky::tests::{pool, random_spd};
    use crate::utils::task_graph::TaskId;
    use crate::{cholesky_in_place, Reference, Strategy, TileMut, TileRef};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn task_of(
        calls: &[KernelCall],
        kind: KernelKind,
        step: usize,
        row: usize,
        col: usize,
    ) -> TaskId {
        let target = TileId::new(row, col);
        let idx = calls
            .iter()
            .position(|call| *call == KernelCall { kind, step, target })
            .unwrap();
        TaskId(idx)
    }

    fn ancestors(graph: &TaskGraph<'_, TileId>, task: TaskId) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut stack = vec![task];
        while let Some(task) = stack.pop() {
            for &pred in graph.predecessors(task) {
                if seen.insert(pred) {
                    stack.push(pred);
                }
            }
        }
        seen
    }

    #[test]
    fn test_next_diagonal_waits_only_for_its_inputs() {
        let mut grid = TileGrid::new(8, 2).unwrap();
        let cells = TileCells::new(&mut grid);
        let (graph, calls) = build_graph(&cells, &Reference);
        assert_eq!(graph.len(), calls.len());

        let potrf_1 = task_of(&calls, KernelKind::FactorizeDiagonal, 1, 1, 1);
        let expected = HashSet::from([
            task_of(&calls, KernelKind::FactorizeDiagonal, 0, 0, 0),
            task_of(&calls, KernelKind::SolveTriangular, 0, 1, 0),
            task_of(&calls, KernelKind::RankUpdate, 0, 1, 1),
        ]);
        assert_eq!(ancestors(&graph, potrf_1), expected);

        // the rest of the trailing update of step 0 is free to overlap with step 1
        let gemm = task_of(&calls, KernelKind::MultiplyUpdate, 0, 3, 2);
        let syrk = task_of(&calls, KernelKind::RankUpdate, 0, 2, 2);
        assert!(!ancestors(&graph, potrf_1).contains(&gemm));
        assert!(!ancestors(&graph, potrf_1).contains(&syrk));
        assert!(!ancestors(&graph, gemm).contains(&potrf_1));
    }

    #[test]
    fn test_updates_of_a_tile_are_chained() {
        let nt = 5;
        let mut grid = TileGrid::new(nt, 1).unwrap();
        let cells = TileCells::new(&mut grid);
        let (graph, calls) = build_graph(&cells, &Reference);

        // every call writing a tile runs after the previous call writing it
        for (idx, call) in calls.iter().enumerate() {
            let previous = calls[..idx]
                .iter()
                .rposition(|prev| prev.target == call.target);
            if let Some(previous) = previous {
                assert!(ancestors(&graph, TaskId(idx)).contains(&TaskId(previous)));
            }
        }
    }

    #[test]
    fn test_trace_is_sound() {
        let (n, ts) = (64, 8);
        let a = random_spd(n, 10);

        let mut expected = TileGrid::from_flat(&a, n, ts).unwrap();
        cholesky_in_place(&mut expected, Strategy::Sequential, Parallelism::None);

        pool(4).install(|| {
            for parallelism in [Parallelism::None, Parallelism::Rayon(0)] {
                let mut grid = TileGrid::from_flat(&a, n, ts).unwrap();
                let (trace, calls) = cholesky_in_place_traced(&mut grid, &Reference, parallelism);

                assert_eq!(trace.records().len(), calls.len());
                assert!(trace.violations().is_empty());
                assert_eq!(grid, expected);
            }
        });
    }

    /// Holds the only multiply update of a 3 × 3 grid (step 0) and the diagonal factorization of
    /// step 1 until both are running.
    struct Rendezvous {
        barrier: Barrier,
        factorizations: AtomicUsize,
    }

    impl BlockKernels for Rendezvous {
        fn factorize_diagonal(&self, diag: TileMut<'_>) {
            if self.factorizations.fetch_add(1, Ordering::SeqCst) == 1 {
                self.barrier.wait();
            }
            Reference.factorize_diagonal(diag)
        }
        fn solve_triangular(&self, diag: TileRef<'_>, panel: TileMut<'_>) {
            Reference.solve_triangular(diag, panel)
        }
        fn multiply_update(&self, lhs: TileRef<'_>, rhs: TileRef<'_>, dst: TileMut<'_>) {
            self.barrier.wait();
            Reference.multiply_update(lhs, rhs, dst)
        }
        fn rank_update(&self, lhs: TileRef<'_>, dst: TileMut<'_>) {
            Reference.rank_update(lhs, dst)
        }
    }

    #[test]
    fn test_steps_overlap() {
        let (n, ts) = (12, 4);
        let a = random_spd(n, 11);
        let kernels = Rendezvous {
            barrier: Barrier::new(2),
            factorizations: AtomicUsize::new(0),
        };

        let mut grid = TileGrid::from_flat(&a, n, ts).unwrap();
        let (trace, calls) = pool(2)
            .install(|| cholesky_in_place_traced(&mut grid, &kernels, Parallelism::Rayon(0)));

        let gemm = task_of(&calls, KernelKind::MultiplyUpdate, 0, 2, 1);
        let potrf_1 = task_of(&calls, KernelKind::FactorizeDiagonal, 1, 1, 1);
        let records = trace.records();
        assert!(records[gemm.index()].overlaps(&records[potrf_1.index()]));
        assert!(trace.violations().is_empty());
        let cross_step =
            trace.overlapping_pairs(|a, b| calls[a.index()].step != calls[b.index()].step);
        assert!(cross_step > 0);
        assert!(trace.max_concurrency() >= 2);

        let mut expected = TileGrid::from_flat(&a, n, ts).unwrap();
        cholesky_in_place(&mut expected, Strategy::Sequential, Parallelism::None);
        assert_eq!(grid, expected);
    }
}
