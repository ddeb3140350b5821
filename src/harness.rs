//! Timing and verification of the factorization strategies.
//!
//! A [`BenchContext`] owns every buffer used by a benchmark run: the original matrix, the
//! sequential reference factor, a flat scratch buffer and the tile grid. The grid is reset from
//! the original matrix before each run, so that every strategy starts from the same input, and
//! each result is checked against the reference before its timing is reported.

use crate::linalg::cholesky::{task_deps, KernelCall};
use crate::utils::task_graph::ExecutionTrace;
use crate::{assert, cholesky_in_place, Parallelism, Reference, Strategy, TileGrid, TileSizeError};
use std::time::{Duration, Instant};

/// Default relative tolerance used when comparing a factor to the reference.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Returns the throughput in GFLOP/s of a factorization of dimension `n` that took `elapsed`,
/// counting `n³ / 3` floating point operations.
///
/// Returns zero if `elapsed` is zero, since no rate can be measured.
#[inline]
pub fn gflops(n: usize, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    let n = n as f64;
    (n * n * n / 3.0) / (elapsed.as_secs_f64() * 1e9)
}

/// Timing of one factorization.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub strategy: Strategy,
    pub elapsed: Duration,
    pub gflops: f64,
}

impl Measurement {
    /// Returns the elapsed time in milliseconds.
    #[inline]
    pub fn millis(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / 1e6
    }
}

/// This error signifies that a factor differs from the reference factor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MismatchError {
    /// Row of the first mismatching entry in the full matrix.
    pub row: usize,
    /// Column of the first mismatching entry in the full matrix.
    pub col: usize,
    /// Block row of the tile holding the entry.
    pub tile_row: usize,
    /// Block column of the tile holding the entry.
    pub tile_col: usize,
    pub got: f64,
    pub expected: f64,
}

impl core::fmt::Display for MismatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "factor mismatch at ({}, {}) in tile ({}, {}): got {:e}, expected {:e}",
            self.row, self.col, self.tile_row, self.tile_col, self.got, self.expected,
        )
    }
}

impl std::error::Error for MismatchError {}

/// Compares the lower triangles of the row-major matrices `got` and `expected` of dimension `n`,
/// and returns the first entry whose relative difference exceeds `tolerance`.
///
/// `tile_size` is only used to locate the mismatching entry in the grid.
///
/// # Panics
/// Panics if either matrix does not have `n * n` entries, or if `tile_size` is zero.
#[track_caller]
pub fn compare_lower(
    got: &[f64],
    expected: &[f64],
    n: usize,
    tile_size: usize,
    tolerance: f64,
) -> Result<(), MismatchError> {
    assert!(all(
        got.len() == n * n,
        expected.len() == n * n,
        tile_size > 0
    ));

    for i in 0..n {
        for j in 0..=i {
            let (g, e) = (got[i * n + j], expected[i * n + j]);
            // also rejects NaN
            if !((g - e).abs() <= tolerance * f64::max(1.0, e.abs())) {
                return Err(MismatchError {
                    row: i,
                    col: j,
                    tile_row: i / tile_size,
                    tile_col: j / tile_size,
                    got: g,
                    expected: e,
                });
            }
        }
    }
    Ok(())
}

/// Buffers and reference factor of a benchmark run.
#[derive(Clone, Debug)]
pub struct BenchContext {
    original: Vec<f64>,
    expected: Option<Vec<f64>>,
    scratch: Vec<f64>,
    grid: TileGrid,
    tolerance: f64,
}

impl BenchContext {
    /// Creates a context for the row-major symmetric positive-definite matrix `original` of
    /// dimension `n`, factorized with tiles of dimension `tile_size`.
    ///
    /// Fails if `n` is not a positive multiple of `tile_size`, before allocating any tile.
    ///
    /// # Panics
    /// Panics if `original.len() != n * n`.
    #[track_caller]
    pub fn new(original: Vec<f64>, n: usize, tile_size: usize) -> Result<Self, TileSizeError> {
        let grid = TileGrid::from_flat(&original, n, tile_size)?;
        Ok(Self {
            scratch: vec![0.0; n * n],
            original,
            expected: None,
            grid,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Sets the relative tolerance used to compare factors to the reference.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.grid.dim()
    }

    #[inline]
    pub fn tile_size(&self) -> usize {
        self.grid.tile_size()
    }

    /// Returns the reference factor, if it was computed.
    #[inline]
    pub fn expected(&self) -> Option<&[f64]> {
        self.expected.as_deref()
    }

    /// Copies the original matrix back into the tiles.
    pub fn reset(&mut self) {
        self.grid.copy_from_flat(&self.original);
    }

    fn timed(&mut self, strategy: Strategy, parallelism: Parallelism) -> Measurement {
        self.reset();
        let start = Instant::now();
        cholesky_in_place(&mut self.grid, strategy, parallelism);
        let elapsed = start.elapsed();

        let measurement = Measurement {
            strategy,
            elapsed,
            gflops: gflops(self.dim(), elapsed),
        };
        log::debug!(
            "{strategy}: {:.3} ms, {:.3} GFLOP/s",
            measurement.millis(),
            measurement.gflops,
        );
        measurement
    }

    /// Runs the sequential factorization once to warm up, then once more while timing it, and
    /// stores its result as the reference factor.
    pub fn run_reference(&mut self) -> Measurement {
        self.reset();
        cholesky_in_place(&mut self.grid, Strategy::Sequential, Parallelism::None);

        let measurement = self.timed(Strategy::Sequential, Parallelism::None);
        self.expected = Some(self.grid.to_flat());
        measurement
    }

    fn verify(&mut self) -> Result<(), MismatchError> {
        self.grid.copy_to_flat(&mut self.scratch);
        let expected = match &self.expected {
            Some(expected) => expected,
            None => return Ok(()),
        };
        compare_lower(
            &self.scratch,
            expected,
            self.grid.dim(),
            self.grid.tile_size(),
            self.tolerance,
        )
    }

    /// Factorizes a fresh copy of the original matrix with `strategy`, and checks the result
    /// against the reference factor, which is computed first if needed.
    pub fn run(
        &mut self,
        strategy: Strategy,
        parallelism: Parallelism,
    ) -> Result<Measurement, MismatchError> {
        if self.expected.is_none() {
            self.run_reference();
        }
        let measurement = self.timed(strategy, parallelism);
        self.verify()?;
        Ok(measurement)
    }

    /// Runs the dependency-driven strategy with tracing enabled, and checks its result against
    /// the reference factor, which is computed first if needed.
    pub fn run_traced(
        &mut self,
        parallelism: Parallelism,
    ) -> Result<(ExecutionTrace, Vec<KernelCall>), MismatchError> {
        if self.expected.is_none() {
            self.run_reference();
        }
        self.reset();
        let traced = task_deps::cholesky_in_place_traced(&mut self.grid, &Reference, parallelism);
        self.verify()?;
        Ok(traced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;
    use crate::linalg::cholesky::tests::random_spd;

    #[test]
    fn test_gflops() {
        let elapsed = Duration::from_millis(500);
        assert_eq!(gflops(3000, elapsed), 18.0);
        assert_eq!(gflops(3000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_compare_lower() {
        let n = 3;
        let expected = [1.0, 0.0, 0.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0];

        let mut got = expected;
        got[1] = 100.0;
        assert_eq!(compare_lower(&got, &expected, n, 1, 1e-9), Ok(()));

        got[7] = 5.0 + 1e-12;
        assert_eq!(compare_lower(&got, &expected, n, 1, 1e-9), Ok(()));

        got[7] = 5.1;
        assert_eq!(
            compare_lower(&got, &expected, n, 2, 1e-9),
            Err(MismatchError {
                row: 2,
                col: 1,
                tile_row: 1,
                tile_col: 0,
                got: 5.1,
                expected: 5.0,
            })
        );

        got[7] = f64::NAN;
        assert!(compare_lower(&got, &expected, n, 1, 1e-9).is_err());
    }

    #[test]
    fn test_every_strategy_matches_reference() {
        let (n, ts) = (48, 8);
        let mut ctx = BenchContext::new(random_spd(n, 20), n, ts).unwrap();
        assert!(ctx.expected().is_none());

        let reference = ctx.run_reference();
        assert_eq!(reference.strategy, Strategy::Sequential);
        assert!(ctx.expected().is_some());

        for strategy in Strategy::ALL {
            let measurement = ctx.run(strategy, Parallelism::Rayon(0)).unwrap();
            assert_eq!(measurement.strategy, strategy);
            assert!(measurement.gflops.is_finite());
        }

        let (trace, calls) = ctx.run_traced(Parallelism::Rayon(0)).unwrap();
        assert_eq!(trace.records().len(), calls.len());
        assert!(trace.violations().is_empty());
    }

    #[test]
    fn test_run_computes_reference() {
        let (n, ts) = (16, 4);
        let mut ctx = BenchContext::new(random_spd(n, 21), n, ts).unwrap();
        ctx.run(Strategy::TaskWait, Parallelism::Rayon(0)).unwrap();
        assert!(ctx.expected().is_some());
    }

    #[test]
    fn test_mismatch_is_reported() {
        let (n, ts) = (8, 4);
        let a = random_spd(n, 22);
        let mut ctx = BenchContext::new(a.clone(), n, ts).unwrap();
        ctx.run_reference();

        // the factor of another matrix differs from the reference
        let mut b = a;
        b[5 * n + 5] += 1.0;
        ctx.original = b;

        let err = ctx.run(Strategy::ParallelFor, Parallelism::None).unwrap_err();
        assert_eq!((err.row, err.col), (5, 5));
        assert_eq!((err.tile_row, err.tile_col), (1, 1));
    }

    #[test]
    fn test_tolerance() {
        let (n, ts) = (8, 4);
        let a = random_spd(n, 23);
        let mut b = a.clone();
        b[5 * n + 5] += 1e-6;

        let mut strict = BenchContext::new(a.clone(), n, ts).unwrap();
        strict.run_reference();
        strict.original = b.clone();
        let err = strict.run(Strategy::TaskDeps, Parallelism::None).unwrap_err();
        assert_eq!((err.row, err.col), (5, 5));

        let mut loose = BenchContext::new(a, n, ts).unwrap().with_tolerance(1e-4);
        loose.run_reference();
        loose.original = b;
        assert!(loose.run(Strategy::TaskDeps, Parallelism::None).is_ok());
    }

    #[test]
    fn test_tile_size_error() {
        let err = BenchContext::new(vec![0.0; 100], 10, 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "matrix dimension 10 is not a positive multiple of the tile size 4",
        );
    }
}
