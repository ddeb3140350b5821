//! CSV report of a benchmark run, one row per invocation.

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tiled_cholesky::harness::Measurement;
use tiled_cholesky::Strategy;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Row {
    pub matrix_size: usize,
    pub block_size: usize,
    pub num_threads: usize,
    pub seq_time_ms: f64,
    pub seq_gflops: f64,
    pub par_for_time_ms: f64,
    pub par_for_gflops: f64,
    pub task_wait_time_ms: f64,
    pub task_wait_gflops: f64,
    pub task_deps_time_ms: f64,
    pub task_deps_gflops: f64,
}

impl Row {
    /// Builds the row of a run from one measurement per strategy.
    ///
    /// Strategies without a measurement are reported with zero timings.
    pub fn new(
        matrix_size: usize,
        block_size: usize,
        num_threads: usize,
        measurements: &[Measurement],
    ) -> Self {
        let of = |strategy: Strategy| {
            measurements
                .iter()
                .find(|m| m.strategy == strategy)
                .map_or((0.0, 0.0), |m| (m.millis(), m.gflops))
        };
        let (seq_time_ms, seq_gflops) = of(Strategy::Sequential);
        let (par_for_time_ms, par_for_gflops) = of(Strategy::ParallelFor);
        let (task_wait_time_ms, task_wait_gflops) = of(Strategy::TaskWait);
        let (task_deps_time_ms, task_deps_gflops) = of(Strategy::TaskDeps);

        Self {
            matrix_size,
            block_size,
            num_threads,
            seq_time_ms,
            seq_gflops,
            par_for_time_ms,
            par_for_gflops,
            task_wait_time_ms,
            task_wait_gflops,
            task_deps_time_ms,
            task_deps_gflops,
        }
    }
}

/// Appends `row` to the CSV file at `path`, writing the header first if the file is new or empty.
pub fn append(path: &Path, row: &Row) -> eyre::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_new = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;

    log::info!("appended results to {}", path.display());
    Ok(())
}
