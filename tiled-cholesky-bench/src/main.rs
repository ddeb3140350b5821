use clap::Parser;
use env_logger::Env;
use eyre::{eyre, Result, WrapErr};
use human_repr::HumanDuration;
use std::path::PathBuf;
use tiled_cholesky::harness::{BenchContext, Measurement, DEFAULT_TOLERANCE};
use tiled_cholesky::{Parallelism, Strategy, TileGrid};

mod init;
mod report;

#[derive(Parser, Debug)]
#[command(
    name = "tiled-cholesky-bench",
    version,
    about = "Times the tiled Cholesky factorization of a random SPD matrix with every scheduler"
)]
struct Args {
    /// Dimension of the matrix
    matrix_size: usize,

    /// Dimension of the tiles, must divide the matrix dimension
    block_size: usize,

    /// Number of worker threads, defaults to the number of logical cores
    #[arg(short, long, env = "TILED_CHOLESKY_THREADS")]
    threads: Option<usize>,

    /// Append the results to this CSV file
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Relative tolerance used to compare each factor to the sequential one
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Seed of the random matrix
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Trace the dependency-driven run and report how much consecutive steps overlapped
    #[arg(long)]
    trace: bool,
}

fn print_table(args: &Args, num_threads: usize, measurements: &[Measurement]) {
    println!("============ CHOLESKY RESULTS ============");
    println!(
        "  {:<24} {}x{}",
        "matrix size:", args.matrix_size, args.matrix_size
    );
    println!(
        "  {:<24} {}x{}",
        "block size:", args.block_size, args.block_size
    );
    println!("  {:<24} {}", "number of threads:", num_threads);
    for m in measurements {
        println!(
            "  {:<24} {:>12} {:>10.3} GFLOP/s",
            format!("{}:", m.strategy),
            format!("{}", m.elapsed.human_duration()),
            m.gflops,
        );
    }
    println!("==========================================");
}

fn trace(ctx: &mut BenchContext) -> Result<()> {
    let (trace, calls) = ctx.run_traced(Parallelism::Rayon(0))?;

    let violations = trace.violations();
    if !violations.is_empty() {
        return Err(eyre!(
            "{} dependency edges were not respected, first: {:?}",
            violations.len(),
            violations[0],
        ));
    }

    let cross_step =
        trace.overlapping_pairs(|a, b| calls[a.index()].step != calls[b.index()].step);
    log::info!(
        "task-deps trace: {} tasks, peak concurrency {}, {} overlapping pairs across steps",
        calls.len(),
        trace.max_concurrency(),
        cross_step,
    );
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let (n, ts) = (args.matrix_size, args.block_size);
    if !(args.tolerance >= 0.0) {
        return Err(eyre!("invalid tolerance {}", args.tolerance));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = args.threads {
        builder = builder.num_threads(threads);
    }
    let pool = builder.build().wrap_err("failed to build the thread pool")?;
    let num_threads = pool.current_num_threads();

    pool.install(|| -> Result<()> {
        TileGrid::n_tiles_for(n, ts)?;

        log::info!("generating a random SPD matrix of dimension {n} (seed {})", args.seed);
        let original = init::random_spd(n, args.seed, Parallelism::Rayon(0));
        let mut ctx = BenchContext::new(original, n, ts)?.with_tolerance(args.tolerance);

        let mut measurements = vec![ctx.run_reference()];
        for strategy in [Strategy::ParallelFor, Strategy::TaskWait, Strategy::TaskDeps] {
            let measurement = ctx
                .run(strategy, Parallelism::Rayon(0))
                .wrap_err_with(|| format!("{strategy} result differs from the sequential one"))?;
            measurements.push(measurement);
        }

        print_table(args, num_threads, &measurements);

        if let Some(path) = &args.csv {
            let row = report::Row::new(n, ts, num_threads, &measurements);
            report::append(path, &row)?;
        }

        if args.trace {
            trace(&mut ctx)?;
        }
        Ok(())
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("{args:?}");

    run(&args).map_err(|err| {
        log::error!("{err:#}");
        err
    })
}
