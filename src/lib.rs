//! `tiled-cholesky` computes the Cholesky factor of a dense symmetric positive-definite matrix
//! stored as a grid of square tiles.
//!
//! The factorization is driven by one of four interchangeable schedulers, which all call the same
//! block kernels on the same tiles and therefore produce the same factor:
//!
//! - [`Strategy::Sequential`]: every kernel runs in program order on the calling thread.
//! - [`Strategy::ParallelFor`]: the panel solves and the inner trailing updates of each step are
//!   data-parallel loops with an implicit barrier at the end of each loop.
//! - [`Strategy::TaskWait`]: every kernel call is a task on the rayon pool, with a barrier after
//!   the panel and after the trailing update of each step.
//! - [`Strategy::TaskDeps`]: every kernel call is a task annotated with the tiles it reads and
//!   writes, and the execution order is derived from those annotations alone, letting tasks of
//!   different steps overlap.
//!
//! # Example
//! ```
//! use tiled_cholesky::{cholesky_in_place, Parallelism, Strategy, TileGrid};
//!
//! let n = 4;
//! let a = [
//!     4.0, 2.0, 4.0, 2.0, //
//!     2.0, 10.0, 5.0, 7.0, //
//!     4.0, 5.0, 21.0, 16.0, //
//!     2.0, 7.0, 16.0, 39.0,
//! ];
//!
//! let mut grid = TileGrid::from_flat(&a, n, 2).unwrap();
//! cholesky_in_place(&mut grid, Strategy::TaskDeps, Parallelism::Rayon(0));
//! let l = grid.to_flat();
//!
//! assert_eq!(l[0], 2.0);
//! assert_eq!(l[3 * n + 3], 5.0);
//! ```

use equator::{assert, debug_assert};

pub mod harness;
pub mod linalg;
pub mod tile;
pub mod utils;

pub use reborrow;

pub use linalg::cholesky::{cholesky_in_place, cholesky_in_place_with, Strategy};
pub use linalg::kernels::{BlockKernels, Reference};
pub use tile::{Tile, TileGrid, TileId, TileMut, TileRef, TileSizeError};

/// Parallelism strategy that can be passed to every routine in the library.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parallelism {
    /// No parallelism.
    ///
    /// The code is executed sequentially on the same thread that calls a function
    /// and passes this argument.
    None,
    /// Rayon parallelism.
    ///
    /// The code is possibly executed in parallel on the current thread, as well as the currently
    /// active rayon thread pool.
    ///
    /// The contained value represents a hint about the number of threads an implementation should
    /// use, but there is no way to guarantee how many or which threads will be used.
    ///
    /// A value of `0` treated as equivalent to `rayon::current_num_threads()`.
    Rayon(usize),
}

#[cfg(feature = "perf-warn")]
#[macro_export]
#[doc(hidden)]
macro_rules! __perf_warn {
    ($name: ident) => {{
        #[inline(always)]
        #[allow(non_snake_case)]
        fn $name() -> &'static ::core::sync::atomic::AtomicBool {
            static $name: ::core::sync::atomic::AtomicBool =
                ::core::sync::atomic::AtomicBool::new(false);
            &$name
        }
        ::core::matches!(
            $name().compare_exchange(
                false,
                true,
                ::core::sync::atomic::Ordering::Relaxed,
                ::core::sync::atomic::Ordering::Relaxed,
            ),
            Ok(_)
        )
    }};
}
