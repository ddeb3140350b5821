//! Linear algebra module.
//!
//! Contains the block kernels operating on single tiles, and the tiled Cholesky factorization
//! built on top of them.

pub mod cholesky;
pub mod kernels;
