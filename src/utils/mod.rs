//! Scheduling utilities shared by the factorization strategies.

pub mod task_graph;
pub mod thread;
