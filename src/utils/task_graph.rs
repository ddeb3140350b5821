//! Dependency-driven task scheduler.
//!
//! Tasks are closures submitted along with the set of resources they read and write. The graph
//! derives a partial order from those declarations, following the usual data-flow rules:
//!
//! - a task reading a resource runs after the last task that wrote it,
//! - a task writing a resource runs after every task that read it since the last write, or after
//!   the last writer if there were no such readers.
//!
//! Since every edge points from an earlier submission to a later one, the submission order is
//! always a valid execution order, which is the one used when the parallelism allows a single
//! thread. Otherwise, a task is spawned on the rayon pool as soon as its last predecessor
//! completes, so tasks that do not conflict may run concurrently regardless of the order in which
//! they were submitted.
//!
//! # Example
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tiled_cholesky::utils::task_graph::{Access, TaskGraph};
//! use tiled_cholesky::Parallelism;
//!
//! let x = AtomicUsize::new(1);
//! let mut graph = TaskGraph::new();
//! graph.submit(&[("x", Access::InOut)], || {
//!     x.fetch_add(1, Ordering::Relaxed);
//! });
//! graph.submit(&[("x", Access::InOut)], || {
//!     x.fetch_add(x.load(Ordering::Relaxed) * 10, Ordering::Relaxed);
//! });
//! graph.run(Parallelism::Rayon(0));
//!
//! assert_eq!(x.load(Ordering::Relaxed), 22);
//! ```

use crate::utils::thread::parallelism_degree;
use crate::Parallelism;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// How a task accesses one of its declared resources.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// The task only reads the resource.
    In,
    /// The task overwrites the resource.
    Out,
    /// The task reads and writes the resource.
    InOut,
}

/// Identifier of a task, in submission order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl TaskId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

struct Task<'a> {
    op: Box<dyn FnOnce() + Send + 'a>,
    predecessors: Vec<TaskId>,
}

struct ResourceState {
    last_writer: Option<TaskId>,
    readers: Vec<TaskId>,
}

/// Set of tasks with declared resource accesses, executed in an order compatible with them.
pub struct TaskGraph<'a, K> {
    tasks: Vec<Task<'a>>,
    resources: HashMap<K, ResourceState>,
}

impl<K: Copy + Eq + Hash> Default for TaskGraph<'_, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K: Copy + Eq + Hash> TaskGraph<'a, K> {
    /// Returns an empty graph.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            resources: HashMap::new(),
        }
    }

    /// Returns the number of submitted tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the tasks that must complete before `task` may start, in submission order.
    #[inline]
    pub fn predecessors(&self, task: TaskId) -> &[TaskId] {
        &self.tasks[task.0].predecessors
    }

    /// Adds a task accessing the resources in `deps`, and returns its identifier.
    ///
    /// The task is ordered after every previously submitted task it conflicts with.
    pub fn submit(&mut self, deps: &[(K, Access)], op: impl FnOnce() + Send + 'a) -> TaskId {
        let id = TaskId(self.tasks.len());
        let mut predecessors = Vec::new();

        for &(key, access) in deps {
            let state = self.resources.entry(key).or_insert(ResourceState {
                last_writer: None,
                readers: Vec::new(),
            });

            match access {
                Access::In => {
                    predecessors.extend(state.last_writer);
                    state.readers.push(id);
                }
                Access::Out | Access::InOut => {
                    if state.readers.is_empty() {
                        predecessors.extend(state.last_writer);
                    } else {
                        predecessors.append(&mut state.readers);
                    }
                    state.last_writer = Some(id);
                }
            }
        }

        predecessors.retain(|&pred| pred != id);
        predecessors.sort_unstable();
        predecessors.dedup();

        self.tasks.push(Task {
            op: Box::new(op),
            predecessors,
        });
        id
    }

    /// Executes every task, then returns.
    pub fn run(self, parallelism: Parallelism) {
        self.execute(parallelism, false);
    }

    /// Executes every task, recording when each of them started and finished.
    pub fn run_traced(self, parallelism: Parallelism) -> ExecutionTrace {
        self.execute(parallelism, true)
    }

    fn execute(self, parallelism: Parallelism, traced: bool) -> ExecutionTrace {
        let n = self.tasks.len();
        let mut ops = Vec::with_capacity(n);
        let mut predecessors = Vec::with_capacity(n);
        let mut successors = vec![Vec::new(); n];

        for (idx, task) in self.tasks.into_iter().enumerate() {
            for pred in &task.predecessors {
                successors[pred.0].push(idx);
            }
            ops.push(Mutex::new(Some(task.op)));
            predecessors.push(task.predecessors);
        }

        log::debug!(
            "running task graph: {} tasks, {} edges, {:?}",
            n,
            predecessors.iter().map(Vec::len).sum::<usize>(),
            parallelism,
        );

        let state = State {
            pending: predecessors
                .iter()
                .map(|preds| AtomicUsize::new(preds.len()))
                .collect(),
            ops,
            successors,
            recorder: traced.then(|| Recorder::new(n)),
        };

        if parallelism_degree(parallelism) == 1 {
            (0..n).for_each(|idx| state.execute(idx));
        } else {
            let roots = predecessors
                .iter()
                .enumerate()
                .filter(|(_, preds)| preds.is_empty())
                .map(|(idx, _)| idx);
            let state = &state;
            rayon::scope(|scope| {
                for idx in roots {
                    spawn(scope, state, idx);
                }
            });
        }

        let records = match state.recorder {
            Some(recorder) => recorder.into_records(),
            None => Vec::new(),
        };
        ExecutionTrace {
            records,
            predecessors,
        }
    }
}

struct State<'a> {
    ops: Vec<Mutex<Option<Box<dyn FnOnce() + Send + 'a>>>>,
    successors: Vec<Vec<usize>>,
    pending: Vec<AtomicUsize>,
    recorder: Option<Recorder>,
}

impl State<'_> {
    fn execute(&self, idx: usize) {
        let op = self.ops[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(recorder) = &self.recorder {
            recorder.start(idx);
        }
        if let Some(op) = op {
            op();
        }
        if let Some(recorder) = &self.recorder {
            recorder.end(idx);
        }
    }
}

fn spawn<'scope, 'a: 'scope>(scope: &rayon::Scope<'scope>, state: &'scope State<'a>, idx: usize) {
    scope.spawn(move |scope| {
        state.execute(idx);
        for &succ in &state.successors[idx] {
            // the last predecessor to finish releases the successor
            if state.pending[succ].fetch_sub(1, Ordering::AcqRel) == 1 {
                spawn(scope, state, succ);
            }
        }
    });
}

const NO_THREAD: usize = usize::MAX;

struct Recorder {
    clock: AtomicUsize,
    start: Vec<AtomicUsize>,
    end: Vec<AtomicUsize>,
    thread: Vec<AtomicUsize>,
}

impl Recorder {
    fn new(n: usize) -> Self {
        let ticks = || (0..n).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        Self {
            clock: AtomicUsize::new(0),
            start: ticks(),
            end: ticks(),
            thread: ticks(),
        }
    }

    fn start(&self, idx: usize) {
        let thread = rayon::current_thread_index().unwrap_or(NO_THREAD);
        self.thread[idx].store(thread, Ordering::Relaxed);
        self.start[idx].store(self.clock.fetch_add(1, Ordering::SeqCst), Ordering::Relaxed);
    }

    fn end(&self, idx: usize) {
        self.end[idx].store(self.clock.fetch_add(1, Ordering::SeqCst), Ordering::Relaxed);
    }

    fn into_records(self) -> Vec<TaskRecord> {
        let Self {
            start, end, thread, ..
        } = self;
        start
            .into_iter()
            .zip(end)
            .zip(thread)
            .map(|((start, end), thread)| {
                let thread = thread.into_inner();
                TaskRecord {
                    start: start.into_inner(),
                    end: end.into_inner(),
                    thread: (thread != NO_THREAD).then_some(thread),
                }
            })
            .collect()
    }
}

/// Execution interval of a task, measured on a logical clock shared by every task of the graph.
///
/// Each start and end event takes a distinct tick, so two tasks ran concurrently if and only if
/// their intervals intersect.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskRecord {
    /// Tick taken right before the task started.
    pub start: usize,
    /// Tick taken right after the task finished.
    pub end: usize,
    /// Index of the rayon worker that ran the task, if any.
    pub thread: Option<usize>,
}

impl TaskRecord {
    /// Returns `true` if the two tasks were running at the same time.
    #[inline]
    pub fn overlaps(&self, other: &TaskRecord) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Record of a traced execution, see [`TaskGraph::run_traced`].
#[derive(Clone, Debug)]
pub struct ExecutionTrace {
    records: Vec<TaskRecord>,
    predecessors: Vec<Vec<TaskId>>,
}

impl ExecutionTrace {
    /// Returns the execution interval of every task, indexed by task identifier.
    #[inline]
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Returns the predecessors `task` was declared with.
    #[inline]
    pub fn predecessors(&self, task: TaskId) -> &[TaskId] {
        &self.predecessors[task.0]
    }

    /// Returns every `(predecessor, successor)` edge whose successor started before its
    /// predecessor finished.
    pub fn violations(&self) -> Vec<(TaskId, TaskId)> {
        let mut violations = Vec::new();
        for (succ, preds) in self.predecessors.iter().enumerate() {
            for &pred in preds {
                if self.records[pred.0].end > self.records[succ].start {
                    violations.push((pred, TaskId(succ)));
                }
            }
        }
        violations
    }

    /// Returns the largest number of tasks that were running at the same time.
    pub fn max_concurrency(&self) -> usize {
        let mut events = Vec::with_capacity(2 * self.records.len());
        for record in &self.records {
            events.push((record.start, true));
            events.push((record.end, false));
        }
        events.sort_unstable();

        let mut running = 0usize;
        let mut max = 0usize;
        for (_, is_start) in events {
            if is_start {
                running += 1;
                max = max.max(running);
            } else {
                running -= 1;
            }
        }
        max
    }

    /// Returns the number of pairs of tasks that ran concurrently and satisfy `filter`.
    pub fn overlapping_pairs(&self, mut filter: impl FnMut(TaskId, TaskId) -> bool) -> usize {
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.sort_unstable_by_key(|&idx| self.records[idx].start);

        let mut active: Vec<usize> = Vec::new();
        let mut count = 0;
        for idx in order {
            let record = self.records[idx];
            active.retain(|&other| self.records[other].end > record.start);
            count += active
                .iter()
                .filter(|&&other| filter(TaskId(other), TaskId(idx)))
                .count();
            active.push(idx);
        }
        count
    }
}
