use crate::Parallelism;

/// Executes `op` on every element of `items` along with its index, possibly in parallel, while
/// splitting the amount of parallelism between the elements.
///
/// Returns once every call has completed.
#[inline]
pub fn for_each_mut<T: Send>(
    items: &mut [T],
    op: impl Send + Sync + Fn(usize, &mut T),
    parallelism: Parallelism,
) {
    fn implementation<T: Send>(
        items: &mut [T],
        op: &(dyn Send + Sync + Fn(usize, &mut T)),
        parallelism: Parallelism,
    ) {
        let n_tasks = items.len();
        if n_tasks == 0 {
            return;
        }
        if n_tasks == 1 {
            op(0, &mut items[0]);
            return;
        }

        match parallelism {
            Parallelism::None => items
                .iter_mut()
                .enumerate()
                .for_each(|(idx, item)| op(idx, item)),
            Parallelism::Rayon(_) => {
                let n_threads = parallelism_degree(parallelism);

                use rayon::prelude::*;
                let min_len = n_tasks / n_threads;
                items
                    .par_iter_mut()
                    .enumerate()
                    .with_min_len(min_len)
                    .for_each(|(idx, item)| op(idx, item));
            }
        }
    }
    implementation(items, &op, parallelism);
}

/// Executes `op` on every chunk of `chunk_size` consecutive elements of `items` along with its
/// index, possibly in parallel.
///
/// The last chunk may be shorter than `chunk_size`. Returns once every call has completed.
#[track_caller]
#[inline]
pub fn for_each_chunk_mut<T: Send>(
    items: &mut [T],
    chunk_size: usize,
    op: impl Send + Sync + Fn(usize, &mut [T]),
    parallelism: Parallelism,
) {
    fn implementation<T: Send>(
        items: &mut [T],
        chunk_size: usize,
        op: &(dyn Send + Sync + Fn(usize, &mut [T])),
        parallelism: Parallelism,
    ) {
        let n_tasks = items.len().div_ceil(chunk_size);
        if n_tasks <= 1 {
            if n_tasks == 1 {
                op(0, items);
            }
            return;
        }

        match parallelism {
            Parallelism::None => items
                .chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(idx, chunk)| op(idx, chunk)),
            Parallelism::Rayon(_) => {
                let n_threads = parallelism_degree(parallelism);

                use rayon::prelude::*;
                let min_len = n_tasks / n_threads;
                items
                    .par_chunks_mut(chunk_size)
                    .enumerate()
                    .with_min_len(min_len)
                    .for_each(|(idx, chunk)| op(idx, chunk));
            }
        }
    }
    crate::assert!(chunk_size > 0);
    implementation(items, chunk_size, &op, parallelism);
}

/// The amount of threads that should ideally execute an operation with the given parallelism.
#[inline]
pub fn parallelism_degree(parallelism: Parallelism) -> usize {
    match parallelism {
        Parallelism::None => 1,
        Parallelism::Rayon(0) => rayon::current_num_threads(),
        Parallelism::Rayon(n_threads) => n_threads,
    }
}
