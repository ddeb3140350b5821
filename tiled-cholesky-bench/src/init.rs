use rand::prelude::*;
use tiled_cholesky::Parallelism;

/// Returns the row-major matrix `R × Rᵀ + n × I` of dimension `n`, where the entries of `R` are
/// drawn uniformly from `[0, 1)` by a generator seeded with `seed`.
///
/// `R × Rᵀ` is positive semi-definite, so the result is positive definite.
pub fn random_spd(n: usize, seed: u64, parallelism: Parallelism) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let r: Vec<f64> = (0..n * n).map(|_| rng.gen()).collect();
    let mut a = vec![0.0; n * n];
    if n == 0 {
        return a;
    }

    // lower triangle, then mirrored
    tiled_cholesky::utils::thread::for_each_chunk_mut(
        &mut a,
        n,
        |i, a_i| {
            let r_i = &r[i * n..][..n];
            for (j, a_ij) in a_i[..i + 1].iter_mut().enumerate() {
                let r_j = &r[j * n..][..n];
                *a_ij = r_i.iter().zip(r_j).map(|(x, y)| x * y).sum();
            }
            a_i[i] += n as f64;
        },
        parallelism,
    );
    for i in 0..n {
        for j in i + 1..n {
            a[i * n + j] = a[j * n + i];
        }
    }
    a
}
