use crate::utils::thread::for_each_chunk_mut;
use crate::{assert, Parallelism};

/// Computes `L × Lᵀ`, where `L` is the lower triangle of the row-major matrix `factor` of
/// dimension `n`, and returns it as a full symmetric row-major matrix.
///
/// The strictly upper triangle of `factor` is ignored, so the output of the factorization can be
/// passed as is.
///
/// # Panics
/// Panics if `factor.len() != n * n`.
#[track_caller]
pub fn reconstruct_lower(factor: &[f64], n: usize, parallelism: Parallelism) -> Vec<f64> {
    assert!(factor.len() == n * n);
    let mut dst = vec![0.0; n * n];
    if n == 0 {
        return dst;
    }

    for_each_chunk_mut(
        &mut dst,
        n,
        |i, dst_i| {
            let l_i = &factor[i * n..][..i + 1];
            for (j, dst_ij) in dst_i[..i + 1].iter_mut().enumerate() {
                let l_j = &factor[j * n..][..j + 1];
                *dst_ij = l_i[..j + 1].iter().zip(l_j).map(|(a, b)| a * b).sum();
            }
        },
        parallelism,
    );

    for i in 0..n {
        for j in i + 1..n {
            dst[i * n + j] = dst[j * n + i];
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert;

    #[test]
    fn test_reconstruct_known() {
        #[rustfmt::skip]
        let l = [
            2.0, -7.0, -7.0,
            1.0, 3.0, -7.0,
            2.0, 1.0, 4.0,
        ];
        #[rustfmt::skip]
        let a = [
            4.0, 2.0, 4.0,
            2.0, 10.0, 5.0,
            4.0, 5.0, 21.0,
        ];
        for parallelism in [Parallelism::None, Parallelism::Rayon(0)] {
            assert_eq!(reconstruct_lower(&l, 3, parallelism), a);
        }
    }

    #[test]
    fn test_reconstruct_empty() {
        assert!(reconstruct_lower(&[], 0, Parallelism::None).is_empty());
    }
}
