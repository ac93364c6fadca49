use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Batched matrix multiplication over row-major slices.
///
/// Computes `[..., M, K] x [..., K, N] -> [..., M, N]`. Every leading axis is a batch axis and
/// must match between the two operands; for attention that means batch and head axes are
/// multiplied independently.
///
/// The right operand is transposed first so the inner dot product walks two contiguous rows.
/// Work is split over output rows with `rayon`, which covers the batch, head and row axes at
/// once.
pub fn cpu_matmul<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = lhs_shape[RANK - 2];
    let k = lhs_shape[RANK - 1];
    let n = rhs_shape[RANK - 1];

    if k != rhs_shape[RANK - 2] {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 2]],
        });
    }
    if lhs_shape[..RANK - 2] != rhs_shape[..RANK - 2] {
        return Err(KernelError::ShapeMismatch {
            expected: lhs_shape[..RANK - 2].to_vec(),
            got: rhs_shape[..RANK - 2].to_vec(),
        });
    }

    let batch: usize = lhs_shape[..RANK - 2].iter().product();
    let mut out_data = vec![T::zero(); batch * m * n];
    if out_data.is_empty() {
        return Ok(out_data);
    }

    // rhs is [..., K, N]; rhs_t is [..., N, K]
    let rhs_t_data = super::cpu_transpose::cpu_transpose(rhs_data, rhs_shape)?;

    out_data
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(global_row, out_row)| {
            let batch_idx = global_row / m;
            let row = global_row % m;

            let a_start = batch_idx * m * k + row * k;
            let a_row = &lhs_data[a_start..a_start + k];
            let b_batch = batch_idx * n * k;

            for (col, out_elem) in out_row.iter_mut().enumerate() {
                let b_start = b_batch + col * k;
                let b_row = &rhs_t_data[b_start..b_start + k];

                let mut sum = T::zero();
                for (&a, &b) in a_row.iter().zip(b_row.iter()) {
                    sum += a * b;
                }
                *out_elem = sum;
            }
        });

    Ok(out_data)
}
