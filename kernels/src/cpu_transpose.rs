use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Swaps the last two axes of a row-major buffer: `[..., M, N] -> [..., N, M]`.
///
/// Parallel over the rows of the output.
pub fn cpu_transpose<T, const RANK: usize>(data: &[T], shape: &[usize; RANK]) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let size: usize = shape.iter().product();
    if data.len() != size {
        return Err(KernelError::ShapeMismatch {
            expected: vec![size],
            got: vec![data.len()],
        });
    }

    let mut out_data = vec![T::zero(); size];
    if size == 0 {
        return Ok(out_data);
    }

    let m = shape[RANK - 2];
    let n = shape[RANK - 1];

    out_data
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(i, out_row)| {
            // out row `i` is column `i % n` of input matrix `i / n`
            let batch_offset = (i / n) * m * n;
            let col = i % n;
            for (r, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[batch_offset + r * n + col];
            }
        });

    Ok(out_data)
}
