use crate::{KernelElem, KernelError, Result};
use num_traits::Float;
use rayon::prelude::*;

/// Row-wise softmax over a row-major buffer whose rows are `row_len` long.
///
/// Each row is shifted by its maximum before exponentiating, so large scores never
/// overflow. A row made only of `-inf` has no maximum to shift by and comes back uniform.
pub fn cpu_softmax<T>(data: &[T], row_len: usize) -> Result<Vec<T>>
where
    T: KernelElem + Float,
{
    let mut out = data.to_vec();
    cpu_softmax_inplace(&mut out, row_len)?;
    Ok(out)
}

/// In-place variant of [`cpu_softmax`].
pub fn cpu_softmax_inplace<T>(data: &mut [T], row_len: usize) -> Result<()>
where
    T: KernelElem + Float,
{
    if data.is_empty() {
        return Ok(());
    }
    if row_len == 0 || data.len() % row_len != 0 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![row_len],
            got: vec![data.len()],
        });
    }

    data.par_chunks_mut(row_len).for_each(softmax_row);
    Ok(())
}

fn softmax_row<T: KernelElem + Float>(row: &mut [T]) {
    let max = row.iter().copied().fold(T::neg_infinity(), T::max);

    if max == T::neg_infinity() {
        let uniform = T::one() / T::from_usize(row.len()).unwrap_or_else(T::nan);
        row.iter_mut().for_each(|v| *v = uniform);
        return;
    }

    let mut sum = T::zero();
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    let inv_sum = T::one() / sum;
    for v in row.iter_mut() {
        *v *= inv_sum;
    }
}
