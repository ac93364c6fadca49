//! Tensor operations.
//!
//! - **Element-wise arithmetic**: `+`, `-`, `*`, `/` on `&Tensor` pairs of identical shape.
//! - **Matrix multiplication**: batched over every leading axis.
//! - **Layout**: last-two-axes `transpose` and arbitrary `transpose_axes` (head split/merge).
//! - **Softmax**: numerically stable, over the last axis.
//!
//! Bulk loops run on `rayon`. There is no implicit broadcasting; the one broadcast the encoder
//! needs (positional table over the batch) is the explicit [`Tensor::add_broadcast_batch`].
//!
//! ```rust
//! use encoder_rs::tensor::Tensor;
//!
//! let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
//! let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();
//! let c = (&a + &b).unwrap();
//! assert_eq!(c.data(), &[4.0, 6.0]);
//! ```

use super::{compute_strides, Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary element-wise operator for `&Tensor`.
///
/// Shapes must match exactly; the output is a fresh tensor filled in parallel.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK>
        where
            T: TensorElem,
        {
            type Output = Result<Tensor<T, RANK>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Applies `f` to every element, returning a new tensor of the same shape.
    ///
    /// ```rust
    /// use encoder_rs::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// assert_eq!(t.map(|x| x * x).data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|v| v * factor)
    }

    /// Batched matrix multiplication on the last two axes.
    ///
    /// - Rank 2: `[M, K] x [K, N] -> [M, N]`
    /// - Rank 3: `[B, M, K] x [B, K, N] -> [B, M, N]`
    /// - Rank 4: `[B, H, M, K] x [B, H, K, N] -> [B, H, M, N]`
    ///
    /// Leading axes must be identical on both sides.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        const { assert!(RANK >= 2, "Matmul requires rank >= 2") };

        let mut out_shape = self.shape;
        out_shape[RANK - 1] = rhs.shape[RANK - 1];

        let data = encoder_rs_kernels::cpu_matmul(&self.data, &rhs.data, &self.shape, &rhs.shape)?;

        Ok(Tensor {
            shape: out_shape,
            strides: compute_strides(&out_shape),
            data,
        })
    }

    /// Swaps the last two axes.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` for rank < 2.
    pub fn transpose(&self) -> Result<Self> {
        if RANK < 2 {
            return Err(TensorError::Unsupported(
                "Transpose requires rank >= 2".into(),
            ));
        }

        let data = encoder_rs_kernels::cpu_transpose(&self.data, &self.shape)?;
        let mut shape = self.shape;
        shape.swap(RANK - 1, RANK - 2);

        Ok(Tensor {
            shape,
            strides: compute_strides(&shape),
            data,
        })
    }

    /// Swaps two axes, physically permuting the data so the result stays contiguous.
    ///
    /// Used by attention for `[B, S, H, D] <-> [B, H, S, D]`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if either axis is `>= RANK`.
    pub fn transpose_axes(&self, ax1: usize, ax2: usize) -> Result<Self> {
        if ax1 >= RANK || ax2 >= RANK {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![ax1, ax2],
                shape: self.shape.to_vec(),
            });
        }
        if ax1 == ax2 {
            return Ok(self.clone());
        }

        let mut new_shape = self.shape;
        new_shape.swap(ax1, ax2);

        // Input stride to step along each output axis
        let mut mapped_strides = self.strides;
        mapped_strides.swap(ax1, ax2);

        let mut out = Tensor::zeros(new_shape);
        if out.data.is_empty() {
            return Ok(out);
        }

        let src = &self.data;
        let last = new_shape[RANK - 1];
        let step = mapped_strides[RANK - 1];

        out.data
            .par_chunks_mut(last)
            .enumerate()
            .for_each(|(row, chunk)| {
                let mut rem = row;
                let mut base = 0;
                for axis in (0..RANK - 1).rev() {
                    base += (rem % new_shape[axis]) * mapped_strides[axis];
                    rem /= new_shape[axis];
                }
                for (j, o) in chunk.iter_mut().enumerate() {
                    *o = src[base + j * step];
                }
            });

        Ok(out)
    }
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem + Float,
{
    /// Softmax over the last axis, independently per row.
    ///
    /// Rows are shifted by their maximum before exponentiating.
    pub fn softmax_last_axis(&self) -> Result<Self> {
        const { assert!(RANK >= 1, "Softmax requires rank >= 1") };

        let data = encoder_rs_kernels::cpu_softmax(&self.data, self.shape[RANK - 1])?;
        debug_assert!(
            data.iter().all(|v| v.is_finite()),
            "softmax produced non-finite values"
        );

        Ok(Tensor {
            shape: self.shape,
            strides: self.strides,
            data,
        })
    }
}

impl<T> Tensor<T, 3>
where
    T: TensorElem,
{
    /// Adds a `[seq, d]` table to every batch item of a `[batch, seq, d]` tensor.
    pub fn add_broadcast_batch(&self, rows: &Tensor<T, 2>) -> Result<Self> {
        let [_, s, d] = self.shape;
        if rows.shape != [s, d] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![s, d],
                got: rows.shape.to_vec(),
            });
        }

        let mut out = self.clone();
        if out.data.is_empty() {
            return Ok(out);
        }

        out.data.par_chunks_mut(s * d).for_each(|item| {
            for (o, r) in item.iter_mut().zip(rows.data.iter()) {
                *o += *r;
            }
        });
        Ok(out)
    }
}

impl<T> Tensor<T, 2>
where
    T: TensorElem,
{
    /// Returns a copy of the first `len` rows.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `len` exceeds the row count.
    pub fn narrow_rows(&self, len: usize) -> Result<Self> {
        let [rows, cols] = self.shape;
        if len > rows {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![len],
                shape: self.shape.to_vec(),
            });
        }
        Tensor::new(self.data[..len * cols].to_vec(), [len, cols])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        assert_eq!((&a + &b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!((&a - &b).unwrap().data(), &[-2.0, -2.0]);
        assert_eq!((&a * &b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!((&a / &b).unwrap().data(), &[1.0 / 3.0, 2.0 / 4.0]);

        let f = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert!(matches!(&a + &f, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a - &f, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a * &f, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a / &f, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_map_and_scale() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert_eq!(a.map(|x| x * 2.0).data(), &[2.0, 4.0, 6.0]);
        assert_eq!(a.scale(0.5).data(), &[0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_matmul_2d() {
        let a = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let b = Tensor::<f32, 2>::new(vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0], [3, 2]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        // Row 0: 1*7 + 2*9 + 3*2 = 31, 1*8 + 2*1 + 3*3 = 19
        // Row 1: 4*7 + 5*9 + 6*2 = 85, 4*8 + 5*1 + 6*3 = 55
        assert_eq!(c.data(), &[31.0, 19.0, 85.0, 55.0]);
    }

    #[test]
    fn test_matmul_3d() {
        // Batch 0: I * I = I; batch 1: 2I * 3I = 6I
        let a = Tensor::<f32, 3>::new(
            vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0],
            [2, 2, 2],
        )
        .unwrap();
        let b = Tensor::<f32, 3>::new(
            vec![1.0, 0.0, 0.0, 1.0, 3.0, 0.0, 0.0, 3.0],
            [2, 2, 2],
        )
        .unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2, 2]);
        assert_eq!(c.data(), &[1.0, 0.0, 0.0, 1.0, 6.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn test_matmul_4d_scores_shape() {
        // [B, H, S, D] x [B, H, D, S] -> [B, H, S, S]
        let q = Tensor::<f32, 4>::ones([2, 3, 4, 5]);
        let k_t = Tensor::<f32, 4>::ones([2, 3, 5, 4]);
        let scores = q.matmul(&k_t).unwrap();
        assert_eq!(scores.shape(), &[2, 3, 4, 4]);
        assert!(scores.data().iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_matmul_errors() {
        let a = Tensor::<f32, 2>::zeros([2, 3]);
        let b = Tensor::<f32, 2>::zeros([4, 2]);
        assert!(matches!(a.matmul(&b), Err(TensorError::ShapeMismatch { .. })));

        let a = Tensor::<f32, 3>::zeros([2, 2, 2]);
        let b = Tensor::<f32, 3>::zeros([3, 2, 2]);
        assert!(matches!(a.matmul(&b), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();

        let t_t = t.transpose().unwrap();
        assert_eq!(t_t.shape(), &[3, 2]);
        assert_eq!(t_t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let v = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        assert!(matches!(v.transpose(), Err(TensorError::Unsupported(_))));
    }

    #[test]
    fn test_transpose_4d_last_axes() {
        let t = Tensor::<f32, 4>::new((0..12).map(|i| i as f32).collect(), [1, 2, 2, 3]).unwrap();

        let t_t = t.transpose().unwrap();
        assert_eq!(t_t.shape(), &[1, 2, 3, 2]);
        let expected = [0.0, 3.0, 1.0, 4.0, 2.0, 5.0, 6.0, 9.0, 7.0, 10.0, 8.0, 11.0];
        assert_eq!(t_t.data(), &expected);
    }

    #[test]
    fn test_transpose_axes_head_split() {
        // [B, S, H, D] -> [B, H, S, D]
        let t = Tensor::<f32, 4>::new((0..8).map(|i| i as f32).collect(), [1, 2, 2, 2]).unwrap();

        let permuted = t.transpose_axes(1, 2).unwrap();
        assert_eq!(permuted.shape(), &[1, 2, 2, 2]);
        assert_eq!(permuted.data(), &[0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);

        // Swapping back restores the original layout
        let restored = permuted.transpose_axes(1, 2).unwrap();
        assert_eq!(restored.data(), t.data());
    }

    #[test]
    fn test_transpose_axes_rank3_leading() {
        // [2, 3, 1] -> [3, 2, 1]
        let t = Tensor::<f32, 3>::new((0..6).map(|i| i as f32).collect(), [2, 3, 1]).unwrap();
        let p = t.transpose_axes(0, 1).unwrap();
        assert_eq!(p.shape(), &[3, 2, 1]);
        assert_eq!(p.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_transpose_axes_matches_transpose() {
        let t = Tensor::<f32, 3>::new((0..24).map(|i| i as f32).collect(), [2, 3, 4]).unwrap();
        let a = t.transpose_axes(1, 2).unwrap();
        let b = t.transpose().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_transpose_axes_errors_and_identity() {
        let t = Tensor::<f32, 2>::zeros([2, 2]);
        assert!(matches!(
            t.transpose_axes(0, 2),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
        assert_eq!(t.transpose_axes(1, 1).unwrap().shape(), t.shape());
    }

    #[test]
    fn test_softmax_last_axis() {
        let t = Tensor::<f64, 2>::new(vec![0.0, 0.0, 1.0, 1.0, 3.0, -1.0], [2, 3]).unwrap();
        let s = t.softmax_last_axis().unwrap();
        assert_eq!(s.shape(), &[2, 3]);

        for row in s.data().chunks(3) {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
        // Row 0: [1, 1, e] / (2 + e)
        let e = std::f64::consts::E;
        assert!((s.data()[2] - e / (2.0 + e)).abs() < 1e-12);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "softmax produced non-finite values")]
    fn test_softmax_infinite_score_trips_finite_check() {
        let t = Tensor::<f32, 2>::new(vec![0.0, f32::INFINITY, 1.0], [1, 3]).unwrap();
        let _ = t.softmax_last_axis();
    }

    #[test]
    fn test_add_broadcast_batch() {
        let x = Tensor::<f32, 3>::zeros([2, 2, 2]);
        let table = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();

        let y = x.add_broadcast_batch(&table).unwrap();
        assert_eq!(y.data(), &[1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);

        let wrong = Tensor::<f32, 2>::zeros([3, 2]);
        assert!(matches!(
            x.add_broadcast_batch(&wrong),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_narrow_rows() {
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2]).unwrap();

        let head = t.narrow_rows(2).unwrap();
        assert_eq!(head.shape(), &[2, 2]);
        assert_eq!(head.data(), &[1.0, 2.0, 3.0, 4.0]);

        assert_eq!(t.narrow_rows(0).unwrap().shape(), &[0, 2]);
        assert!(matches!(
            t.narrow_rows(4),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
    }
}
