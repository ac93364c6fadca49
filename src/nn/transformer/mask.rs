//! Attention masks.
//!
//! A [`Mask`] holds one boolean per `(batch, head, query, key)` cell: `true` lets the query
//! attend to the key, `false` forbids it. Any axis of size 1 broadcasts, so a padding mask is
//! `[batch, 1, 1, seq]` and a causal mask is `[1, 1, seq, seq]`.

use crate::error::{EncoderError, Result};
use crate::tensor::{Tensor, TensorElem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Vec<bool>,
    shape: [usize; 4],
}

impl Mask {
    /// # Errors
    ///
    /// Returns `EncoderError::ShapeMismatch` if `data.len()` is not the product of `shape`.
    pub fn new(data: Vec<bool>, shape: [usize; 4]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(EncoderError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }
        Ok(Self { data, shape })
    }

    /// Treats every non-zero element as "attend" and every zero as "forbid".
    pub fn from_tensor<T: TensorElem>(t: &Tensor<T, 4>) -> Self {
        Self {
            data: t.data().iter().map(|v| *v != T::zero()).collect(),
            shape: *t.shape(),
        }
    }

    /// Query `i` may attend to keys `0..=i`. Shape `[1, 1, seq, seq]`.
    pub fn causal(seq: usize) -> Self {
        let data = (0..seq * seq).map(|i| i % seq <= i / seq).collect();
        Self {
            data,
            shape: [1, 1, seq, seq],
        }
    }

    /// Forbids every key whose token id is `pad_id`. Shape `[batch, 1, 1, seq]`.
    pub fn padding(token_ids: &Tensor<usize, 2>, pad_id: usize) -> Self {
        let [batch, seq] = *token_ids.shape();
        Self {
            data: token_ids.data().iter().map(|&id| id != pad_id).collect(),
            shape: [batch, 1, 1, seq],
        }
    }

    /// Cell-wise conjunction. Shapes broadcast against each other.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::ShapeMismatch` if an axis differs and neither side is 1.
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        let mut shape = [0; 4];
        for axis in 0..4 {
            let (a, b) = (self.shape[axis], other.shape[axis]);
            shape[axis] = match (a, b) {
                _ if a == b => a,
                (1, _) => b,
                (_, 1) => a,
                _ => {
                    return Err(EncoderError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: other.shape.to_vec(),
                    })
                }
            };
        }

        let [_, h, q, k] = shape;
        let size: usize = shape.iter().product();
        let data = (0..size)
            .map(|i| {
                let idx = [i / (h * q * k), (i / (q * k)) % h, (i / k) % q, i % k];
                self.is_attend(idx[0], idx[1], idx[2], idx[3])
                    && other.is_attend(idx[0], idx[1], idx[2], idx[3])
            })
            .collect();
        Ok(Mask { data, shape })
    }

    pub fn shape(&self) -> &[usize; 4] {
        &self.shape
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Returns `true` if this mask broadcasts to `target`.
    pub fn broadcasts_to(&self, target: [usize; 4]) -> bool {
        self.shape
            .iter()
            .zip(target.iter())
            .all(|(&m, &t)| m == t || m == 1)
    }

    /// Broadcast-aware lookup. Axes of size 1 ignore their index.
    ///
    /// Out-of-range coordinates read as "forbid".
    pub fn is_attend(&self, b: usize, h: usize, q: usize, k: usize) -> bool {
        let mut offset = 0;
        for (axis, idx) in [b, h, q, k].into_iter().enumerate() {
            let dim = self.shape[axis];
            let idx = if dim == 1 { 0 } else { idx };
            if idx >= dim {
                return false;
            }
            offset = offset * dim + idx;
        }
        self.data[offset]
    }
}
