//! Sinusoidal positional encoding.
//!
//! Attention is permutation-invariant, so position is injected additively:
//!
//! $$ PE_{(pos, 2i)} = \sin(pos / 10000^{2i/d_{model}}) $$
//! $$ PE_{(pos, 2i+1)} = \cos(pos / 10000^{2i/d_{model}}) $$
//!
//! The table is computed in `f64` and cast once, so the same configuration always produces
//! bit-identical values for a given element type.

use crate::error::{EncoderError, Result};
use crate::nn::dropout::{Dropout, ForwardContext};
use crate::nn::param::Buffer;
use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;

/// Adds the positional table to `[batch, seq, d_model]` activations, then applies dropout.
#[derive(Debug, Clone)]
pub struct PositionalEncoding<T: TensorElem> {
    /// - Shape: `[max_seq_len, d_model]`
    table: Buffer<T, 2>,
    dropout: Dropout,
}

impl<T: TensorElem + Float> PositionalEncoding<T> {
    pub fn new(d_model: usize, max_seq_len: usize, dropout: Dropout) -> Self {
        Self {
            table: Buffer::new(sinusoid_table(max_seq_len, d_model)),
            dropout,
        }
    }

    pub fn table(&self) -> &Buffer<T, 2> {
        &self.table
    }

    pub fn capacity(&self) -> usize {
        self.table.value().shape()[0]
    }

    /// # Errors
    ///
    /// Returns `EncoderError::CapacityExceeded` if the sequence is longer than the table.
    pub fn forward(&self, x: &Tensor<T, 3>, ctx: &mut ForwardContext) -> Result<Tensor<T, 3>> {
        let [_, seq_len, _] = *x.shape();
        let capacity = self.capacity();
        if seq_len > capacity {
            return Err(EncoderError::CapacityExceeded {
                requested: seq_len,
                capacity,
            });
        }

        let rows = self.table.value().narrow_rows(seq_len)?;
        let out = x.add_broadcast_batch(&rows)?;
        Ok(self.dropout.forward(out, ctx))
    }
}

/// Builds the `[max_seq_len, d_model]` sinusoid table.
///
/// An odd trailing column, if any, holds the sine term only.
pub fn sinusoid_table<T: TensorElem + Float>(max_seq_len: usize, d_model: usize) -> Tensor<T, 2> {
    let mut table = Tensor::zeros([max_seq_len, d_model]);
    if d_model == 0 {
        return table;
    }

    let log_base = -(10000f64.ln()) / d_model as f64;
    let div_terms: Vec<f64> = (0..d_model)
        .step_by(2)
        .map(|i| (i as f64 * log_base).exp())
        .collect();

    for (pos, row) in table.data_mut().chunks_mut(d_model).enumerate() {
        for (k, &div) in div_terms.iter().enumerate() {
            let angle = pos as f64 * div;
            row[2 * k] = scalar(angle.sin());
            if 2 * k + 1 < d_model {
                row[2 * k + 1] = scalar(angle.cos());
            }
        }
    }
    table
}
