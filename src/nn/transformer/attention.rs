//! Multi-head scaled dot-product attention.
//!
//! $$ \text{Attention}(Q, K, V) = \text{softmax}\left(\frac{QK^T}{\sqrt{d_k}}\right)V $$
//!
//! The model dimension is split into `num_heads` heads of `d_k = d_model / num_heads` features.
//! Each head attends independently; the head outputs are concatenated and projected back.

use crate::error::{EncoderError, Result};
use crate::nn::dropout::{Dropout, ForwardContext};
use crate::nn::linear::Linear;
use crate::nn::param::join_name;
use crate::nn::transformer::mask::Mask;
use crate::nn::Module;
use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;
use rand::Rng;
use rayon::prelude::*;

/// Score written into forbidden cells before the softmax.
pub const MASK_FILL: f64 = -1e9;

/// Result of an attention forward pass.
#[derive(Debug, Clone)]
pub struct AttentionOutput<T: TensorElem> {
    /// - Shape: `[batch, seq_q, d_model]`
    pub output: Tensor<T, 3>,
    /// Post-softmax, post-dropout weights. Shape `[batch, heads, seq_q, seq_k]`.
    pub weights: Tensor<T, 4>,
}

#[derive(Debug, Clone)]
pub struct MultiHeadAttentionBlock<T: TensorElem> {
    pub w_q: Linear<T>,
    pub w_k: Linear<T>,
    pub w_v: Linear<T>,
    pub w_o: Linear<T>,

    num_heads: usize,
    d_k: usize,
    dropout: Dropout,
}

impl<T: TensorElem + Float> MultiHeadAttentionBlock<T> {
    /// Assembles a block from four `d_model -> d_model` projections.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::InvalidConfig` if `num_heads` is zero or does not divide the
    /// model dimension, and `EncoderError::ShapeMismatch` if a projection is not square in it.
    pub fn new(
        num_heads: usize,
        w_q: Linear<T>,
        w_k: Linear<T>,
        w_v: Linear<T>,
        w_o: Linear<T>,
        dropout: Dropout,
    ) -> Result<Self> {
        let d_model = w_q.in_features();
        if num_heads == 0 || d_model % num_heads != 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "d_model ({d_model}) must be divisible by num_heads ({num_heads})"
            )));
        }
        for proj in [&w_q, &w_k, &w_v, &w_o] {
            if proj.weight.shape() != &[d_model, d_model] {
                return Err(EncoderError::ShapeMismatch {
                    expected: vec![d_model, d_model],
                    got: proj.weight.shape().to_vec(),
                });
            }
        }

        Ok(Self {
            w_q,
            w_k,
            w_v,
            w_o,
            num_heads,
            d_k: d_model / num_heads,
            dropout,
        })
    }

    /// Creates a block with randomly initialised projections.
    pub fn init<R: Rng + ?Sized>(
        d_model: usize,
        num_heads: usize,
        dropout: Dropout,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(
            num_heads,
            Linear::init(d_model, d_model, rng),
            Linear::init(d_model, d_model, rng),
            Linear::init(d_model, d_model, rng),
            Linear::init(d_model, d_model, rng),
            dropout,
        )
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn d_k(&self) -> usize {
        self.d_k
    }

    pub fn d_model(&self) -> usize {
        self.num_heads * self.d_k
    }

    /// Attends from `q` over `k`/`v`.
    ///
    /// `q` is `[batch, seq_q, d_model]`; `k` and `v` are `[batch, seq_k, d_model]`.
    /// The mask, if present, must broadcast to `[batch, heads, seq_q, seq_k]`.
    pub fn forward(
        &self,
        q: &Tensor<T, 3>,
        k: &Tensor<T, 3>,
        v: &Tensor<T, 3>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<AttentionOutput<T>> {
        let [b, s_q, _] = *q.shape();
        let [b_k, s_k, _] = *k.shape();
        if b_k != b || v.shape() != k.shape() {
            return Err(EncoderError::ShapeMismatch {
                expected: vec![b, s_k, self.d_model()],
                got: v.shape().to_vec(),
            });
        }

        let query = self.w_q.forward(q)?;
        let key = self.w_k.forward(k)?;
        let value = self.w_v.forward(v)?;

        // [B, S, D] -> [B, S, H, d_k] -> [B, H, S, d_k]
        let query = self.split_heads(query, b, s_q)?;
        let key = self.split_heads(key, b, s_k)?;
        let value = self.split_heads(value, b, s_k)?;

        let (heads, weights) =
            scaled_dot_product_attention(&query, &key, &value, mask, &self.dropout, ctx)?;

        // [B, H, S, d_k] -> [B, S, H, d_k] -> [B, S, D]
        let merged = heads
            .transpose_axes(1, 2)?
            .reshape([b, s_q, self.d_model()])?;

        Ok(AttentionOutput {
            output: self.w_o.forward(&merged)?,
            weights,
        })
    }

    fn split_heads(&self, x: Tensor<T, 3>, b: usize, s: usize) -> Result<Tensor<T, 4>> {
        Ok(x.reshape([b, s, self.num_heads, self.d_k])?
            .transpose_axes(1, 2)?)
    }
}

/// Scaled dot-product attention over pre-split heads.
///
/// `query` is `[B, H, S_q, d_k]`; `key` and `value` are `[B, H, S_k, d_k]`. Scores are divided
/// by `√d_k`, forbidden cells are set to [`MASK_FILL`], and the row-wise softmax is taken
/// over keys. Returns `(weights · value, weights)`.
pub fn scaled_dot_product_attention<T: TensorElem + Float>(
    query: &Tensor<T, 4>,
    key: &Tensor<T, 4>,
    value: &Tensor<T, 4>,
    mask: Option<&Mask>,
    dropout: &Dropout,
    ctx: &mut ForwardContext,
) -> Result<(Tensor<T, 4>, Tensor<T, 4>)> {
    let [b, h, s_q, d_k] = *query.shape();
    let s_k = key.shape()[2];

    let inv_sqrt_dk: T = scalar(1.0 / (d_k as f64).sqrt());
    let mut scores = query.matmul(&key.transpose()?)?.scale(inv_sqrt_dk);

    if let Some(mask) = mask {
        let target = [b, h, s_q, s_k];
        if !mask.broadcasts_to(target) {
            return Err(EncoderError::ShapeMismatch {
                expected: target.to_vec(),
                got: mask.shape().to_vec(),
            });
        }
        apply_mask(&mut scores, mask);
    }

    let weights = scores.softmax_last_axis()?;
    let weights = dropout.forward(weights, ctx);
    let out = weights.matmul(value)?;
    Ok((out, weights))
}

fn apply_mask<T: TensorElem + Float>(scores: &mut Tensor<T, 4>, mask: &Mask) {
    let [_, h, s_q, s_k] = *scores.shape();
    if scores.size() == 0 {
        return;
    }
    let fill: T = scalar(MASK_FILL);

    scores
        .data_mut()
        .par_chunks_mut(s_k)
        .enumerate()
        .for_each(|(row, scores_row)| {
            let (bi, hi, qi) = (row / (h * s_q), (row / s_q) % h, row % s_q);
            for (ki, score) in scores_row.iter_mut().enumerate() {
                if !mask.is_attend(bi, hi, qi, ki) {
                    *score = fill;
                }
            }
        });
}

impl<T: TensorElem> Module<T> for MultiHeadAttentionBlock<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.w_q.visit_parameters(&join_name(prefix, "w_q"), f);
        self.w_k.visit_parameters(&join_name(prefix, "w_k"), f);
        self.w_v.visit_parameters(&join_name(prefix, "w_v"), f);
        self.w_o.visit_parameters(&join_name(prefix, "w_o"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.w_q.visit_parameters_mut(&join_name(prefix, "w_q"), f);
        self.w_k.visit_parameters_mut(&join_name(prefix, "w_k"), f);
        self.w_v.visit_parameters_mut(&join_name(prefix, "w_v"), f);
        self.w_o.visit_parameters_mut(&join_name(prefix, "w_o"), f);
    }
}
