use super::linear::uniform;
use super::param::{join_name, Parameter};
use super::Module;
use crate::error::{EncoderError, Result};
use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;
use rand::Rng;
use rayon::prelude::*;

/// Token embedding table.
///
/// Maps `[batch, seq]` token ids to `[batch, seq, d_model]` rows of the table, multiplied
/// by `√d_model`.
#[derive(Debug, Clone)]
pub struct Embedding<T: TensorElem> {
    /// - Shape: `[vocab_size, d_model]`
    pub weight: Parameter<T, 2>,
}

impl<T: TensorElem + Float> Embedding<T> {
    pub fn new(weight: Tensor<T, 2>) -> Self {
        Self {
            weight: Parameter::new(weight),
        }
    }

    /// Creates a table drawn from `U(-1/√d_model, 1/√d_model)`.
    pub fn init<R: Rng + ?Sized>(vocab_size: usize, d_model: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (d_model.max(1) as f64).sqrt();
        Self::new(uniform([vocab_size, d_model], bound, rng))
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn d_model(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Looks up and scales one row per token id.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::TokenOutOfRange` for the first id `>= vocab_size`.
    pub fn forward(&self, input: &Tensor<usize, 2>) -> Result<Tensor<T, 3>> {
        let [batch_size, seq_len] = *input.shape();
        let [vocab_size, hidden_dim] = *self.weight.shape();

        if let Some(&token) = input.data().iter().find(|&&id| id >= vocab_size) {
            return Err(EncoderError::TokenOutOfRange { token, vocab_size });
        }

        let mut out = Tensor::zeros([batch_size, seq_len, hidden_dim]);
        if hidden_dim == 0 {
            return Ok(out);
        }

        let scale: T = scalar((hidden_dim as f64).sqrt());
        let weight_data = self.weight.value().data();

        out.data_mut()
            .par_chunks_mut(hidden_dim)
            .zip(input.data().par_iter())
            .for_each(|(dest, &token_id)| {
                let src = &weight_data[token_id * hidden_dim..(token_id + 1) * hidden_dim];
                for (d, &s) in dest.iter_mut().zip(src) {
                    *d = s * scale;
                }
            });

        Ok(out)
    }
}

impl<T: TensorElem> Module<T> for Embedding<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.weight.visit(&join_name(prefix, "weight"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.weight.visit_mut(&join_name(prefix, "weight"), f);
    }
}
