use crate::error::{EncoderError, Result};
use crate::nn::activation::Activation;
use crate::nn::dropout::{Dropout, ForwardContext};
use crate::nn::linear::Linear;
use crate::nn::param::join_name;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorElem};
use num_traits::Float;
use rand::Rng;

/// Position-wise feed-forward sublayer.
///
/// `FFN(x) = W2 · dropout(act(W1 · x + b1)) + b2`, applied to every position independently.
/// `W1` maps `d_model -> d_ff` and `W2` maps back.
#[derive(Debug, Clone)]
pub struct FeedForwardBlock<T: TensorElem> {
    pub linear_1: Linear<T>,
    pub linear_2: Linear<T>,
    activation: Activation,
    dropout: Dropout,
}

impl<T: TensorElem + Float> FeedForwardBlock<T> {
    /// # Errors
    ///
    /// Returns `EncoderError::ShapeMismatch` if the two projections do not compose back to
    /// the input width.
    pub fn new(
        linear_1: Linear<T>,
        linear_2: Linear<T>,
        activation: Activation,
        dropout: Dropout,
    ) -> Result<Self> {
        let expected = [linear_1.in_features(), linear_1.out_features()];
        let got = [linear_2.out_features(), linear_2.in_features()];
        if expected != got {
            return Err(EncoderError::ShapeMismatch {
                expected: expected.to_vec(),
                got: got.to_vec(),
            });
        }

        Ok(Self {
            linear_1,
            linear_2,
            activation,
            dropout,
        })
    }

    pub fn init<R: Rng + ?Sized>(
        d_model: usize,
        d_ff: usize,
        activation: Activation,
        dropout: Dropout,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(
            Linear::init(d_model, d_ff, rng),
            Linear::init(d_ff, d_model, rng),
            activation,
            dropout,
        )
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn forward<const RANK: usize>(
        &self,
        x: &Tensor<T, RANK>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor<T, RANK>> {
        let hidden = self.linear_1.forward(x)?;
        let hidden = self.activation.apply(&hidden);
        let hidden = self.dropout.forward(hidden, ctx);
        Ok(self.linear_2.forward(&hidden)?)
    }
}

impl<T: TensorElem> Module<T> for FeedForwardBlock<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.linear_1.visit_parameters(&join_name(prefix, "linear_1"), f);
        self.linear_2.visit_parameters(&join_name(prefix, "linear_2"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.linear_1.visit_parameters_mut(&join_name(prefix, "linear_1"), f);
        self.linear_2.visit_parameters_mut(&join_name(prefix, "linear_2"), f);
    }
}
