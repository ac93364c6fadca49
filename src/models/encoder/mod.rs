//! The assembled encoder.
//!
//! ```text
//! token ids [B, S]
//!   -> Embedding (x √d_model)
//!   -> + PositionalEncoding, dropout
//!   -> EncoderBlock x N   (pre-norm attention, pre-norm feed-forward)
//!   -> LayerNorm
//!   -> [B, S, d_model]
//! ```

mod config;

pub use config::EncoderConfig;

use crate::error::{EncoderError, Result};
use crate::nn::dropout::{Dropout, ForwardContext};
use crate::nn::embedding::Embedding;
use crate::nn::norm::LayerNorm;
use crate::nn::param::join_name;
use crate::nn::transformer::{
    EncoderBlock, EncoderStack, FeedForwardBlock, Mask, MultiHeadAttentionBlock,
    PositionalEncoding, ResidualConnection,
};
use crate::nn::Module;
use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Output of [`TransformerEncoder::forward_with_attention`].
#[derive(Debug, Clone)]
pub struct EncoderOutput<T: TensorElem> {
    /// - Shape: `[batch, seq, d_model]`
    pub output: Tensor<T, 3>,
    /// One `[batch, heads, seq, seq]` tensor per block, in block order.
    pub attention: Vec<Tensor<T, 4>>,
}

#[derive(Debug, Clone)]
pub struct TransformerEncoder<T: TensorElem> {
    pub embedding: Embedding<T>,
    pub positional: PositionalEncoding<T>,
    pub encoder: EncoderStack<T>,
    config: EncoderConfig,
}

impl<T: TensorElem + Float> TransformerEncoder<T> {
    /// Builds a model with ReLU feed-forward layers and seed 0.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::InvalidConfig` before allocating anything if a dimension is
    /// zero, `d_model` is odd or not divisible by `num_heads`, `dropout_prob` is outside
    /// `[0, 1)`, or `eps` is not positive.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        d_model: usize,
        vocab_size: usize,
        max_seq_len: usize,
        num_heads: usize,
        num_layers: usize,
        d_ff: usize,
        dropout_prob: f64,
        eps: f64,
    ) -> Result<Self> {
        let config = EncoderConfig::new(
            d_model,
            vocab_size,
            max_seq_len,
            num_heads,
            num_layers,
            d_ff,
        )
        .with_dropout(dropout_prob)
        .with_eps(eps);
        Self::from_config(&config)
    }

    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let dropout = Dropout::new(config.dropout)?;
        let eps: T = scalar(config.eps);
        let d_model = config.d_model;

        let embedding = Embedding::init(config.vocab_size, d_model, &mut rng);
        let positional = PositionalEncoding::new(d_model, config.max_seq_len, dropout);

        let layers = (0..config.num_layers)
            .map(|_| -> Result<EncoderBlock<T>> {
                Ok(EncoderBlock::new(
                    MultiHeadAttentionBlock::init(d_model, config.num_heads, dropout, &mut rng)?,
                    FeedForwardBlock::init(
                        d_model,
                        config.d_ff,
                        config.activation,
                        dropout,
                        &mut rng,
                    )?,
                    [
                        ResidualConnection::new(d_model, eps, dropout),
                        ResidualConnection::new(d_model, eps, dropout),
                    ],
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let encoder = EncoderStack::new(layers, LayerNorm::new(d_model, eps));

        let model = Self {
            embedding,
            positional,
            encoder,
            config: config.clone(),
        };

        info!(
            d_model,
            num_heads = config.num_heads,
            num_layers = config.num_layers,
            d_ff = config.d_ff,
            vocab_size = config.vocab_size,
            max_seq_len = config.max_seq_len,
            activation = %config.activation,
            parameters = model.num_parameters(),
            "built transformer encoder"
        );
        Ok(model)
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encodes `[batch, seq]` token ids into `[batch, seq, d_model]`.
    ///
    /// The mask, if given, must broadcast to `[batch, num_heads, seq, seq]`.
    ///
    /// # Errors
    ///
    /// - `EncoderError::ShapeMismatch` if the mask does not broadcast.
    /// - `EncoderError::TokenOutOfRange` for an id `>= vocab_size`.
    /// - `EncoderError::CapacityExceeded` if `seq > max_seq_len`.
    pub fn forward(
        &self,
        token_ids: &Tensor<usize, 2>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor<T, 3>> {
        let x = self.embed(token_ids, mask, ctx)?;
        self.encoder.forward(&x, mask, ctx)
    }

    /// Like [`TransformerEncoder::forward`], also returning every block's attention weights.
    pub fn forward_with_attention(
        &self,
        token_ids: &Tensor<usize, 2>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<EncoderOutput<T>> {
        let x = self.embed(token_ids, mask, ctx)?;
        let (output, attention) = self.encoder.forward_with_attention(&x, mask, ctx)?;
        Ok(EncoderOutput { output, attention })
    }

    fn embed(
        &self,
        token_ids: &Tensor<usize, 2>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor<T, 3>> {
        let [batch, seq_len] = *token_ids.shape();
        debug!(
            batch,
            seq_len,
            mode = %ctx.mode(),
            masked = mask.is_some(),
            "encoder forward"
        );

        // Checked here so it also fires when there are no blocks
        if let Some(mask) = mask {
            let target = [batch, self.config.num_heads, seq_len, seq_len];
            if !mask.broadcasts_to(target) {
                return Err(EncoderError::ShapeMismatch {
                    expected: target.to_vec(),
                    got: mask.shape().to_vec(),
                });
            }
        }

        let x = self.embedding.forward(token_ids)?;
        self.positional.forward(&x, ctx)
    }
}

impl<T: TensorElem> Module<T> for TransformerEncoder<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.embedding
            .visit_parameters(&join_name(prefix, "embedding"), f);
        self.encoder.visit_parameters(&join_name(prefix, "encoder"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.embedding
            .visit_parameters_mut(&join_name(prefix, "embedding"), f);
        self.encoder
            .visit_parameters_mut(&join_name(prefix, "encoder"), f);
    }
}
