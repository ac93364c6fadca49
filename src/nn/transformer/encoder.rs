use crate::error::Result;
use crate::nn::dropout::ForwardContext;
use crate::nn::norm::LayerNorm;
use crate::nn::param::join_name;
use crate::nn::transformer::attention::MultiHeadAttentionBlock;
use crate::nn::transformer::feed_forward::FeedForwardBlock;
use crate::nn::transformer::mask::Mask;
use crate::nn::transformer::residual::ResidualConnection;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorElem};
use num_traits::Float;
use tracing::trace;

/// One encoder layer: self-attention then feed-forward, each in a pre-norm residual.
#[derive(Debug, Clone)]
pub struct EncoderBlock<T: TensorElem> {
    pub self_attention: MultiHeadAttentionBlock<T>,
    pub feed_forward: FeedForwardBlock<T>,
    /// `[attention, feed-forward]`
    pub residuals: [ResidualConnection<T>; 2],
}

impl<T: TensorElem + Float> EncoderBlock<T> {
    pub fn new(
        self_attention: MultiHeadAttentionBlock<T>,
        feed_forward: FeedForwardBlock<T>,
        residuals: [ResidualConnection<T>; 2],
    ) -> Self {
        Self {
            self_attention,
            feed_forward,
            residuals,
        }
    }

    pub fn forward(
        &self,
        x: &Tensor<T, 3>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor<T, 3>> {
        let (out, _) = self.forward_with_attention(x, mask, ctx)?;
        Ok(out)
    }

    /// Also returns this block's attention weights, `[batch, heads, seq, seq]`.
    pub fn forward_with_attention(
        &self,
        x: &Tensor<T, 3>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<(Tensor<T, 3>, Tensor<T, 4>)> {
        let (x, weights) = self.residuals[0].apply_with(x, ctx, |normed, ctx| {
            let attn = self
                .self_attention
                .forward(normed, normed, normed, mask, ctx)?;
            Ok((attn.output, attn.weights))
        })?;

        let x = self.residuals[1].apply(&x, ctx, |normed, ctx| {
            self.feed_forward.forward(normed, ctx)
        })?;

        Ok((x, weights))
    }
}

impl<T: TensorElem> Module<T> for EncoderBlock<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.self_attention
            .visit_parameters(&join_name(prefix, "self_attention"), f);
        self.feed_forward
            .visit_parameters(&join_name(prefix, "feed_forward"), f);
        for (i, residual) in self.residuals.iter().enumerate() {
            residual.visit_parameters(&join_name(prefix, &format!("residuals.{i}")), f);
        }
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.self_attention
            .visit_parameters_mut(&join_name(prefix, "self_attention"), f);
        self.feed_forward
            .visit_parameters_mut(&join_name(prefix, "feed_forward"), f);
        for (i, residual) in self.residuals.iter_mut().enumerate() {
            residual.visit_parameters_mut(&join_name(prefix, &format!("residuals.{i}")), f);
        }
    }
}

/// `N` encoder blocks sharing one mask, followed by a final LayerNorm.
///
/// With no blocks the stack reduces to the final norm.
#[derive(Debug, Clone)]
pub struct EncoderStack<T: TensorElem> {
    pub layers: Vec<EncoderBlock<T>>,
    pub norm: LayerNorm<T>,
}

impl<T: TensorElem + Float> EncoderStack<T> {
    pub fn new(layers: Vec<EncoderBlock<T>>, norm: LayerNorm<T>) -> Self {
        Self { layers, norm }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn forward(
        &self,
        x: &Tensor<T, 3>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor<T, 3>> {
        let mut x = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            trace!(layer = i, "encoder block");
            x = layer.forward(&x, mask, ctx)?;
        }
        Ok(self.norm.forward(&x)?)
    }

    /// Returns the normalized output and one attention tensor per block, in block order.
    pub fn forward_with_attention(
        &self,
        x: &Tensor<T, 3>,
        mask: Option<&Mask>,
        ctx: &mut ForwardContext,
    ) -> Result<(Tensor<T, 3>, Vec<Tensor<T, 4>>)> {
        let mut x = x.clone();
        let mut attention = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            trace!(layer = i, "encoder block");
            let (out, weights) = layer.forward_with_attention(&x, mask, ctx)?;
            x = out;
            attention.push(weights);
        }
        Ok((self.norm.forward(&x)?, attention))
    }
}

impl<T: TensorElem> Module<T> for EncoderStack<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        for (i, layer) in self.layers.iter().enumerate() {
            layer.visit_parameters(&join_name(prefix, &format!("layers.{i}")), f);
        }
        self.norm.visit_parameters(&join_name(prefix, "norm"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.visit_parameters_mut(&join_name(prefix, &format!("layers.{i}")), f);
        }
        self.norm.visit_parameters_mut(&join_name(prefix, "norm"), f);
    }
}
