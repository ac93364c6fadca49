//! Transformer encoder building blocks.
//!
//! - [`attention`]: multi-head scaled dot-product attention.
//! - [`feed_forward`]: the position-wise MLP.
//! - [`residual`]: pre-norm residual wrapper.
//! - [`encoder`]: one encoder layer and the stack of them.
//! - [`positional`]: sinusoidal positional encoding.
//! - [`mask`]: attend/forbid masks.

pub mod attention;
pub mod encoder;
pub mod feed_forward;
pub mod mask;
pub mod positional;
pub mod residual;

pub use attention::{scaled_dot_product_attention, AttentionOutput, MultiHeadAttentionBlock};
pub use encoder::{EncoderBlock, EncoderStack};
pub use feed_forward::FeedForwardBlock;
pub use mask::Mask;
pub use positional::PositionalEncoding;
pub use residual::ResidualConnection;
