//! # encoder-rs
//!
//! `encoder-rs` is a pure Rust forward pass for the encoder half of an attention-based
//! sequence model: token ids in, contextual vectors out.
//!
//! It runs on **CPU only**, parallelised with `rayon`, and has no autograd. Parameters are
//! exposed through [`nn::Module`] so an external optimizer can read and update them.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Core N-dimensional tensor and its operations.
//! - [`nn`]: Layers (Linear, LayerNorm, Embedding, Dropout) and the transformer blocks.
//! - [`models`]: The assembled [`models::TransformerEncoder`] and its configuration.
//! - [`error`]: The crate error type.
//!
//! ## Example
//!
//! ```rust
//! use encoder_rs::models::{EncoderConfig, TransformerEncoder};
//! use encoder_rs::nn::ForwardContext;
//! use encoder_rs::tensor::Tensor;
//!
//! let config = EncoderConfig::tiny();
//! let model = TransformerEncoder::<f32>::from_config(&config).unwrap();
//!
//! let ids = Tensor::<usize, 2>::new(vec![1, 2, 3], [1, 3]).unwrap();
//! let out = model.forward(&ids, None, &mut ForwardContext::eval()).unwrap();
//! assert_eq!(out.shape(), &[1, 3, config.d_model]);
//! ```

pub mod error;
pub mod models;
pub mod nn;
pub mod tensor;

pub use error::{EncoderError, Result};
pub use tensor::Tensor;
