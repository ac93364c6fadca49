//! Encoder configuration.

use crate::error::{EncoderError, Result};
use crate::nn::Activation;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_dropout() -> f64 {
    0.1
}

fn default_eps() -> f64 {
    1e-6
}

/// Hyper-parameters of a [`TransformerEncoder`](super::TransformerEncoder).
///
/// Loadable from JSON; `dropout`, `eps`, `activation` and `seed` may be omitted.
///
/// ```rust
/// use encoder_rs::models::EncoderConfig;
///
/// let config = EncoderConfig::from_json_str(
///     r#"{"d_model": 16, "vocab_size": 100, "max_seq_len": 32,
///         "num_heads": 4, "num_layers": 2, "d_ff": 64}"#,
/// ).unwrap();
/// assert_eq!(config.d_k(), 4);
/// assert_eq!(config.eps, 1e-6);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Model dimension
    pub d_model: usize,
    /// Number of rows in the embedding table
    pub vocab_size: usize,
    /// Positional table capacity
    pub max_seq_len: usize,
    /// Number of attention heads
    pub num_heads: usize,
    /// Number of encoder blocks
    pub num_layers: usize,
    /// Hidden width of the feed-forward sublayer
    pub d_ff: usize,
    /// Dropout probability, applied in training mode only
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Added to the standard deviation in every LayerNorm
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default)]
    pub activation: Activation,
    /// Seed for parameter initialisation
    #[serde(default)]
    pub seed: u64,
}

impl EncoderConfig {
    pub fn new(
        d_model: usize,
        vocab_size: usize,
        max_seq_len: usize,
        num_heads: usize,
        num_layers: usize,
        d_ff: usize,
    ) -> Self {
        Self {
            d_model,
            vocab_size,
            max_seq_len,
            num_heads,
            num_layers,
            d_ff,
            dropout: default_dropout(),
            eps: default_eps(),
            activation: Activation::default(),
            seed: 0,
        }
    }

    /// The classic base encoder: 512 wide, 8 heads, 6 layers, 2048 hidden.
    pub fn base() -> Self {
        Self::new(512, 32_000, 512, 8, 6, 2048)
    }

    /// A small model for tests and examples.
    pub fn tiny() -> Self {
        Self::new(8, 32, 16, 2, 2, 16)
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    /// Per-head width.
    pub fn d_k(&self) -> usize {
        if self.num_heads == 0 {
            0
        } else {
            self.d_model / self.num_heads
        }
    }

    /// Checks every construction invariant.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::InvalidConfig` naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("d_model", self.d_model),
            ("vocab_size", self.vocab_size),
            ("max_seq_len", self.max_seq_len),
            ("num_heads", self.num_heads),
            ("d_ff", self.d_ff),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(EncoderError::InvalidConfig(format!(
                    "{name} must be positive"
                )));
            }
        }

        if self.d_model % self.num_heads != 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            )));
        }

        if self.d_model % 2 != 0 {
            return Err(EncoderError::InvalidConfig(format!(
                "d_model ({}) must be even for sinusoidal positions",
                self.d_model
            )));
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(EncoderError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(EncoderError::InvalidConfig(format!(
                "eps must be positive and finite, got {}",
                self.eps
            )));
        }

        Ok(())
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::base()
    }
}
