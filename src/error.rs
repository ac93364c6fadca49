use crate::tensor::TensorError;
use thiserror::Error;

/// Error type for building and running the encoder.
#[derive(Error, Debug)]
pub enum EncoderError {
    /// A configuration value violates a construction invariant.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A token id does not index a row of the embedding table.
    #[error("Token id {token} out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    /// A sequence is longer than the positional table.
    #[error("Sequence length {requested} exceeds positional capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// An input or mask has the wrong shape for this model.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("Failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EncoderError>;
