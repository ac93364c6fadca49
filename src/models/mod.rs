//! Model architectures.

pub mod encoder;

pub use encoder::{EncoderConfig, EncoderOutput, TransformerEncoder};
