//! Neural network layers.

pub mod activation;
pub mod dropout;
pub mod embedding;
pub mod linear;
pub mod module;
pub mod norm;
pub mod param;
pub mod transformer;

pub use activation::Activation;
pub use dropout::{Dropout, ForwardContext, Mode};
pub use embedding::Embedding;
pub use linear::Linear;
pub use module::Module;
pub use norm::LayerNorm;
pub use param::{Buffer, Parameter};
