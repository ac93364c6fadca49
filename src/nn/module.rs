use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A Module trait for Neural Network layers.
///
/// Every layer and model implements it. `Send + Sync` lets one model serve concurrent forward
/// calls; the visitors expose learnable state to code outside the crate (an optimizer or a
/// weight loader) under dotted names such as `encoder.layers.0.self_attention.w_q.weight`.
///
/// Buffers are not parameters and are never visited.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    /// Calls `f(name, shape, data)` once per parameter, in a stable order.
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T]));

    /// Like [`Module::visit_parameters`] with write access to the data.
    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T]));

    /// Total number of learnable scalars.
    fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.visit_parameters("", &mut |_, _, data| count += data.len());
        count
    }
}
