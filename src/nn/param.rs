//! Ownership categories for layer state.
//!
//! - [`Parameter`]: owned by exactly one layer, read-only during a forward pass, writable only
//!   through [`Module::visit_parameters_mut`](super::Module::visit_parameters_mut).
//! - [`Buffer`]: computed once at construction and never written again. Backed by an `Arc`, so
//!   clones of a model and concurrent forward calls share one copy.

use crate::tensor::{Tensor, TensorElem};
use std::sync::Arc;

/// A learnable tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter<T: TensorElem, const RANK: usize> {
    value: Tensor<T, RANK>,
}

impl<T: TensorElem, const RANK: usize> Parameter<T, RANK> {
    pub fn new(value: Tensor<T, RANK>) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Tensor<T, RANK> {
        &self.value
    }

    pub fn shape(&self) -> &[usize; RANK] {
        self.value.shape()
    }

    pub(crate) fn visit(&self, name: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        f(name, self.value.shape(), self.value.data());
    }

    pub(crate) fn visit_mut(&mut self, name: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        let shape = *self.value.shape();
        f(name, &shape, self.value.data_mut());
    }
}

/// A write-once, shared, read-only tensor.
#[derive(Debug, Clone)]
pub struct Buffer<T: TensorElem, const RANK: usize> {
    value: Arc<Tensor<T, RANK>>,
}

impl<T: TensorElem, const RANK: usize> Buffer<T, RANK> {
    pub fn new(value: Tensor<T, RANK>) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    pub fn value(&self) -> &Tensor<T, RANK> {
        &self.value
    }

    /// Returns `true` if both buffers point at the same allocation.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Joins a dotted parameter path.
pub(crate) fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_visit_mut_writes_through() {
        let mut p = Parameter::new(Tensor::<f32, 1>::zeros([3]));
        p.visit_mut("w", &mut |name, shape, data| {
            assert_eq!(name, "w");
            assert_eq!(shape, &[3]);
            data.fill(2.0);
        });
        assert_eq!(p.value().data(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_buffer_clone_shares_storage() {
        let a = Buffer::new(Tensor::<f64, 2>::ones([2, 2]));
        let b = a.clone();
        assert!(a.shares_storage_with(&b));

        let c = Buffer::new(Tensor::<f64, 2>::ones([2, 2]));
        assert!(!a.shares_storage_with(&c));
        assert_eq!(a.value(), c.value());
    }

    #[test]
    fn test_join_name() {
        assert_eq!(join_name("", "weight"), "weight");
        assert_eq!(join_name("layers.0", "norm"), "layers.0.norm");
    }
}
