use super::param::{join_name, Parameter};
use super::Module;
use crate::tensor::{scalar, Result, Tensor, TensorElem, TensorError};
use num_traits::Float;
use rayon::prelude::*;

/// Layer Normalization.
///
/// Normalizes each row of the last dimension with its mean and *unbiased* standard deviation,
/// then applies a single learned scale and shift shared by every feature:
///
/// `y = scale * (x - mean) / (std + eps) + bias`
///
/// `eps` is added to the standard deviation, not to the variance. A row of length 1 has a
/// standard deviation of 0.
#[derive(Debug, Clone)]
pub struct LayerNorm<T: TensorElem> {
    /// Gamma, initialised to one. Shape `[1]`, broadcast over the features.
    pub scale: Parameter<T, 1>,
    /// Beta, initialised to zero. Shape `[1]`, broadcast over the features.
    pub bias: Parameter<T, 1>,
    pub eps: T,
    features: usize,
}

impl<T: TensorElem + Float> LayerNorm<T> {
    /// Creates an identity-initialised layer over `features`.
    pub fn new(features: usize, eps: T) -> Self {
        Self::from_parts(features, T::one(), T::zero(), eps)
    }

    /// Creates a layer with explicit scale and bias.
    pub fn from_parts(features: usize, scale: T, bias: T, eps: T) -> Self {
        Self {
            scale: Parameter::new(Tensor::full([1], scale)),
            bias: Parameter::new(Tensor::full([1], bias)),
            eps,
            features,
        }
    }

    pub fn features(&self) -> usize {
        self.features
    }

    /// Normalizes over the last dimension.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the last dimension does not match `features`.
    pub fn forward<const RANK: usize>(&self, x: &Tensor<T, RANK>) -> Result<Tensor<T, RANK>> {
        const { assert!(RANK >= 1, "LayerNorm requires rank >= 1") };

        let shape = x.shape();
        let last_dim = shape[RANK - 1];
        if last_dim != self.features {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.features],
                got: vec![last_dim],
            });
        }

        let mut out = Tensor::zeros(*shape);
        if out.size() == 0 {
            return Ok(out);
        }

        let n: T = scalar(last_dim as f64);
        let dof: T = scalar(last_dim.saturating_sub(1) as f64);
        let gamma = self.scale.value().data()[0];
        let beta = self.bias.value().data()[0];

        out.data_mut()
            .par_chunks_mut(last_dim)
            .zip(x.data().par_chunks(last_dim))
            .for_each(|(out_row, in_row)| {
                let mean = in_row.iter().fold(T::zero(), |acc, &v| acc + v) / n;

                let std = if last_dim > 1 {
                    let sum_sq_diff = in_row.iter().fold(T::zero(), |acc, &v| {
                        let diff = v - mean;
                        acc + diff * diff
                    });
                    (sum_sq_diff / dof).sqrt()
                } else {
                    T::zero()
                };
                let inv = T::one() / (std + self.eps);

                for (o, &v) in out_row.iter_mut().zip(in_row) {
                    *o = gamma * (v - mean) * inv + beta;
                }
            });

        debug_assert!(out.all_finite(), "layer norm produced non-finite values");
        Ok(out)
    }
}

impl<T: TensorElem> Module<T> for LayerNorm<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.scale.visit(&join_name(prefix, "scale"), f);
        self.bias.visit(&join_name(prefix, "bias"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.scale.visit_mut(&join_name(prefix, "scale"), f);
        self.bias.visit_mut(&join_name(prefix, "bias"), f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layernorm_forward() {
        // Input: [1.0, 2.0, 3.0]
        // Mean: 2.0
        // Unbiased var: ((1-2)^2 + 0 + (3-2)^2) / 2 = 1 -> std 1
        // Norm: [-1, 0, 1] / (1 + eps)
        let input = Tensor::<f64, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        let norm = LayerNorm::new(3, 1e-6);

        let output = norm.forward(&input).unwrap();
        let expected = [-1.0 / (1.0 + 1e-6), 0.0, 1.0 / (1.0 + 1e-6)];
        for (got, exp) in output.data().iter().zip(expected.iter()) {
            assert!((got - exp).abs() < 1e-12);
        }
    }

    #[test]
    fn test_layernorm_scale_and_bias() {
        let input = Tensor::<f32, 2>::new(vec![1.0, 3.0, 10.0, 20.0], [2, 2]).unwrap();
        let norm = LayerNorm::from_parts(2, 2.0, 0.5, 1e-6);

        // Each row is [-c, c] with unbiased std sqrt(2)c, normalized to [-1/√2, 1/√2]
        let out = norm.forward(&input).unwrap();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        let expected = [0.5 - 2.0 * h, 0.5 + 2.0 * h, 0.5 - 2.0 * h, 0.5 + 2.0 * h];
        for (got, exp) in out.data().iter().zip(expected.iter()) {
            assert!((got - exp).abs() < 1e-4, "{got} vs {exp}");
        }
    }

    #[test]
    fn test_layernorm_constant_row_is_finite() {
        let input = Tensor::<f32, 2>::full([2, 4], 7.0);
        let out = LayerNorm::new(4, 1e-6).forward(&input).unwrap();
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_layernorm_single_feature() {
        let input = Tensor::<f32, 2>::new(vec![5.0, -3.0], [2, 1]).unwrap();
        let out = LayerNorm::new(1, 1e-6).forward(&input).unwrap();
        assert_eq!(out.data(), &[0.0, 0.0]);
    }

    #[test]
    fn test_layernorm_shape_mismatch() {
        let norm = LayerNorm::<f32>::new(4, 1e-5);
        let input = Tensor::<f32, 2>::zeros([2, 3]);
        assert!(matches!(
            norm.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_layernorm_parameters() {
        let norm = LayerNorm::<f32>::new(6, 1e-6);
        assert_eq!(norm.num_parameters(), 2);
        assert_eq!(norm.features(), 6);

        let mut seen = Vec::new();
        norm.visit_parameters("n", &mut |name, shape, data| {
            seen.push((name.to_string(), shape.to_vec(), data.to_vec()));
        });
        assert_eq!(
            seen,
            vec![
                ("n.scale".to_string(), vec![1], vec![1.0]),
                ("n.bias".to_string(), vec![1], vec![0.0]),
            ]
        );
    }

    #[test]
    fn test_layernorm_updated_scale_applies_to_every_feature() {
        let mut norm = LayerNorm::<f64>::new(3, 1e-6);
        norm.visit_parameters_mut("", &mut |name, _, data| match name {
            "scale" => data[0] = 3.0,
            "bias" => data[0] = 1.0,
            _ => {}
        });

        let input = Tensor::<f64, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        let out = norm.forward(&input).unwrap();
        let d = 3.0 / (1.0 + 1e-6);
        for (got, exp) in out.data().iter().zip([1.0 - d, 1.0, 1.0 + d]) {
            assert!((got - exp).abs() < 1e-12);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "layer norm produced non-finite values")]
    fn test_layernorm_nan_input_trips_finite_check() {
        let input = Tensor::<f32, 2>::new(vec![1.0, f32::NAN], [1, 2]).unwrap();
        let _ = LayerNorm::new(2, 1e-6).forward(&input);
    }
}
