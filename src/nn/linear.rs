use super::param::{join_name, Parameter};
use super::Module;
use crate::tensor::{scalar, Result, Tensor, TensorElem, TensorError};

use num_traits::Float;
use rand::Rng;
use rayon::prelude::*;

/// Linear Layer: `y = xA^T + b`
///
/// Applied to the last axis of an input of any rank, so `[batch, seq, in]` maps to
/// `[batch, seq, out]` with every position transformed independently.
///
/// # Examples
/// ```rust
/// use encoder_rs::nn::Linear;
/// use encoder_rs::tensor::Tensor;
/// // 10 inputs, 5 outputs
/// let layer = Linear::<f32>::new(
///     Tensor::zeros([5, 10]), // Weights: [out, in]
///     Some(Tensor::zeros([5])) // Bias: [out]
/// );
/// assert_eq!(layer.out_features(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct Linear<T: TensorElem> {
    /// - Shape: `[out_features, in_features]`
    pub weight: Parameter<T, 2>,

    /// - Shape: `[out_features]`
    pub bias: Option<Parameter<T, 1>>,
}

impl<T: TensorElem> Linear<T> {
    /// Creates a new Linear layer from explicit weights.
    pub fn new(weight: Tensor<T, 2>, bias: Option<Tensor<T, 1>>) -> Self {
        Self {
            weight: Parameter::new(weight),
            bias: bias.map(Parameter::new),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Performs the forward pass over the last axis of `x`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if the last axis of `x` is not `in_features`,
    /// or if the bias length is not `out_features`.
    pub fn forward<const RANK: usize>(&self, x: &Tensor<T, RANK>) -> Result<Tensor<T, RANK>> {
        const { assert!(RANK >= 1, "Linear requires rank >= 1") };

        let in_features = self.in_features();
        let out_features = self.out_features();
        if x.shape()[RANK - 1] != in_features {
            return Err(TensorError::ShapeMismatch {
                expected: vec![in_features],
                got: vec![x.shape()[RANK - 1]],
            });
        }

        let rows: usize = x.shape()[..RANK - 1].iter().product();
        let flat_x: Tensor<T, 2> = x.clone().reshape([rows, in_features])?;
        let w_t = self.weight.value().transpose()?;
        let out = flat_x.matmul(&w_t)?;

        let out = match &self.bias {
            Some(bias) => Self::add_bias(out, bias.value())?,
            None => out,
        };

        let mut out_shape = *x.shape();
        out_shape[RANK - 1] = out_features;
        out.reshape(out_shape)
    }

    fn add_bias(mut x: Tensor<T, 2>, bias: &Tensor<T, 1>) -> Result<Tensor<T, 2>> {
        let [_, cols] = *x.shape();
        let [b_cols] = *bias.shape();

        if cols != b_cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![cols],
                got: vec![b_cols],
            });
        }
        if x.size() == 0 {
            return Ok(x);
        }

        x.data_mut().par_chunks_mut(cols).for_each(|row| {
            for (r, b) in row.iter_mut().zip(bias.data().iter()) {
                *r += *b;
            }
        });

        Ok(x)
    }
}

impl<T: TensorElem + Float> Linear<T> {
    /// Creates a biased layer with weights and bias drawn from `U(-1/√in, 1/√in)`.
    pub fn init<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f64).sqrt();
        Self::new(
            uniform([out_features, in_features], bound, rng),
            Some(uniform([out_features], bound, rng)),
        )
    }
}

/// Fills a tensor with samples from `U(-bound, bound)`.
pub(crate) fn uniform<T, const RANK: usize, R>(
    shape: [usize; RANK],
    bound: f64,
    rng: &mut R,
) -> Tensor<T, RANK>
where
    T: TensorElem + Float,
    R: Rng + ?Sized,
{
    let mut t = Tensor::zeros(shape);
    for v in t.data_mut() {
        *v = scalar(rng.gen_range(-bound..=bound));
    }
    t
}

impl<T: TensorElem> Module<T> for Linear<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.weight.visit(&join_name(prefix, "weight"), f);
        if let Some(bias) = &self.bias {
            bias.visit(&join_name(prefix, "bias"), f);
        }
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.weight.visit_mut(&join_name(prefix, "weight"), f);
        if let Some(bias) = &mut self.bias {
            bias.visit_mut(&join_name(prefix, "bias"), f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_forward_rank2() {
        // Input: [2, 3], Weight: [4, 3], Bias: [4]
        let input = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();

        let weight_data = vec![
            1.0, 0.0, 0.0, // 1st neuron
            0.0, 1.0, 0.0, // 2nd neuron
            0.0, 0.0, 1.0, // 3rd neuron
            1.0, 1.0, 1.0, // 4th neuron
        ];
        let weight = Tensor::<f32, 2>::new(weight_data, [4, 3]).unwrap();
        let bias = Tensor::<f32, 1>::new(vec![0.1, 0.2, 0.3, 0.4], [4]).unwrap();

        let layer = Linear::new(weight, Some(bias));
        let output = layer.forward(&input).unwrap();

        assert_eq!(output.shape(), &[2, 4]);
        // Row 1: [1, 2, 3] -> [1.1, 2.2, 3.3, 6.4]
        let out_data = output.data();
        assert!((out_data[0] - 1.1).abs() < 1e-6);
        assert!((out_data[1] - 2.2).abs() < 1e-6);
        assert!((out_data[2] - 3.3).abs() < 1e-6);
        assert!((out_data[3] - 6.4).abs() < 1e-6);
    }

    #[test]
    fn test_linear_forward_rank3() {
        // Input: [1, 2, 3] (Batch=1, Seq=2, In=3)
        let input = Tensor::<f32, 3>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 2, 3]).unwrap();

        let weight_data = vec![
            1.0, 1.0, 1.0, // 1st neuron
            2.0, 2.0, 2.0, // 2nd neuron
        ];
        let weight = Tensor::<f32, 2>::new(weight_data, [2, 3]).unwrap();

        let layer = Linear::new(weight, None);
        let output = layer.forward(&input).unwrap();

        assert_eq!(output.shape(), &[1, 2, 2]);
        // Row 1: sum 6 -> [6, 12]; Row 2: sum 15 -> [15, 30]
        assert_eq!(output.data(), &[6.0, 12.0, 15.0, 30.0]);
    }

    #[test]
    fn test_linear_forward_rank4() {
        let input = Tensor::<f64, 4>::ones([2, 1, 3, 2]);
        let weight = Tensor::<f64, 2>::new(vec![1.0, -1.0, 0.5, 0.5, 2.0, 0.0], [3, 2]).unwrap();
        let bias = Tensor::<f64, 1>::new(vec![0.0, 1.0, 0.0], [3]).unwrap();

        let out = Linear::new(weight, Some(bias)).forward(&input).unwrap();
        assert_eq!(out.shape(), &[2, 1, 3, 3]);
        for row in out.data().chunks(3) {
            assert_eq!(row, &[0.0, 2.0, 2.0]);
        }
    }

    #[test]
    fn test_linear_shape_mismatch() {
        let weight = Tensor::<f32, 2>::zeros([5, 10]);
        let bias = Tensor::<f32, 1>::zeros([4]); // Wrong size
        let layer = Linear::new(weight, Some(bias));

        let input = Tensor::<f32, 2>::zeros([2, 10]);
        assert!(matches!(
            layer.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));

        let input = Tensor::<f32, 3>::zeros([1, 2, 9]);
        assert!(matches!(
            layer.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_linear_init_is_seeded_and_bounded() {
        let a = Linear::<f32>::init(16, 4, &mut StdRng::seed_from_u64(7));
        let b = Linear::<f32>::init(16, 4, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.weight, b.weight);
        assert_eq!(a.weight.shape(), &[4, 16]);
        assert!(a.weight.value().data().iter().all(|v| v.abs() <= 0.25));
        assert_eq!(a.num_parameters(), 4 * 16 + 4);
    }

    #[test]
    fn test_linear_parameter_names() {
        let layer = Linear::<f32>::new(Tensor::zeros([2, 2]), Some(Tensor::zeros([2])));
        let mut names = Vec::new();
        layer.visit_parameters("proj", &mut |name, shape, _| {
            names.push((name.to_string(), shape.to_vec()))
        });
        assert_eq!(
            names,
            vec![
                ("proj.weight".to_string(), vec![2, 2]),
                ("proj.bias".to_string(), vec![2]),
            ]
        );
    }
}
