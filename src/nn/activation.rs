//! Activation Functions.
//!
//! Activation functions add the non-linearity between the two projections of the
//! position-wise feed-forward sublayer.
//!
//! - **ReLU**: $f(x) = \max(0, x)$. The default.
//! - **GELU**: Gaussian Error Linear Unit, tanh approximation. Smoother than ReLU.

use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Computes ReLU: $\max(0, x)$.
pub fn relu<T: TensorElem + Float>(x: T) -> T {
    if x > T::zero() {
        x
    } else {
        T::zero()
    }
}

/// Computes the GELU (Gaussian Error Linear Unit) activation function.
///
/// $$ \text{GELU}(x) \approx 0.5 x (1 + \tanh[\sqrt{2/\pi} (x + 0.044715 x^3)]) $$
pub fn gelu<T: TensorElem + Float>(x: T) -> T {
    let sqrt_2_over_pi: T = scalar((2.0 / std::f64::consts::PI).sqrt());
    let c: T = scalar(0.044715);
    let half: T = scalar(0.5);

    let inner = sqrt_2_over_pi * (x + c * x * x * x);
    half * x * (T::one() + inner.tanh())
}

/// The non-linearity used inside the feed-forward sublayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
}

impl Activation {
    /// Applies the activation element-wise to a tensor.
    pub fn apply<const RANK: usize, T: TensorElem + Float>(
        &self,
        x: &Tensor<T, RANK>,
    ) -> Tensor<T, RANK> {
        match self {
            Activation::Relu => x.map(relu),
            Activation::Gelu => x.map(gelu),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Gelu => write!(f, "gelu"),
        }
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "gelu" => Ok(Activation::Gelu),
            other => Err(format!("unknown activation '{other}', expected relu or gelu")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_value() {
        assert_eq!(relu(-2.0f32), 0.0);
        assert_eq!(relu(0.0f32), 0.0);
        assert_eq!(relu(3.5f64), 3.5);
    }

    #[test]
    fn test_gelu_value() {
        assert!(gelu(0.0f32).abs() < 1e-6);

        // sqrt(2/pi) = 0.79788, inner = 0.79788 * 1.044715 = 0.83355
        // tanh(0.83355) = 0.6824 -> 0.5 * (1 + 0.6824) = 0.8412
        assert!((gelu(1.0f32) - 0.8412).abs() < 1e-3);
        // Small negative inputs leak through
        assert!(gelu(-0.5f64) < 0.0);
    }

    #[test]
    fn test_activation_apply_tensor() {
        let tensor = Tensor::<f32, 1>::new(vec![-1.0, 0.0, 1.0], [3]).unwrap();

        assert_eq!(Activation::Relu.apply(&tensor).data(), &[0.0, 0.0, 1.0]);

        let g = Activation::Gelu.apply(&tensor);
        assert!((g.data()[2] - 0.8412).abs() < 1e-3);
    }

    #[test]
    fn test_activation_default_and_parse() {
        assert_eq!(Activation::default(), Activation::Relu);
        assert_eq!("GELU".parse::<Activation>().unwrap(), Activation::Gelu);
        assert!("swish".parse::<Activation>().is_err());
        assert_eq!(Activation::Gelu.to_string(), "gelu");
    }

    #[test]
    fn test_activation_serde() {
        let json = serde_json::to_string(&Activation::Gelu).unwrap();
        assert_eq!(json, "\"gelu\"");
        let back: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(back, Activation::Relu);
    }
}
