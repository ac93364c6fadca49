use crate::error::Result;
use crate::nn::dropout::{Dropout, ForwardContext};
use crate::nn::norm::LayerNorm;
use crate::nn::param::join_name;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorElem};
use num_traits::Float;

/// Pre-norm residual wrapper: `x + dropout(sublayer(norm(x)))`.
///
/// The sublayer is any closure, so the same wrapper serves attention and feed-forward.
#[derive(Debug, Clone)]
pub struct ResidualConnection<T: TensorElem> {
    pub norm: LayerNorm<T>,
    dropout: Dropout,
}

impl<T: TensorElem + Float> ResidualConnection<T> {
    pub fn new(features: usize, eps: T, dropout: Dropout) -> Self {
        Self {
            norm: LayerNorm::new(features, eps),
            dropout,
        }
    }

    pub fn apply<F>(
        &self,
        x: &Tensor<T, 3>,
        ctx: &mut ForwardContext,
        sublayer: F,
    ) -> Result<Tensor<T, 3>>
    where
        F: FnOnce(&Tensor<T, 3>, &mut ForwardContext) -> Result<Tensor<T, 3>>,
    {
        let (out, ()) = self.apply_with(x, ctx, |normed, ctx| Ok((sublayer(normed, ctx)?, ())))?;
        Ok(out)
    }

    /// Like [`ResidualConnection::apply`], passing through a side value from the sublayer.
    pub fn apply_with<R, F>(
        &self,
        x: &Tensor<T, 3>,
        ctx: &mut ForwardContext,
        sublayer: F,
    ) -> Result<(Tensor<T, 3>, R)>
    where
        F: FnOnce(&Tensor<T, 3>, &mut ForwardContext) -> Result<(Tensor<T, 3>, R)>,
    {
        let normed = self.norm.forward(x)?;
        let (y, extra) = sublayer(&normed, ctx)?;
        let y = self.dropout.forward(y, ctx);
        Ok(((x + &y)?, extra))
    }
}

impl<T: TensorElem> Module<T> for ResidualConnection<T> {
    fn visit_parameters(&self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &[T])) {
        self.norm.visit_parameters(&join_name(prefix, "norm"), f);
    }

    fn visit_parameters_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, &[usize], &mut [T])) {
        self.norm.visit_parameters_mut(&join_name(prefix, "norm"), f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residual_adds_original_input() {
        let residual = ResidualConnection::<f64>::new(2, 1e-6, Dropout::new(0.0).unwrap());
        let x = Tensor::<f64, 3>::new(vec![1.0, 3.0], [1, 1, 2]).unwrap();

        // norm([1, 3]) = [-1/√2, 1/√2] (approximately); sublayer doubles it
        let out = residual
            .apply(&x, &mut ForwardContext::eval(), |n, _| Ok(n.scale(2.0)))
            .unwrap();

        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((out.data()[0] - (1.0 - 2.0 * h)).abs() < 1e-5);
        assert!((out.data()[1] - (3.0 + 2.0 * h)).abs() < 1e-5);
    }

    #[test]
    fn test_residual_zero_sublayer_is_identity() {
        let residual = ResidualConnection::<f32>::new(3, 1e-6, Dropout::new(0.2).unwrap());
        let x = Tensor::<f32, 3>::new(vec![0.5, -1.0, 2.0], [1, 1, 3]).unwrap();

        let out = residual
            .apply(&x, &mut ForwardContext::train(3), |n, _| Ok(Tensor::zeros(*n.shape())))
            .unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn test_residual_apply_with_passes_side_value() {
        let residual = ResidualConnection::<f32>::new(2, 1e-6, Dropout::new(0.0).unwrap());
        let x = Tensor::<f32, 3>::ones([1, 2, 2]);

        let (_, seen) = residual
            .apply_with(&x, &mut ForwardContext::eval(), |n, _| {
                Ok((n.clone(), n.shape()[1]))
            })
            .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_residual_propagates_sublayer_error() {
        let residual = ResidualConnection::<f32>::new(2, 1e-6, Dropout::new(0.0).unwrap());
        let x = Tensor::<f32, 3>::ones([1, 1, 2]);

        let res = residual.apply(&x, &mut ForwardContext::eval(), |_, _| {
            Err(crate::error::EncoderError::InvalidConfig("boom".into()))
        });
        assert!(res.is_err());
    }
}
