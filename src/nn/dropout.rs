//! Dropout and the per-call forward context.
//!
//! Whether dropout is active is decided by the [`Mode`] carried in a [`ForwardContext`], never
//! by state stored on the layers. The context also owns the random generator, so two callers
//! running forward passes on the same model at the same time never share RNG state.

use crate::error::{EncoderError, Result};
use crate::tensor::{scalar, Tensor, TensorElem};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Train or eval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Eval => write!(f, "eval"),
        }
    }
}

/// State threaded through every forward call.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    mode: Mode,
    rng: StdRng,
}

impl ForwardContext {
    /// Inference context: dropout is the identity.
    pub fn eval() -> Self {
        Self {
            mode: Mode::Eval,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Training context with a seeded generator for dropout masks.
    pub fn train(seed: u64) -> Self {
        Self {
            mode: Mode::Train,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Inverted dropout.
///
/// In training each element is zeroed with probability `p` and survivors are scaled by
/// `1 / (1 - p)`, so the expected value is unchanged. In eval mode it returns its input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f64,
}

impl Dropout {
    /// # Errors
    ///
    /// Returns `EncoderError::InvalidConfig` unless `0 <= p < 1`.
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(EncoderError::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn forward<T, const RANK: usize>(
        &self,
        mut x: Tensor<T, RANK>,
        ctx: &mut ForwardContext,
    ) -> Tensor<T, RANK>
    where
        T: TensorElem + Float,
    {
        if !ctx.is_training() || self.p == 0.0 {
            return x;
        }

        let keep_scale: T = scalar(1.0 / (1.0 - self.p));
        let rng = ctx.rng_mut();
        for v in x.data_mut() {
            if rng.gen::<f64>() < self.p {
                *v = T::zero();
            } else {
                *v *= keep_scale;
            }
        }
        x
    }
}
