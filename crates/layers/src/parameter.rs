//! Parameter handles that are either tracked by candle's autodiff or frozen.
//!
//! Trainable parameters wrap a [`Var`], so any loss built from them produces a
//! gradient entry in the [`GradStore`](candle_core::backprop::GradStore)
//! returned by `backward`. Frozen parameters hold a detached tensor that is
//! not a `Var`. Candle may still record a gradient for such a tensor when it
//! is an operand of a tracked op, so gradients must only be looked up for
//! trainable parameters (see `Sequential::trainable_parameters`).

use candle_core::{Result, Tensor, Var};

#[derive(Debug, Clone)]
pub enum Parameter {
    /// Receives gradients during backpropagation.
    Trainable(Var),
    /// Participates in the forward pass only.
    Frozen(Tensor),
}

impl Parameter {
    /// Wraps `tensor` as trainable or frozen depending on `trainable`.
    pub fn new(tensor: &Tensor, trainable: bool) -> Result<Self> {
        if trainable {
            Ok(Self::Trainable(Var::from_tensor(tensor)?))
        } else {
            Ok(Self::Frozen(tensor.detach()))
        }
    }

    pub fn as_tensor(&self) -> &Tensor {
        match self {
            Parameter::Trainable(var) => var.as_tensor(),
            Parameter::Frozen(tensor) => tensor,
        }
    }

    pub fn is_trainable(&self) -> bool {
        matches!(self, Parameter::Trainable(_))
    }

    pub fn elem_count(&self) -> usize {
        self.as_tensor().elem_count()
    }

    /// Returns a copy with the requested trainability, reusing the values.
    pub fn with_trainable(&self, trainable: bool) -> Result<Self> {
        if self.is_trainable() == trainable {
            return Ok(self.clone());
        }
        Self::new(self.as_tensor(), trainable)
    }
}
