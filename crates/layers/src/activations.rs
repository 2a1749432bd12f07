//! Pointwise activations placed between affine layers.
//!
//! Activations own no parameters, so they are never observed when per-sample
//! gradients are reconstructed; they only shape the output gradient flowing
//! into the preceding affine layer. All of them keep the input layout.
//!
//! # Built-in formulas
//!
//! * **GELU** uses the erf form `0.5 * x * (1 + erf(x / sqrt(2)))`.
//! * **SiLU** computes `x * sigmoid(x)` via candle's fused kernel.
//! * **Tanh** uses the elementwise kernel.
//! * **Sigmoid** uses `candle_nn::ops::sigmoid`, whose backward is computed
//!   from the output and stays finite for large negative inputs.

use std::fmt;

use candle_core::{Result, Tensor};

use crate::{parameter::Parameter, sequential::Layer};

/// Identifies which non-linearity is implemented by an [`Activation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Identity function, useful for wiring stacks of consecutive affine layers.
    Identity,
    Relu,
    Gelu,
    Silu,
    Tanh,
    Sigmoid,
}

impl ActivationKind {
    /// Parses lowercase names such as `"relu"` or `"gelu"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "identity" | "none" => Some(Self::Identity),
            "relu" => Some(Self::Relu),
            "gelu" => Some(Self::Gelu),
            "silu" | "swish" => Some(Self::Silu),
            "tanh" => Some(Self::Tanh),
            "sigmoid" => Some(Self::Sigmoid),
            _ => None,
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationKind::Identity => "identity",
            ActivationKind::Relu => "relu",
            ActivationKind::Gelu => "gelu",
            ActivationKind::Silu => "silu",
            ActivationKind::Tanh => "tanh",
            ActivationKind::Sigmoid => "sigmoid",
        };
        f.write_str(name)
    }
}

/// Parameter-free pointwise layer backed by candle kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    kind: ActivationKind,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Self { kind }
    }

    pub fn relu() -> Self {
        Self::new(ActivationKind::Relu)
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }
}

impl Layer for Activation {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self.kind {
            ActivationKind::Identity => Ok(xs.clone()),
            ActivationKind::Relu => xs.relu(),
            ActivationKind::Gelu => xs.gelu_erf(),
            ActivationKind::Silu => xs.silu(),
            ActivationKind::Tanh => xs.tanh(),
            ActivationKind::Sigmoid => candle_nn::ops::sigmoid(xs),
        }
    }

    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }
}
