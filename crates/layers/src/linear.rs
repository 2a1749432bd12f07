//! Affine projection layer.
//!
//! `Linear` computes `y = x Wᵀ + b` for inputs shaped `(batch, in_dim)` and
//! returns `(batch, out_dim)`. The weight is stored as `(out_dim, in_dim)` and
//! the optional bias as `(out_dim)`, so the gradient of a loss with respect to
//! the weight for a single row is the outer product `gᵀ·a` of the output
//! gradient and the input activation. Each parameter is independently
//! trainable or frozen, see [`Parameter`].

use candle_core::{DType, Device, Error, Result, Tensor};

use crate::{checks, parameter::Parameter, sequential::Layer};

/// Configuration of a dense affine layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a bias vector is added to the projection.
    pub bias: bool,
    /// Whether freshly built parameters are registered as trainable.
    pub trainable: bool,
}

impl LinearConfig {
    /// Creates a trainable configuration with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
            trainable: true,
        }
    }

    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }

    pub fn frozen(mut self) -> Self {
        self.trainable = false;
        self
    }

    /// Number of scalar parameters (weight plus optional bias).
    pub fn parameter_count(&self) -> usize {
        let bias = if self.bias { self.output_dim } else { 0 };
        self.output_dim * self.input_dim + bias
    }
}

/// How [`Linear::with_init`] draws fresh parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearInit {
    /// `U(-1/sqrt(in_dim), 1/sqrt(in_dim))` for weight and bias.
    FanInUniform,
    /// Glorot uniform weight, zero bias.
    XavierUniform,
    /// `N(0, std²)` weight, zero bias.
    Normal { std: f64 },
}

impl LinearInit {
    fn weight(&self, out_dim: usize, in_dim: usize, device: &Device) -> Result<Tensor> {
        let shape = (out_dim, in_dim);
        match *self {
            LinearInit::FanInUniform => uniform(fan_in_bound(in_dim), shape, device),
            LinearInit::XavierUniform => {
                let bound = (6.0 / (in_dim + out_dim).max(1) as f64).sqrt();
                uniform(bound, shape, device)
            }
            LinearInit::Normal { std } => Tensor::randn(0f32, std as f32, shape, device),
        }
    }

    fn bias(&self, out_dim: usize, in_dim: usize, device: &Device) -> Result<Tensor> {
        match self {
            LinearInit::FanInUniform => uniform(fan_in_bound(in_dim), out_dim, device),
            _ => Tensor::zeros(out_dim, DType::F32, device),
        }
    }
}

fn fan_in_bound(in_dim: usize) -> f64 {
    1.0 / (in_dim.max(1) as f64).sqrt()
}

fn uniform<S: Into<candle_core::Shape>>(bound: f64, shape: S, device: &Device) -> Result<Tensor> {
    Tensor::rand(-bound as f32, bound as f32, shape, device)
}

/// Dense affine layer with independently trainable weight and bias.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Parameter,
    bias: Option<Parameter>,
}

impl Linear {
    /// Constructs a layer from explicit values; trainability follows `config`.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        let weight = Parameter::new(&weight, config.trainable)?;
        let bias = bias
            .map(|bias| Parameter::new(&bias, config.trainable))
            .transpose()?;
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Builds a layer with randomly initialised parameters following `init`.
    pub fn with_init(
        config: LinearConfig,
        init: &LinearInit,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let weight = init
            .weight(config.output_dim, config.input_dim, device)?
            .to_dtype(dtype)?;
        let bias = if config.bias {
            let bias = init.bias(config.output_dim, config.input_dim, device)?;
            Some(bias.to_dtype(dtype)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Changes which parameters receive gradients. Values are preserved.
    pub fn set_trainable(&mut self, weight: bool, bias: bool) -> Result<()> {
        self.weight = self.weight.with_trainable(weight)?;
        if let Some(existing) = self.bias.as_mut() {
            *existing = existing.with_trainable(bias)?;
        }
        self.config.trainable = weight || (self.config.bias && bias);
        Ok(())
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.config.output_dim
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear.weight",
            weight,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_rank("linear.bias", tensor, 1)?;
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])?;
                checks::expect_dtype_in(
                    "linear.bias",
                    tensor,
                    &[DType::F16, DType::BF16, DType::F32, DType::F64],
                )
            }
            (false, Some(_)) => Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => Ok(()),
        }
    }
}

impl Layer for Linear {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        checks::expect_batch_features("linear.input", xs, self.config.input_dim)?;
        let weight = self.weight.as_tensor();
        checks::expect_same_dtype("linear.input", xs, "linear.weight", weight)?;
        let output = xs.matmul(&weight.t()?)?;
        match &self.bias {
            Some(bias) => output.broadcast_add(bias.as_tensor()),
            None => Ok(output),
        }
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    fn as_linear(&self) -> Option<&Linear> {
        Some(self)
    }
}
