//! End-to-end validation: build a model from a [`ValidationConfig`], draw a
//! batch, and compare the reconstructed per-sample gradients against the
//! per-sample reference.

use std::time::{Duration, Instant};

use candle_core::{Device, Tensor};
use layers::{Activation, ActivationKind, Linear, LinearConfig, Sequential};
use rand::{
    distributions::{Distribution, Uniform},
    rngs::StdRng,
    SeedableRng,
};
use rand_distr::StandardNormal;

use crate::{
    capture::GhostCapture,
    compare::{compare, Comparison},
    config::{LayerSpec, LossConfig, ModelSpec, ValidationConfig},
    reference::reference_per_sample_gradients,
    GhostError, Result,
};

/// Outcome of one validation run.
#[derive(Debug)]
pub struct ValidationReport {
    pub ghost: Tensor,
    pub reference: Tensor,
    pub comparison: Comparison,
    pub tolerance: f64,
    /// Trainable scalars in the model, i.e. the expected row width.
    pub parameter_count: usize,
    pub ghost_elapsed: Duration,
    pub reference_elapsed: Duration,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.comparison.within(self.tolerance)
    }
}

/// Builds a [`Sequential`] from `spec`, drawing weights and biases from
/// `U(-1/sqrt(in_dim), 1/sqrt(in_dim))`.
pub fn build_model(spec: &ModelSpec, rng: &mut StdRng, device: &Device) -> Result<Sequential> {
    let mut model = Sequential::new();
    let mut width = spec.input_dim;
    for (index, layer) in spec.layers.iter().enumerate() {
        let name = spec.layer_name(index);
        match layer {
            LayerSpec::Linear {
                out_dim,
                bias,
                trainable,
                ..
            } => {
                let config = LinearConfig {
                    input_dim: width,
                    output_dim: *out_dim,
                    bias: *bias,
                    trainable: *trainable,
                };
                let bound = 1.0 / (width.max(1) as f32).sqrt();
                let uniform = Uniform::new_inclusive(-bound, bound);
                let weight = sample_tensor(rng, &uniform, (*out_dim, width), device)?;
                let bias = if *bias {
                    Some(sample_tensor(rng, &uniform, *out_dim, device)?)
                } else {
                    None
                };
                model.push(name, Linear::new(config, weight, bias)?);
                width = *out_dim;
            }
            LayerSpec::Activation { activation, .. } => {
                let kind = ActivationKind::from_name(activation).ok_or_else(|| {
                    GhostError::InvalidInput(format!("unsupported activation '{activation}'"))
                })?;
                model.push(name, Activation::new(kind));
            }
        }
    }
    Ok(model)
}

/// Draws `(inputs, targets)` for the configured batch size and loss.
pub fn sample_batch(
    config: &ValidationConfig,
    rng: &mut StdRng,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let batch = config.data.batch_size;
    let inputs = sample_tensor(rng, &StandardNormal, (batch, config.model.input_dim), device)?;
    let outputs = config.model.output_dim();
    let targets = match config.loss {
        LossConfig::CrossEntropy { .. } => {
            let classes = Uniform::new(0u32, outputs as u32);
            let labels: Vec<u32> = (0..batch).map(|_| classes.sample(rng)).collect();
            Tensor::from_vec(labels, batch, device)?
        }
        LossConfig::Mse => sample_tensor(rng, &StandardNormal, (batch, outputs), device)?,
    };
    Ok((inputs, targets))
}

fn sample_tensor<D, S>(rng: &mut StdRng, dist: &D, shape: S, device: &Device) -> Result<Tensor>
where
    D: Distribution<f32>,
    S: Into<candle_core::Shape>,
{
    let shape = shape.into();
    let values: Vec<f32> = (0..shape.elem_count()).map(|_| dist.sample(rng)).collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}

/// Runs both gradient engines on the configured scenario and compares them.
pub fn run_validation(config: &ValidationConfig, device: &Device) -> Result<ValidationReport> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.data.seed);
    let model = build_model(&config.model, &mut rng, device)?;
    let (inputs, targets) = sample_batch(config, &mut rng, device)?;
    let loss = config.loss.build()?;
    log::info!(
        "validation run: layers={:?} batch={} parameters={}",
        model,
        config.data.batch_size,
        model.trainable_parameter_count()
    );

    let mut capture = GhostCapture::new(&model)?;
    let started = Instant::now();
    let ghost = capture.per_sample_grads(&inputs, &targets, loss.as_ref())?;
    let ghost_elapsed = started.elapsed();

    let started = Instant::now();
    let reference = reference_per_sample_gradients(&model, &inputs, &targets, loss.as_ref())?;
    let reference_elapsed = started.elapsed();

    let comparison = compare(&ghost, &reference)?;
    log::info!(
        "validation result: shape={:?} max_abs_diff={:.3e} tolerance={:.1e}",
        comparison.shape,
        comparison.max_abs_diff,
        config.tolerance
    );

    Ok(ValidationReport {
        ghost,
        reference,
        comparison,
        tolerance: config.tolerance,
        parameter_count: model.trainable_parameter_count(),
        ghost_elapsed,
        reference_elapsed,
    })
}
