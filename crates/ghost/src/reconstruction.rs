//! Per-sample gradients from one batched forward/backward pass.
//!
//! For an affine layer `y = x Wᵀ + b` and a loss that is a sum of per-sample
//! terms, row `i` of the output gradient `G = ∂L/∂y` only depends on sample
//! `i`. Sample `i`'s weight gradient is therefore the outer product
//! `G[i]ᵀ · A[i]` of that row with the captured input row `A[i]`, and its bias
//! gradient is `G[i]` itself.

use candle_core::Tensor;

use crate::{
    capture::GhostCapture,
    loss::{ensure_per_sample, PerSampleLoss},
    GhostError, Result,
};

impl<'a> GhostCapture<'a> {
    /// Computes `(batch, P)` per-sample gradients with a single backward pass.
    ///
    /// Columns follow the tracked layers in model order; within a layer the
    /// flattened `(out_dim, in_dim)` weight gradient precedes the bias
    /// gradient, and frozen parameters contribute no columns.
    ///
    /// `loss` must return one unreduced value per sample. The result matches
    /// [`reference_per_sample_gradients`](crate::reference_per_sample_gradients)
    /// only when the loss has no cross-sample coupling.
    pub fn per_sample_grads<L>(
        &mut self,
        inputs: &Tensor,
        targets: &Tensor,
        loss: &L,
    ) -> Result<Tensor>
    where
        L: PerSampleLoss + ?Sized,
    {
        self.records.clear();
        let batch = inputs.dim(0)?;

        let observed = self.model.forward_observed(inputs, &mut self.records)?;
        let losses = loss.per_sample(observed.output(), targets)?;
        ensure_per_sample(&losses, batch)?;
        let total = losses.sum_all()?;
        observed.backward(&total, &mut self.records)?;

        let mut blocks = Vec::with_capacity(self.tracked.len());
        for tracked in &self.tracked {
            let activation = self.records.activation(tracked.name())?;
            let output_grad = self.records.gradient(tracked.name())?;
            blocks.push(layer_block(
                activation,
                output_grad,
                tracked.trains_weight(),
                tracked.trains_bias(),
            )?);
        }

        if blocks.is_empty() {
            return Ok(Tensor::zeros((batch, 0), inputs.dtype(), inputs.device())?);
        }
        let grads = Tensor::cat(&blocks, 1)?;
        log::debug!(
            "ghost per-sample gradients: batch={} width={} layers={}",
            batch,
            grads.dim(1)?,
            blocks.len()
        );
        Ok(grads)
    }
}

/// Builds one affine layer's per-sample gradient block from its captured
/// input `(batch, in_dim)` and output gradient `(batch, out_dim)`.
///
/// The weight part is `(batch, out_dim * in_dim)` in row-major `(out, in)`
/// order; the bias part is the output gradient unchanged.
pub fn layer_block(
    activation: &Tensor,
    output_grad: &Tensor,
    weight: bool,
    bias: bool,
) -> Result<Tensor> {
    let (batch, in_dim) = activation.dims2()?;
    let (grad_batch, out_dim) = output_grad.dims2()?;
    if batch != grad_batch {
        return Err(GhostError::ShapeMismatch {
            left: activation.dims().to_vec(),
            right: output_grad.dims().to_vec(),
        });
    }

    let mut parts = Vec::with_capacity(2);
    if weight {
        // (B, in, 1) * (B, 1, out) -> (B, in, out)
        let outer = activation
            .unsqueeze(2)?
            .broadcast_mul(&output_grad.unsqueeze(1)?)?;
        let per_sample = outer.transpose(1, 2)?.reshape((batch, out_dim * in_dim))?;
        parts.push(per_sample);
    }
    if bias {
        parts.push(output_grad.clone());
    }

    match parts.len() {
        0 => Ok(Tensor::zeros((batch, 0), activation.dtype(), activation.device())?),
        1 => Ok(parts.remove(0)),
        _ => Ok(Tensor::cat(&parts, 1)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::CrossEntropyLoss;
    use candle_core::{DType, Device};
    use layers::{Activation, Layer, Linear, LinearConfig, LinearInit, Sequential};

    fn linear(input: usize, output: usize, device: &Device) -> candle_core::Result<Linear> {
        Linear::with_init(
            LinearConfig::new(input, output),
            &LinearInit::FanInUniform,
            device,
            DType::F32,
        )
    }

    #[test]
    fn layer_block_is_row_wise_outer_product() -> Result<()> {
        let device = Device::Cpu;
        let activation = Tensor::new(&[[1f32, 2.0, 3.0], [0.0, -1.0, 0.5]], &device)?;
        let output_grad = Tensor::new(&[[10f32, 20.0], [1.0, -2.0]], &device)?;
        let block = layer_block(&activation, &output_grad, true, true)?;
        assert_eq!(block.dims(), &[2, 2 * 3 + 2]);

        let rows = block.to_vec2::<f32>()?;
        // W grad is (out, in): g[o] * a[i], then the bias grad g.
        assert_eq!(rows[0], vec![10.0, 20.0, 30.0, 20.0, 40.0, 60.0, 10.0, 20.0]);
        assert_eq!(rows[1], vec![0.0, -1.0, 0.5, 0.0, 2.0, -1.0, 1.0, -2.0]);

        let weight_only = layer_block(&activation, &output_grad, true, false)?;
        assert_eq!(weight_only.dims(), &[2, 6]);
        let bias_only = layer_block(&activation, &output_grad, false, true)?;
        assert_eq!(bias_only.to_vec2::<f32>()?, output_grad.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn layer_block_rejects_misaligned_batches() -> Result<()> {
        let device = Device::Cpu;
        let activation = Tensor::zeros((3, 2), DType::F32, &device)?;
        let output_grad = Tensor::zeros((2, 2), DType::F32, &device)?;
        let err = layer_block(&activation, &output_grad, true, true).unwrap_err();
        assert!(matches!(err, GhostError::ShapeMismatch { .. }));
        Ok(())
    }

    #[test]
    fn records_are_replaced_on_every_call() -> Result<()> {
        let device = Device::Cpu;
        let model = Sequential::new()
            .add(linear(4, 3, &device)?)
            .add(Activation::relu())
            .add(linear(3, 2, &device)?);
        let mut capture = GhostCapture::new(&model)?;
        let loss = CrossEntropyLoss::new();

        let inputs = Tensor::randn(0f32, 1.0, (5, 4), &device)?;
        let targets = Tensor::new(&[0u32, 1, 1, 0, 1], &device)?;
        capture.per_sample_grads(&inputs, &targets, &loss)?;
        assert_eq!(capture.activations().len(), 2);
        assert_eq!(capture.gradients().len(), 2);
        assert_eq!(capture.activations()["0"].dims(), &[5, 4]);
        assert_eq!(capture.gradients()["2"].dims(), &[5, 2]);

        let smaller = inputs.narrow(0, 0, 2)?;
        let smaller_targets = targets.narrow(0, 0, 2)?;
        capture.per_sample_grads(&smaller, &smaller_targets, &loss)?;
        assert_eq!(capture.activations()["0"].dims(), &[2, 4]);
        assert_eq!(capture.gradients()["0"].dims(), &[2, 3]);

        capture.clear();
        assert!(capture.activations().is_empty());
        assert!(capture.gradients().is_empty());
        Ok(())
    }

    #[test]
    fn reducing_loss_is_rejected() -> Result<()> {
        let device = Device::Cpu;
        let model = Sequential::new().add(linear(3, 2, &device)?);
        let mut capture = GhostCapture::new(&model)?;
        let inputs = Tensor::randn(0f32, 1.0, (4, 3), &device)?;
        let targets = Tensor::zeros((4, 2), DType::F32, &device)?;
        let mean_loss = |o: &Tensor, t: &Tensor| -> candle_core::Result<Tensor> {
            o.sub(t)?.sqr()?.mean_all()
        };
        let err = capture
            .per_sample_grads(&inputs, &targets, &mean_loss)
            .unwrap_err();
        assert!(matches!(err, GhostError::LossShape { batch: 4, .. }));
        Ok(())
    }

    #[test]
    fn fully_frozen_model_yields_empty_rows() -> Result<()> {
        let device = Device::Cpu;
        let frozen = Linear::with_init(
            LinearConfig::new(3, 2).frozen(),
            &LinearInit::FanInUniform,
            &device,
            DType::F32,
        )?;
        let model = Sequential::new().add(frozen);
        assert_eq!(model.trainable_parameters().len(), 0);
        let mut capture = GhostCapture::new(&model)?;
        let inputs = Tensor::randn(0f32, 1.0, (4, 3), &device)?;
        let targets = Tensor::new(&[0u32, 1, 0, 1], &device)?;
        let grads = capture.per_sample_grads(&inputs, &targets, &CrossEntropyLoss::new())?;
        assert_eq!(grads.dims(), &[4, 0]);
        assert_eq!(model.forward(&inputs)?.dims(), &[4, 2]);
        Ok(())
    }
}
