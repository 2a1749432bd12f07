//! Ground-truth per-sample gradients, one backward pass per sample.
//!
//! Slow by construction; used to validate the reconstruction.

use candle_core::Tensor;
use layers::{Layer, Sequential};

use crate::{
    loss::{ensure_per_sample, PerSampleLoss},
    Result,
};

/// Computes `(batch, P)` per-sample gradients by running an independent
/// forward and backward pass on each single-sample slice of `inputs`.
///
/// Every trainable parameter's gradient is flattened in the model's
/// depth-first parameter order and concatenated into one row. Each backward
/// pass returns a fresh gradient store, so nothing accumulates across samples.
/// Parameters that receive no gradient are skipped.
pub fn reference_per_sample_gradients<L>(
    model: &Sequential,
    inputs: &Tensor,
    targets: &Tensor,
    loss: &L,
) -> Result<Tensor>
where
    L: PerSampleLoss + ?Sized,
{
    let batch = inputs.dim(0)?;
    let params = model.trainable_parameters();
    if params.is_empty() {
        return Ok(Tensor::zeros((batch, 0), inputs.dtype(), inputs.device())?);
    }

    let mut rows = Vec::with_capacity(batch);
    for index in 0..batch {
        let sample = inputs.narrow(0, index, 1)?;
        let target = targets.narrow(0, index, 1)?;
        let losses = loss.per_sample(&model.forward(&sample)?, &target)?;
        ensure_per_sample(&losses, 1)?;
        let grads = losses.sum_all()?.backward()?;

        let mut flat = Vec::with_capacity(params.len());
        for param in &params {
            if let Some(grad) = grads.get(param.as_tensor()) {
                flat.push(grad.flatten_all()?);
            }
        }
        rows.push(Tensor::cat(&flat, 0)?);
    }
    log::debug!(
        "reference per-sample gradients: batch={} parameters={}",
        batch,
        params.len()
    );
    Ok(Tensor::stack(&rows, 0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::MseLoss;
    use candle_core::{DType, Device};
    use layers::{Linear, LinearConfig};

    #[test]
    fn single_layer_mse_matches_closed_form() -> Result<()> {
        let device = Device::Cpu;
        // y = W x + b with W = [[1, 2]], b = [0.5]
        let weight = Tensor::new(&[[1f32, 2.0]], &device)?;
        let bias = Tensor::new(&[0.5f32], &device)?;
        let model = Sequential::new().add(Linear::new(
            LinearConfig::new(2, 1),
            weight,
            Some(bias),
        )?);

        let inputs = Tensor::new(&[[1f32, 1.0], [2.0, 0.0]], &device)?;
        let targets = Tensor::new(&[[0f32], [1.0]], &device)?;
        let grads = reference_per_sample_gradients(&model, &inputs, &targets, &MseLoss)?;

        // residual r = y - t: sample 0 -> 3.5, sample 1 -> 1.5; dL/dy = 2r.
        let rows = grads.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![7.0, 7.0, 7.0]);
        assert_eq!(rows[1], vec![6.0, 0.0, 3.0]);
        Ok(())
    }

    #[test]
    fn frozen_parameters_are_skipped() -> Result<()> {
        let device = Device::Cpu;
        let frozen = Linear::new(
            LinearConfig::new(2, 2).frozen(),
            Tensor::ones((2, 2), DType::F32, &device)?,
            Some(Tensor::zeros(2, DType::F32, &device)?),
        )?;
        let mut head = Linear::new(
            LinearConfig::new(2, 1),
            Tensor::ones((1, 2), DType::F32, &device)?,
            Some(Tensor::zeros(1, DType::F32, &device)?),
        )?;
        head.set_trainable(true, false)?;
        let model = Sequential::new().add(frozen).add(head);

        let inputs = Tensor::ones((3, 2), DType::F32, &device)?;
        let targets = Tensor::zeros((3, 1), DType::F32, &device)?;
        let grads = reference_per_sample_gradients(&model, &inputs, &targets, &MseLoss)?;
        assert_eq!(grads.dims(), &[3, 2]);
        Ok(())
    }
}
