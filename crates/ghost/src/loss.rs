//! Unreduced loss functions.
//!
//! Every loss here returns one value per sample, shaped `(batch,)`. Summing
//! that vector and back-propagating once gives each sample's gradient in its
//! own row of every layer's output gradient, which is what the reconstruction
//! relies on. Losses that couple samples (batch statistics, contrastive terms)
//! break that decomposition and are not representable here.

use candle_core::{DType, Tensor, D};
use candle_nn::ops;

use crate::{GhostError, Result};

/// A loss producing one scalar per sample.
pub trait PerSampleLoss {
    /// Returns the per-sample losses, shaped `(batch,)`.
    fn per_sample(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor>;
}

impl<F> PerSampleLoss for F
where
    F: Fn(&Tensor, &Tensor) -> candle_core::Result<Tensor>,
{
    fn per_sample(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        Ok(self(outputs, targets)?)
    }
}

/// Rejects anything but a `(batch,)` loss vector.
pub(crate) fn ensure_per_sample(losses: &Tensor, batch: usize) -> Result<()> {
    if losses.dims() == [batch] {
        Ok(())
    } else {
        Err(GhostError::LossShape {
            batch,
            actual: losses.dims().to_vec(),
        })
    }
}

/// Cross entropy over the last axis of `(batch, classes)` logits with
/// optional label smoothing and ignore-index handling.
///
/// Samples whose target equals the ignore index get a loss of zero.
#[derive(Debug, Clone, Default)]
pub struct CrossEntropyLoss {
    label_smoothing: f32,
    ignore_index: Option<u32>,
}

impl CrossEntropyLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label_smoothing(mut self, smoothing: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&smoothing) {
            return Err(GhostError::InvalidInput(
                "label smoothing must be in [0, 1) for cross entropy".into(),
            ));
        }
        self.label_smoothing = smoothing;
        Ok(self)
    }

    pub fn with_ignore_index(mut self, ignore_index: Option<u32>) -> Self {
        self.ignore_index = ignore_index;
        self
    }

    pub fn label_smoothing(&self) -> f32 {
        self.label_smoothing
    }
}

impl PerSampleLoss for CrossEntropyLoss {
    fn per_sample(&self, logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let (batch, classes) = match logits.dims() {
            [batch, classes] => (*batch, *classes),
            dims => {
                return Err(GhostError::InvalidInput(format!(
                    "cross entropy expects (batch, classes) logits, got {:?}",
                    dims
                )))
            }
        };
        if classes == 0 {
            return Err(GhostError::InvalidInput(
                "logits class dimension must be greater than zero".into(),
            ));
        }
        if targets.dims() != [batch] {
            return Err(GhostError::ShapeMismatch {
                left: vec![batch],
                right: targets.dims().to_vec(),
            });
        }

        let targets = targets.to_device(logits.device())?;
        let targets = match targets.dtype() {
            DType::U32 => targets,
            DType::I64 | DType::U8 => targets.to_dtype(DType::U32)?,
            dtype => {
                return Err(GhostError::InvalidInput(format!(
                    "unsupported target dtype {:?} for cross entropy",
                    dtype
                )))
            }
        };

        // Ignored targets may lie outside the class range, so they are
        // replaced by class 0 before the gather and masked afterwards.
        let keep = match self.ignore_index {
            Some(ignore_index) => Some(targets.ne(ignore_index)?),
            None => None,
        };
        let class_ids = match &keep {
            Some(keep) => keep.where_cond(&targets, &targets.zeros_like()?)?,
            None => targets,
        };

        let log_probs = ops::log_softmax(logits, D::Minus1)?;
        let nll = log_probs
            .gather(&class_ids.unsqueeze(1)?, 1)?
            .neg()?
            .squeeze(1)?;

        let per_sample = if self.label_smoothing > 0.0 {
            let smoothing = self.label_smoothing as f64;
            let uniform = log_probs.mean(1)?.neg()?;
            (nll.affine(1.0 - smoothing, 0.0)? + uniform.affine(smoothing, 0.0)?)?
        } else {
            nll
        };

        match keep {
            Some(keep) => Ok((&per_sample * keep.to_dtype(per_sample.dtype())?)?),
            None => Ok(per_sample),
        }
    }
}

/// Mean squared error averaged over the feature axis of each sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl PerSampleLoss for MseLoss {
    fn per_sample(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        if outputs.rank() != 2 {
            return Err(GhostError::InvalidInput(format!(
                "mse expects (batch, features) outputs, got {:?}",
                outputs.dims()
            )));
        }
        if outputs.dims() != targets.dims() {
            return Err(GhostError::ShapeMismatch {
                left: outputs.dims().to_vec(),
                right: targets.dims().to_vec(),
            });
        }
        let targets = targets.to_dtype(outputs.dtype())?;
        Ok(outputs.sub(&targets)?.sqr()?.mean(1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn manual_cross_entropy(row: &[f32], target: usize) -> f32 {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = row.iter().map(|v| (v - max).exp()).sum::<f32>().ln() + max;
        log_sum - row[target]
    }

    #[test]
    fn cross_entropy_is_unreduced() -> Result<()> {
        let device = Device::Cpu;
        let rows = [[0.5f32, -1.0, 2.0], [1.5, 0.0, -0.5]];
        let logits = Tensor::new(&rows, &device)?;
        let targets = Tensor::new(&[2u32, 0], &device)?;

        let losses = CrossEntropyLoss::new().per_sample(&logits, &targets)?;
        assert_eq!(losses.dims(), &[2]);
        let values = losses.to_vec1::<f32>()?;
        assert!((values[0] - manual_cross_entropy(&rows[0], 2)).abs() < 1e-5);
        assert!((values[1] - manual_cross_entropy(&rows[1], 0)).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn ignored_targets_contribute_zero_loss() -> Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.5f32, -1.0], [1.5, 0.0], [0.1, 0.2]], &device)?;
        let targets = Tensor::new(&[1i64, 0, 1], &device)?;
        let loss = CrossEntropyLoss::new().with_ignore_index(Some(0));
        let values = loss.per_sample(&logits, &targets)?.to_vec1::<f32>()?;
        assert_eq!(values[1], 0.0);
        assert!(values[0] > 0.0 && values[2] > 0.0);
        Ok(())
    }

    #[test]
    fn ignore_index_outside_class_range_is_masked() -> Result<()> {
        let device = Device::Cpu;
        let rows = [[0.5f32, -1.0], [1.5, 0.0]];
        let logits = Tensor::new(&rows, &device)?;
        let targets = Tensor::new(&[1u32, 100], &device)?;
        let values = CrossEntropyLoss::new()
            .with_ignore_index(Some(100))
            .with_label_smoothing(0.1)?
            .per_sample(&logits, &targets)?
            .to_vec1::<f32>()?;

        let nll = manual_cross_entropy(&rows[0], 1);
        let uniform = (0..2).map(|k| manual_cross_entropy(&rows[0], k)).sum::<f32>() / 2.0;
        assert!((values[0] - (0.9 * nll + 0.1 * uniform)).abs() < 1e-5);
        assert_eq!(values[1], 0.0);
        Ok(())
    }

    #[test]
    fn label_smoothing_mixes_in_uniform_term() -> Result<()> {
        let device = Device::Cpu;
        let row = [2.0f32, 0.0, -2.0];
        let logits = Tensor::new(&[row], &device)?;
        let targets = Tensor::new(&[0u32], &device)?;
        let smoothed = CrossEntropyLoss::new()
            .with_label_smoothing(0.1)?
            .per_sample(&logits, &targets)?
            .to_vec1::<f32>()?;

        let nll = manual_cross_entropy(&row, 0);
        let uniform = (0..3).map(|k| manual_cross_entropy(&row, k)).sum::<f32>() / 3.0;
        assert!((smoothed[0] - (0.9 * nll + 0.1 * uniform)).abs() < 1e-5);

        assert!(CrossEntropyLoss::new().with_label_smoothing(1.0).is_err());
        Ok(())
    }

    #[test]
    fn cross_entropy_rejects_misaligned_targets() -> Result<()> {
        let device = Device::Cpu;
        let logits = Tensor::zeros((4, 3), DType::F32, &device)?;
        let targets = Tensor::zeros(3, DType::U32, &device)?;
        let err = CrossEntropyLoss::new()
            .per_sample(&logits, &targets)
            .unwrap_err();
        assert!(matches!(err, GhostError::ShapeMismatch { .. }));

        let float_targets = Tensor::zeros(4, DType::F32, &device)?;
        assert!(CrossEntropyLoss::new()
            .per_sample(&logits, &float_targets)
            .is_err());
        Ok(())
    }

    #[test]
    fn mse_averages_over_features() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::new(&[[1f32, 2.0], [0.0, 0.0]], &device)?;
        let targets = Tensor::new(&[[0f32, 0.0], [1.0, 3.0]], &device)?;
        let values = MseLoss.per_sample(&outputs, &targets)?.to_vec1::<f32>()?;
        assert_eq!(values, vec![2.5, 5.0]);
        Ok(())
    }

    #[test]
    fn closures_are_losses_and_reductions_are_rejected() -> Result<()> {
        let device = Device::Cpu;
        let outputs = Tensor::ones((3, 2), DType::F32, &device)?;
        let per_row = |o: &Tensor, _t: &Tensor| o.sum(1);
        let reduced = |o: &Tensor, _t: &Tensor| o.sum_all();

        let losses = per_row.per_sample(&outputs, &outputs)?;
        ensure_per_sample(&losses, 3)?;

        let scalar = reduced.per_sample(&outputs, &outputs)?;
        let err = ensure_per_sample(&scalar, 3).unwrap_err();
        assert!(matches!(err, GhostError::LossShape { batch: 3, .. }));
        Ok(())
    }
}
