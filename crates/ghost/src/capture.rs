//! Capture of per-layer activations and output gradients.
//!
//! [`GhostCapture`] borrows a [`Sequential`] model and builds, once, a table of
//! its immediate children that own at least one trainable parameter. During a
//! batched pass it records, for each of those children, the input seen on the
//! forward pass and the gradient of the loss with respect to the child's
//! output. Both records are keyed by child name and overwritten on every pass.
//!
//! Only immediate children are inspected; a nested container holding
//! trainable parameters is rejected rather than walked.

use std::collections::{HashMap, HashSet};

use candle_core::Tensor;
use layers::{LayerObserver, Linear, Sequential};

use crate::{error::Record, GhostError, Result};

/// An observed affine child of the wrapped model.
#[derive(Debug, Clone)]
pub struct TrackedLayer<'a> {
    name: String,
    layer: &'a Linear,
    trains_weight: bool,
    trains_bias: bool,
}

impl<'a> TrackedLayer<'a> {
    fn new(name: &str, layer: &'a Linear) -> Self {
        Self {
            name: name.to_string(),
            layer,
            trains_weight: layer.weight().is_trainable(),
            trains_bias: layer.bias().is_some_and(|bias| bias.is_trainable()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> &'a Linear {
        self.layer
    }

    pub fn trains_weight(&self) -> bool {
        self.trains_weight
    }

    pub fn trains_bias(&self) -> bool {
        self.trains_bias
    }

    /// Columns this layer contributes to a per-sample gradient row.
    pub fn gradient_width(&self) -> usize {
        let config = self.layer.config();
        let weight = if self.trains_weight {
            config.output_dim * config.input_dim
        } else {
            0
        };
        let bias = if self.trains_bias { config.output_dim } else { 0 };
        weight + bias
    }
}

/// Activation and output-gradient records, filled through [`LayerObserver`].
#[derive(Debug, Default)]
pub(crate) struct CaptureRecords {
    tracked: HashSet<String>,
    activations: HashMap<String, Tensor>,
    gradients: HashMap<String, Tensor>,
}

impl CaptureRecords {
    pub(crate) fn clear(&mut self) {
        self.activations.clear();
        self.gradients.clear();
    }

    pub(crate) fn activation(&self, layer: &str) -> Result<&Tensor> {
        self.activations
            .get(layer)
            .ok_or_else(|| GhostError::missing(layer, Record::Activation))
    }

    pub(crate) fn gradient(&self, layer: &str) -> Result<&Tensor> {
        self.gradients
            .get(layer)
            .ok_or_else(|| GhostError::missing(layer, Record::Gradient))
    }
}

impl LayerObserver for CaptureRecords {
    fn observes(&self, name: &str) -> bool {
        self.tracked.contains(name)
    }

    fn after_forward(
        &mut self,
        name: &str,
        input: &Tensor,
        _output: &Tensor,
    ) -> candle_core::Result<()> {
        self.activations.insert(name.to_string(), input.detach());
        Ok(())
    }

    fn after_backward(&mut self, name: &str, grad_output: &Tensor) -> candle_core::Result<()> {
        self.gradients.insert(name.to_string(), grad_output.detach());
        Ok(())
    }
}

/// Wraps a model and captures what is needed to rebuild per-sample gradients
/// of its affine children from a single backward pass.
///
/// The model is borrowed; the capture owns its records exclusively, so one
/// instance serves one caller at a time.
#[derive(Debug)]
pub struct GhostCapture<'a> {
    pub(crate) model: &'a Sequential,
    pub(crate) tracked: Vec<TrackedLayer<'a>>,
    pub(crate) records: CaptureRecords,
}

impl<'a> GhostCapture<'a> {
    /// Scans the immediate children of `model` and registers every child with
    /// a trainable parameter for capture.
    pub fn new(model: &'a Sequential) -> Result<Self> {
        let mut tracked = Vec::new();
        for (name, layer) in model.children() {
            if !layer.has_trainable_parameters() {
                continue;
            }
            let linear = layer
                .as_linear()
                .ok_or_else(|| GhostError::UnsupportedLayer {
                    layer: name.to_string(),
                })?;
            tracked.push(TrackedLayer::new(name, linear));
        }

        let records = CaptureRecords {
            tracked: tracked.iter().map(|layer| layer.name.clone()).collect(),
            ..CaptureRecords::default()
        };
        log::debug!(
            "ghost capture: tracking {} of {} children ({:?})",
            tracked.len(),
            model.len(),
            tracked.iter().map(TrackedLayer::name).collect::<Vec<_>>()
        );

        Ok(Self {
            model,
            tracked,
            records,
        })
    }

    pub fn model(&self) -> &'a Sequential {
        self.model
    }

    /// Tracked children in model order.
    pub fn tracked_layers(&self) -> &[TrackedLayer<'a>] {
        &self.tracked
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.records.observes(name)
    }

    /// Inputs captured on the last forward pass, keyed by layer name.
    pub fn activations(&self) -> &HashMap<String, Tensor> {
        &self.records.activations
    }

    /// Output gradients captured on the last backward pass, keyed by layer name.
    pub fn gradients(&self) -> &HashMap<String, Tensor> {
        &self.records.gradients
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Width of a per-sample gradient row.
    pub fn gradient_width(&self) -> usize {
        self.tracked.iter().map(TrackedLayer::gradient_width).sum()
    }
}
