//! Forward/backward interception points for the immediate children of a
//! [`Sequential`](crate::sequential::Sequential).
//!
//! Candle's `backward` drops the gradients of intermediate tensors as soon as
//! they have been propagated, so the gradient with respect to a layer output
//! cannot be read back after the fact. Observed children therefore get a
//! zero-valued probe [`Var`] added to their output during
//! [`Sequential::forward_observed`](crate::sequential::Sequential::forward_observed).
//! Adding zero leaves every value untouched, and the probe's entry in the
//! [`GradStore`] is exactly `∂loss/∂output` for that layer.

use candle_core::{backprop::GradStore, Error, Result, Tensor, Var};

/// Receives per-layer tensors while a model runs forward and backward.
///
/// Implementations own whatever store they write into; the model only hands
/// out borrowed tensors and never keeps a reference to the observer.
pub trait LayerObserver {
    /// Returns `true` when the child named `name` should be observed.
    fn observes(&self, name: &str) -> bool;

    /// Invoked after an observed child computed `output` from `input`.
    fn after_forward(&mut self, name: &str, input: &Tensor, output: &Tensor) -> Result<()>;

    /// Invoked after backpropagation with the gradient of the loss with
    /// respect to the observed child's output.
    fn after_backward(&mut self, name: &str, grad_output: &Tensor) -> Result<()>;
}

/// Result of an observed forward pass, holding the probes needed to route
/// output gradients back to the observer.
#[derive(Debug)]
pub struct ObservedForward {
    output: Tensor,
    probes: Vec<(String, Var)>,
}

impl ObservedForward {
    pub(crate) fn new(output: Tensor, probes: Vec<(String, Var)>) -> Self {
        Self { output, probes }
    }

    /// Final model output.
    pub fn output(&self) -> &Tensor {
        &self.output
    }

    /// Names of the children that were observed, in model order.
    pub fn observed_layers(&self) -> impl Iterator<Item = &str> {
        self.probes.iter().map(|(name, _)| name.as_str())
    }

    /// Back-propagates from the scalar `loss` and reports each observed
    /// child's output gradient to `observer`, in model order.
    ///
    /// Children whose output did not reach `loss` receive no callback.
    pub fn backward(&self, loss: &Tensor, observer: &mut dyn LayerObserver) -> Result<GradStore> {
        if loss.rank() != 0 {
            return Err(Error::Msg(format!(
                "backward expects a scalar loss, got shape {:?}",
                loss.dims()
            )));
        }
        let grads = loss.backward()?;
        for (name, probe) in &self.probes {
            match grads.get(probe.as_tensor()) {
                Some(grad) => observer.after_backward(name, &grad.detach())?,
                None => log::debug!("no gradient reached the output of layer '{name}'"),
            }
        }
        Ok(grads)
    }
}
