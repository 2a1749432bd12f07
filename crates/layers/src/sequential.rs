//! Ordered container of named layers.
//!
//! A [`Sequential`] feeds each child's output into the next child. Children
//! are addressed by name; only these immediate children are visible to a
//! [`LayerObserver`], nested containers are treated as a single opaque layer.

use std::fmt;

use candle_core::{Result, Tensor, Var};

use crate::{
    linear::Linear,
    observer::{LayerObserver, ObservedForward},
    parameter::Parameter,
};

/// Shared interface for everything that can be placed in a [`Sequential`].
pub trait Layer: Send + Sync {
    /// Applies the layer to a `(batch, features)` tensor.
    fn forward(&self, xs: &Tensor) -> Result<Tensor>;

    /// Parameters in depth-first order (for affine layers: weight, then bias).
    fn parameters(&self) -> Vec<&Parameter>;

    /// Downcast used by callers that need the affine structure of a layer.
    fn as_linear(&self) -> Option<&Linear> {
        None
    }

    fn has_trainable_parameters(&self) -> bool {
        self.parameters().iter().any(|param| param.is_trainable())
    }
}

struct NamedLayer {
    name: String,
    layer: Box<dyn Layer>,
}

/// Feed-forward stack of named children.
#[derive(Default)]
pub struct Sequential {
    children: Vec<NamedLayer>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a child under `name`.
    ///
    /// Names are not checked for uniqueness; anything keyed by child name
    /// (such as captured activations) will see the later child overwrite the
    /// earlier one.
    pub fn push(&mut self, name: impl Into<String>, layer: impl Layer + 'static) -> &mut Self {
        self.children.push(NamedLayer {
            name: name.into(),
            layer: Box::new(layer),
        });
        self
    }

    /// Builder form of [`push`](Self::push) naming the child by its position.
    pub fn add(mut self, layer: impl Layer + 'static) -> Self {
        let name = self.children.len().to_string();
        self.push(name, layer);
        self
    }

    /// Builder form of [`push`](Self::push) with an explicit name.
    pub fn add_named(mut self, name: impl Into<String>, layer: impl Layer + 'static) -> Self {
        self.push(name, layer);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Immediate children in model order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &dyn Layer)> {
        self.children
            .iter()
            .map(|child| (child.name.as_str(), child.layer.as_ref()))
    }

    /// Parameters that receive gradients, in depth-first order.
    pub fn trainable_parameters(&self) -> Vec<&Parameter> {
        self.parameters()
            .into_iter()
            .filter(|param| param.is_trainable())
            .collect()
    }

    /// Total number of trainable scalars.
    pub fn trainable_parameter_count(&self) -> usize {
        self.trainable_parameters()
            .iter()
            .map(|param| param.elem_count())
            .sum()
    }

    /// Runs the forward pass, reporting every child for which
    /// [`LayerObserver::observes`] is true.
    ///
    /// Observed outputs are routed through a zero probe so that
    /// [`ObservedForward::backward`] can recover their gradients.
    pub fn forward_observed(
        &self,
        xs: &Tensor,
        observer: &mut dyn LayerObserver,
    ) -> Result<ObservedForward> {
        let mut hidden = xs.clone();
        let mut probes = Vec::new();
        for child in &self.children {
            let output = child.layer.forward(&hidden)?;
            hidden = if observer.observes(&child.name) {
                observer.after_forward(&child.name, &hidden, &output)?;
                let probe = Var::zeros(output.dims(), output.dtype(), output.device())?;
                let tapped = output.add(probe.as_tensor())?;
                probes.push((child.name.clone(), probe));
                tapped
            } else {
                output
            };
        }
        Ok(ObservedForward::new(hidden, probes))
    }
}

impl Layer for Sequential {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut hidden = xs.clone();
        for child in &self.children {
            hidden = child.layer.forward(&hidden)?;
        }
        Ok(hidden)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.children
            .iter()
            .flat_map(|child| child.layer.parameters())
            .collect()
    }
}

impl fmt::Debug for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.children.iter().map(|child| &child.name))
            .finish()
    }
}
