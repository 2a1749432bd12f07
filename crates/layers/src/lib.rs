//! Building blocks for observable feed-forward models.
//!
//! This crate hosts affine layers, pointwise activations and the
//! [`Sequential`](sequential::Sequential) container, together with the
//! observer hooks used to intercept per-layer activations and output
//! gradients during a single batched forward/backward pass.

pub mod activations;
pub mod checks;
pub mod linear;
pub mod observer;
pub mod parameter;
pub mod sequential;

pub use activations::{Activation, ActivationKind};
pub use linear::{Linear, LinearConfig, LinearInit};
pub use observer::{LayerObserver, ObservedForward};
pub use parameter::Parameter;
pub use sequential::{Layer, Sequential};
