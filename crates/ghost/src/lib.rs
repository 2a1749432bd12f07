//! Per-sample gradients for feed-forward networks of affine layers.
//!
//! [`GhostCapture`] wraps a [`layers::Sequential`] model and reconstructs every
//! sample's weight and bias gradients from one batched forward/backward pass,
//! using the captured input activations and output gradients of each affine
//! child. [`reference_per_sample_gradients`] computes the same matrix with
//! one backward pass per sample and serves as ground truth.
//!
//! ```no_run
//! use candle_core::{Device, Tensor};
//! use ghost::{reference_per_sample_gradients, compare, CrossEntropyLoss, GhostCapture};
//! use layers::{Activation, Linear, LinearConfig, LinearInit, Sequential};
//!
//! # fn main() -> ghost::Result<()> {
//! let device = Device::Cpu;
//! let init = LinearInit::FanInUniform;
//! let dtype = candle_core::DType::F32;
//! let model = Sequential::new()
//!     .add(Linear::with_init(LinearConfig::new(10, 20), &init, &device, dtype)?)
//!     .add(Activation::relu())
//!     .add(Linear::with_init(LinearConfig::new(20, 2), &init, &device, dtype)?);
//!
//! let inputs = Tensor::randn(0f32, 1.0, (5, 10), &device)?;
//! let targets = Tensor::new(&[0u32, 1, 1, 0, 1], &device)?;
//! let loss = CrossEntropyLoss::new();
//!
//! let ghost = GhostCapture::new(&model)?.per_sample_grads(&inputs, &targets, &loss)?;
//! let reference = reference_per_sample_gradients(&model, &inputs, &targets, &loss)?;
//! assert!(compare(&ghost, &reference)?.within(1e-4));
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod compare;
pub mod config;
pub mod error;
pub mod loss;
pub mod reconstruction;
pub mod reference;
pub mod run;

pub use capture::{GhostCapture, TrackedLayer};
pub use compare::{compare, Comparison};
pub use config::ValidationConfig;
pub use error::{GhostError, Result};
pub use loss::{CrossEntropyLoss, MseLoss, PerSampleLoss};
pub use reconstruction::layer_block;
pub use reference::reference_per_sample_gradients;
pub use run::{run_validation, ValidationReport};
