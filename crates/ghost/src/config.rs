use std::{collections::HashSet, fs, path::Path};

use layers::ActivationKind;
use serde::{Deserialize, Serialize};

use crate::{
    loss::{CrossEntropyLoss, MseLoss, PerSampleLoss},
    GhostError, Result,
};

pub const DEFAULT_TOLERANCE: f64 = 1e-4;
const DEFAULT_BATCH_SIZE: usize = 5;
const DEFAULT_SEED: u64 = 0;

/// Describes one validation run: the model to build, the batch to draw and
/// the loss under which both gradient engines are compared.
///
/// The default reproduces `Linear(10→20) → ReLU → Linear(20→10) → Linear(10→2)`
/// on a batch of five samples with two-class cross entropy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub model: ModelSpec,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub loss: LossConfig,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            data: DataConfig::default(),
            loss: LossConfig::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ValidationConfig {
    /// Loads a `.toml` (or extensionless) or `.json` configuration and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: ValidationConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(GhostError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.model.input_dim == 0 {
            errors.push("model.input_dim must be greater than 0".to_string());
        }
        if self.model.layers.is_empty() {
            errors.push("model.layers must not be empty".to_string());
        }
        if !self
            .model
            .layers
            .iter()
            .any(|layer| matches!(layer, LayerSpec::Linear { .. }))
        {
            errors.push("model.layers must contain at least one linear layer".to_string());
        }

        let mut names = HashSet::new();
        for (index, layer) in self.model.layers.iter().enumerate() {
            match layer {
                LayerSpec::Linear { out_dim, .. } if *out_dim == 0 => {
                    errors.push(format!("model.layers[{index}].out_dim must be greater than 0"));
                }
                LayerSpec::Activation { activation, .. }
                    if ActivationKind::from_name(activation).is_none() =>
                {
                    errors.push(format!(
                        "model.layers[{index}].activation '{activation}' is not supported"
                    ));
                }
                _ => {}
            }
            let name = self.model.layer_name(index);
            if !names.insert(name.clone()) {
                errors.push(format!("model.layers[{index}] reuses the name '{name}'"));
            }
        }

        if self.data.batch_size == 0 {
            errors.push("data.batch_size must be greater than 0".to_string());
        }

        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            errors.push("tolerance must be a positive number".to_string());
        }

        if let LossConfig::CrossEntropy { label_smoothing } = self.loss {
            if !(0.0..1.0).contains(&label_smoothing) {
                errors.push("loss.label_smoothing must be in [0, 1)".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GhostError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub input_dim: usize,
    pub layers: Vec<LayerSpec>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            input_dim: 10,
            layers: vec![
                LayerSpec::linear(20),
                LayerSpec::activation("relu"),
                LayerSpec::linear(10),
                LayerSpec::linear(2),
            ],
        }
    }
}

impl ModelSpec {
    /// Name of the child at `index`: the explicit name or its position.
    pub fn layer_name(&self, index: usize) -> String {
        self.layers
            .get(index)
            .and_then(LayerSpec::name)
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string())
    }

    /// Feature width produced by the last linear layer.
    pub fn output_dim(&self) -> usize {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| match layer {
                LayerSpec::Linear { out_dim, .. } => Some(*out_dim),
                LayerSpec::Activation { .. } => None,
            })
            .unwrap_or(self.input_dim)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    Linear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        out_dim: usize,
        #[serde(default = "default_true")]
        bias: bool,
        #[serde(default = "default_true")]
        trainable: bool,
    },
    Activation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        activation: String,
    },
}

impl LayerSpec {
    pub fn linear(out_dim: usize) -> Self {
        Self::Linear {
            name: None,
            out_dim,
            bias: true,
            trainable: true,
        }
    }

    pub fn activation(activation: &str) -> Self {
        Self::Activation {
            name: None,
            activation: activation.to_string(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            LayerSpec::Linear { name, .. } | LayerSpec::Activation { name, .. } => name.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossConfig {
    /// Class targets drawn uniformly from the model's output width.
    CrossEntropy {
        #[serde(default)]
        label_smoothing: f32,
    },
    /// Real-valued targets shaped like the model output.
    Mse,
}

impl Default for LossConfig {
    fn default() -> Self {
        LossConfig::CrossEntropy {
            label_smoothing: 0.0,
        }
    }
}

impl LossConfig {
    pub fn build(&self) -> Result<Box<dyn PerSampleLoss>> {
        match self {
            LossConfig::CrossEntropy { label_smoothing } => Ok(Box::new(
                CrossEntropyLoss::new().with_label_smoothing(*label_smoothing)?,
            )),
            LossConfig::Mse => Ok(Box::new(MseLoss)),
        }
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_true() -> bool {
    true
}
