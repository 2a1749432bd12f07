use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GhostError>;

/// Which capture record a lookup failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Activation,
    Gradient,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Activation => f.write_str("activation"),
            Record::Gradient => f.write_str("output gradient"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GhostError {
    /// Dimension or dtype errors raised by the tensor backend, passed through untranslated.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error("no {record} captured for tracked layer '{layer}'; every tracked layer must run in the forward pass")]
    MissingCapture { layer: String, record: Record },

    #[error("per-sample loss must have shape [{batch}], got {actual:?}; reducing losses are not supported")]
    LossShape { batch: usize, actual: Vec<usize> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("gradient shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("layer '{layer}' has trainable parameters but is not an affine layer")]
    UnsupportedLayer { layer: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigFormat(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl GhostError {
    pub fn missing(layer: &str, record: Record) -> Self {
        Self::MissingCapture {
            layer: layer.to_string(),
            record,
        }
    }
}

impl From<toml::de::Error> for GhostError {
    fn from(value: toml::de::Error) -> Self {
        GhostError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for GhostError {
    fn from(value: serde_json::Error) -> Self {
        GhostError::ConfigFormat(value.to_string())
    }
}
