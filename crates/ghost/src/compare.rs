use candle_core::{DType, Tensor};

use crate::{GhostError, Result};

/// Element-wise agreement between two per-sample gradient matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub shape: Vec<usize>,
    pub max_abs_diff: f64,
}

impl Comparison {
    pub fn within(&self, tolerance: f64) -> bool {
        self.max_abs_diff <= tolerance
    }
}

/// Compares `ghost` against `reference`, requiring identical shapes.
pub fn compare(ghost: &Tensor, reference: &Tensor) -> Result<Comparison> {
    if ghost.dims() != reference.dims() {
        return Err(GhostError::ShapeMismatch {
            left: ghost.dims().to_vec(),
            right: reference.dims().to_vec(),
        });
    }
    let max_abs_diff = if ghost.elem_count() == 0 {
        0.0
    } else {
        ghost
            .to_dtype(DType::F64)?
            .sub(&reference.to_dtype(DType::F64)?)?
            .abs()?
            .max_all()?
            .to_vec0::<f64>()?
    };
    Ok(Comparison {
        shape: ghost.dims().to_vec(),
        max_abs_diff,
    })
}
