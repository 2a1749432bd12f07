//! Lightweight validation helpers shared across layer components.
//!
//! Every helper takes a short `context` label (for example `"linear.weight"`)
//! that is folded into the error message. They return
//! `candle_core::Result<()>` so call sites can propagate errors without
//! panicking.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(context: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let actual = tensor.rank();
    if actual == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected rank {rank}, got {actual} (shape {:?})",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(context: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected shape {:?}, got {:?}",
            expected, actual
        )))
    }
}

/// Validates the `(batch, features)` convention with a known feature width.
pub fn expect_batch_features(context: &str, tensor: &Tensor, features: usize) -> Result<()> {
    match tensor.dims() {
        [batch, actual] if *actual == features => {
            if *batch == 0 {
                Err(Error::Msg(format!("{context}: batch dimension must be non-zero")))
            } else {
                Ok(())
            }
        }
        dims => Err(Error::Msg(format!(
            "{context}: expected (batch, {features}) layout, got {:?}",
            dims
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(context: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{context}: expected dtype in {:?}, got {:?}",
            allowed, dtype
        )))
    }
}

/// Requires two tensors to share a dtype.
pub fn expect_same_dtype(
    lhs_context: &str,
    lhs: &Tensor,
    rhs_context: &str,
    rhs: &Tensor,
) -> Result<()> {
    if lhs.dtype() == rhs.dtype() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{lhs_context} has dtype {:?} but {rhs_context} has dtype {:?}",
            lhs.dtype(),
            rhs.dtype()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn batch_features_rejects_wrong_width_and_rank() -> Result<()> {
        let device = Device::Cpu;
        let ok = Tensor::zeros((3, 4), DType::F32, &device)?;
        expect_batch_features("input", &ok, 4)?;

        let wide = Tensor::zeros((3, 5), DType::F32, &device)?;
        assert!(expect_batch_features("input", &wide, 4).is_err());

        let cube = Tensor::zeros((2, 3, 4), DType::F32, &device)?;
        let err = expect_batch_features("input", &cube, 4).unwrap_err();
        assert!(err.to_string().contains("input"));

        let empty = Tensor::zeros((0, 4), DType::F32, &device)?;
        assert!(expect_batch_features("input", &empty, 4).is_err());
        Ok(())
    }

    #[test]
    fn dtype_checks_report_context() -> Result<()> {
        let device = Device::Cpu;
        let a = Tensor::zeros(4, DType::F32, &device)?;
        let b = Tensor::zeros(4, DType::F64, &device)?;
        expect_dtype_in("a", &a, &[DType::F32, DType::F64])?;
        assert!(expect_dtype_in("a", &a, &[DType::F16]).is_err());
        let err = expect_same_dtype("a", &a, "b", &b).unwrap_err();
        assert!(err.to_string().contains("b has dtype"));
        Ok(())
    }
}
