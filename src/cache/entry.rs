//! KV cache entry types.
//!
//! A cache entry is a pair of key/value attention tensors. Tensors are
//! row-major FP16 with an explicit shape; their quantized counterparts carry
//! the per-tensor scale alongside the int8 data, never as hidden state.

use half::f16;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    #[error("Shape {shape:?} implies {expected} elements, data has {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// A dense row-major FP16 tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f16>,
}

impl Tensor {
    /// Create a tensor, validating that the data length matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f16>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Create a tensor from f32 values, coercing each element to FP16.
    pub fn from_f32(shape: Vec<usize>, data: &[f32]) -> Result<Self, TensorError> {
        let data = data.iter().copied().map(f16::from_f32).collect();
        Self::new(shape, data)
    }

    /// All-zero tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![f16::ZERO; numel],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f16] {
        &self.data
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Largest absolute element value, computed in f32.
    pub fn max_abs(&self) -> f32 {
        self.data
            .iter()
            .map(|x| f32::from(*x).abs())
            .fold(0.0, f32::max)
    }
}

/// An int8 tensor plus the scale it was quantized with.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<i8>,
    pub scale: f32,
}

/// A key/value tensor pair as produced by an attention layer.
///
/// Key and value shapes may differ, but must be constant across a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: Tensor,
    pub value: Tensor,
}

impl CacheEntry {
    pub fn new(key: Tensor, value: Tensor) -> Self {
        Self { key, value }
    }
}

/// A quantized key/value pair, transient between codec and container.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedEntry {
    pub key: QuantizedTensor,
    pub value: QuantizedTensor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_shape_validation() {
        let ok = Tensor::new(vec![2, 3], vec![f16::ZERO; 6]);
        assert!(ok.is_ok());

        let err = Tensor::new(vec![2, 3], vec![f16::ZERO; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeMismatch {
                shape: vec![2, 3],
                expected: 6,
                actual: 5,
            }
        );
    }

    #[test]
    fn test_zeros_and_numel() {
        let t = Tensor::zeros(vec![4, 8]);
        assert_eq!(t.numel(), 32);
        assert_eq!(t.max_abs(), 0.0);
    }

    #[test]
    fn test_max_abs() {
        let t = Tensor::from_f32(vec![2, 2], &[0.1, -0.4, 0.3, 0.0]).unwrap();
        let max = t.max_abs();
        // f16 rounding keeps us within a small tolerance of 0.4
        assert!((max - 0.4).abs() < 1e-3);
    }
}
