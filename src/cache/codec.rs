//! Symmetric int8 quantization with per-tensor dynamic scale.
//!
//! `quantize` maps FP16 values to int8 via `round(clamp(x * scale, -127, 127))`,
//! where the dynamic scale is `127 / max(|x|)` (or `1.0` for an all-zero
//! tensor). The symmetric clamp means `-128` is never produced. `dequantize`
//! reverses the mapping with `x = q / scale`.

use half::f16;
use thiserror::Error;

use crate::cache::entry::{QuantizedTensor, Tensor, TensorError};

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    /// A zero scale cannot be inverted; callers must never supply one.
    #[error("Quantization scale must be non-zero")]
    ZeroScale,

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Quantize a tensor to int8.
///
/// When `scale` is `None`, the scale is computed from the tensor's own value
/// range. An explicitly supplied zero scale fails fast.
pub fn quantize(tensor: &Tensor, scale: Option<f32>) -> Result<QuantizedTensor, CodecError> {
    let scale = match scale {
        Some(s) if s == 0.0 => return Err(CodecError::ZeroScale),
        Some(s) => s,
        None => dynamic_scale(tensor),
    };

    let data = tensor
        .data()
        .iter()
        .map(|x| (f32::from(*x) * scale).clamp(-127.0, 127.0).round() as i8)
        .collect();

    Ok(QuantizedTensor {
        shape: tensor.shape().to_vec(),
        data,
        scale,
    })
}

/// Dequantize an int8 tensor back to FP16.
pub fn dequantize(quantized: &QuantizedTensor) -> Result<Tensor, CodecError> {
    dequantize_row(&quantized.data, quantized.scale, &quantized.shape)
}

/// Dequantize a raw int8 row, as fetched from a container, into a tensor.
pub fn dequantize_row(data: &[i8], scale: f32, shape: &[usize]) -> Result<Tensor, CodecError> {
    if scale == 0.0 {
        return Err(CodecError::ZeroScale);
    }
    let values = data
        .iter()
        .map(|q| f16::from_f32(*q as f32 / scale))
        .collect();
    Ok(Tensor::new(shape.to_vec(), values)?)
}

/// Per-tensor dynamic scale: `127 / max(|x|)`, or `1.0` for an all-zero tensor.
fn dynamic_scale(tensor: &Tensor) -> f32 {
    let max_abs = tensor.max_abs();
    if max_abs == 0.0 {
        1.0
    } else {
        127.0 / max_abs
    }
}
