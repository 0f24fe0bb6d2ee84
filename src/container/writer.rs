//! Container writer: one full-batch artifact per save.
//!
//! Each entry's K and V tensors are quantized independently with their own
//! dynamic scales, stacked along a new leading dimension, and written together
//! with the scale vectors and entry count as a single safetensors artifact.
//! There is no incremental append; saving to an existing filename replaces the
//! whole artifact.

use std::path::{Path, PathBuf};

use safetensors::tensor::{serialize_to_file, Dtype, TensorView};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::codec::quantize;
use crate::cache::entry::CacheEntry;
use crate::config::Config;
use crate::container::{
    ContainerError, TENSOR_KEYS, TENSOR_KEY_SCALES, TENSOR_NUM_CACHES, TENSOR_VALUES,
    TENSOR_VALUE_SCALES,
};

/// Description of a saved artifact, returned by [`CacheWriter::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub filename: String,
    pub num_caches: usize,
    /// Stacked shape `[N, ...Kshape]`.
    pub keys_shape: Vec<usize>,
    /// Stacked shape `[N, ...Vshape]`.
    pub values_shape: Vec<usize>,
}

/// Writes cache batches into container artifacts under a storage directory.
pub struct CacheWriter {
    storage_dir: PathBuf,
}

impl CacheWriter {
    /// Create a writer, creating the storage directory recursively if absent.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self, ContainerError> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    /// Writer rooted at the configured storage directory.
    pub fn from_config(config: &Config) -> Result<Self, ContainerError> {
        Self::new(config.storage_dir.clone())
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Quantize and persist a batch of entries as one artifact.
    ///
    /// The batch must be non-empty, and every entry must match the first
    /// entry's key and value shapes. Each entry keeps its own dynamic scale.
    pub fn save(
        &self,
        filename: &str,
        entries: &[CacheEntry],
    ) -> Result<ContainerMetadata, ContainerError> {
        let first = entries.first().ok_or(ContainerError::EmptyBatch)?;
        let key_shape = first.key.shape().to_vec();
        let value_shape = first.value.shape().to_vec();

        let num_caches = entries.len();
        let mut keys = Vec::with_capacity(num_caches * first.key.numel());
        let mut values = Vec::with_capacity(num_caches * first.value.numel());
        let mut key_scales = Vec::with_capacity(num_caches);
        let mut value_scales = Vec::with_capacity(num_caches);

        for (index, entry) in entries.iter().enumerate() {
            check_shape(index, &key_shape, entry.key.shape())?;
            check_shape(index, &value_shape, entry.value.shape())?;

            let k = quantize(&entry.key, None)?;
            let v = quantize(&entry.value, None)?;
            keys.extend_from_slice(&k.data);
            values.extend_from_slice(&v.data);
            key_scales.push(k.scale);
            value_scales.push(v.scale);
        }

        let mut keys_shape = vec![num_caches];
        keys_shape.extend_from_slice(&key_shape);
        let mut values_shape = vec![num_caches];
        values_shape.extend_from_slice(&value_shape);

        let key_scale_bytes = f32_le_bytes(&key_scales);
        let value_scale_bytes = f32_le_bytes(&value_scales);
        let count_bytes = (num_caches as i32).to_le_bytes();

        let tensors = vec![
            (
                TENSOR_KEYS,
                TensorView::new(
                    Dtype::I8,
                    keys_shape.clone(),
                    bytemuck::cast_slice::<i8, u8>(&keys),
                )?,
            ),
            (
                TENSOR_VALUES,
                TensorView::new(
                    Dtype::I8,
                    values_shape.clone(),
                    bytemuck::cast_slice::<i8, u8>(&values),
                )?,
            ),
            (
                TENSOR_KEY_SCALES,
                TensorView::new(Dtype::F32, vec![num_caches], &key_scale_bytes)?,
            ),
            (
                TENSOR_VALUE_SCALES,
                TensorView::new(Dtype::F32, vec![num_caches], &value_scale_bytes)?,
            ),
            (
                TENSOR_NUM_CACHES,
                TensorView::new(Dtype::I32, vec![], &count_bytes)?,
            ),
        ];

        let path = self.storage_dir.join(filename);
        serialize_to_file(tensors, &None, &path)?;

        debug!(
            filename,
            num_caches,
            path = %path.display(),
            "Wrote cache container"
        );

        Ok(ContainerMetadata {
            filename: filename.to_string(),
            num_caches,
            keys_shape,
            values_shape,
        })
    }
}

fn check_shape(index: usize, expected: &[usize], actual: &[usize]) -> Result<(), ContainerError> {
    if actual != expected {
        return Err(ContainerError::ShapeMismatch {
            index,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

fn f32_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::Tensor;

    fn entry(k: &[f32], v: &[f32], shape: Vec<usize>) -> CacheEntry {
        CacheEntry::new(
            Tensor::from_f32(shape.clone(), k).unwrap(),
            Tensor::from_f32(shape, v).unwrap(),
        )
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path()).unwrap();

        let err = writer.save("empty.safetensors", &[]).unwrap_err();
        assert!(matches!(err, ContainerError::EmptyBatch));
    }

    #[test]
    fn test_mixed_shapes_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path()).unwrap();

        let entries = vec![
            entry(&[0.1, 0.2], &[0.3, 0.4], vec![1, 2]),
            CacheEntry::new(Tensor::zeros(vec![2, 2]), Tensor::zeros(vec![1, 2])),
        ];
        let err = writer.save("mixed.safetensors", &entries).unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn test_save_reports_stacked_shapes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = CacheWriter::new(tmp.path()).unwrap();

        let entries = vec![
            entry(&[0.1, -0.2, 0.05, 0.3, -0.4, 0.0], &[0.5; 6], vec![2, 3]),
            entry(&[0.2; 6], &[0.1; 6], vec![2, 3]),
        ];
        let meta = writer.save("batch.safetensors", &entries).unwrap();

        assert_eq!(meta.num_caches, 2);
        assert_eq!(meta.keys_shape, vec![2, 2, 3]);
        assert_eq!(meta.values_shape, vec![2, 2, 3]);
        assert!(tmp.path().join("batch.safetensors").exists());
    }
}
