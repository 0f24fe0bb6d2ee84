//! Container reader: per-index and coalesced batched retrieval.
//!
//! Both load paths return dequantized entries in request order and are
//! observably identical; they differ only in I/O pattern. The naive path
//! issues one row read per requested index. The optimized path merges the
//! indices into contiguous runs and fetches each run as a single range read,
//! still dequantizing row-by-row because scales are per-entry.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cache::codec::dequantize_row;
use crate::cache::entry::CacheEntry;
use crate::config::Config;
use crate::container::coalesce::coalesce;
use crate::container::tensor_file::{ContainerView, TensorFile};
use crate::container::{
    ContainerError, TENSOR_KEYS, TENSOR_KEY_SCALES, TENSOR_NUM_CACHES, TENSOR_VALUES,
    TENSOR_VALUE_SCALES,
};

/// Reads cache batches back out of container artifacts.
pub struct CacheReader {
    storage_dir: PathBuf,
}

/// Per-container layout, validated once per load.
struct Layout {
    num_caches: usize,
    key_shape: Vec<usize>,
    value_shape: Vec<usize>,
    key_scales: Vec<f32>,
    value_scales: Vec<f32>,
}

impl CacheReader {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
        }
    }

    /// Reader rooted at the configured storage directory.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_dir.clone())
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Load the entries at `indices`, one row read per index.
    ///
    /// Results match `indices` order exactly; duplicates are allowed and each
    /// occurrence is materialized independently.
    pub fn load(
        &self,
        filename: &str,
        indices: &[usize],
    ) -> Result<Vec<CacheEntry>, ContainerError> {
        let file = TensorFile::open(self.storage_dir.join(filename))?;
        let view = file.view()?;
        let layout = Layout::read(&view)?;

        let mut results = Vec::with_capacity(indices.len());
        for &index in indices {
            let key_row = view.read_row(TENSOR_KEYS, index)?;
            let value_row = view.read_row(TENSOR_VALUES, index)?;
            results.push(layout.dequantize_entry(index, &key_row, &value_row)?);
        }

        debug!(
            filename,
            requested = indices.len(),
            reads = indices.len(),
            "Loaded cache entries"
        );
        Ok(results)
    }

    /// Load the entries at `indices` with coalesced range reads.
    ///
    /// Same contract and output as [`CacheReader::load`]; contiguous requested
    /// rows are fetched in one read each, and every row is still dequantized
    /// with its own scale.
    pub fn load_optimized(
        &self,
        filename: &str,
        indices: &[usize],
    ) -> Result<Vec<CacheEntry>, ContainerError> {
        let file = TensorFile::open(self.storage_dir.join(filename))?;
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let view = file.view()?;
        let layout = Layout::read(&view)?;

        let key_row_len: usize = layout.key_shape.iter().product();
        let value_row_len: usize = layout.value_shape.iter().product();

        let runs = coalesce(indices);
        let mut slots: Vec<Option<CacheEntry>> = (0..indices.len()).map(|_| None).collect();

        for run in &runs {
            let key_block = view.read_range(TENSOR_KEYS, run.start, run.end)?;
            let value_block = view.read_range(TENSOR_VALUES, run.start, run.end)?;

            for &(position, index) in &run.entries {
                let offset = index - run.start;
                let key_row = &key_block[offset * key_row_len..(offset + 1) * key_row_len];
                let value_row = &value_block[offset * value_row_len..(offset + 1) * value_row_len];
                slots[position] = Some(layout.dequantize_entry(index, key_row, value_row)?);
            }
        }

        debug!(
            filename,
            requested = indices.len(),
            reads = runs.len(),
            "Loaded cache entries (coalesced)"
        );

        // Every request position is covered by exactly one run entry.
        Ok(slots
            .into_iter()
            .map(|slot| slot.expect("coalesced runs cover every request position"))
            .collect())
    }
}

impl Layout {
    fn read(view: &ContainerView<'_>) -> Result<Self, ContainerError> {
        let num_caches = view.num_rows(TENSOR_KEYS)?;
        let key_shape = view.row_shape(TENSOR_KEYS)?;
        let value_shape = view.row_shape(TENSOR_VALUES)?;
        let key_scales = view.read_f32_vec(TENSOR_KEY_SCALES)?;
        let value_scales = view.read_f32_vec(TENSOR_VALUE_SCALES)?;
        let declared = view.read_i32_scalar(TENSOR_NUM_CACHES)?;

        if view.num_rows(TENSOR_VALUES)? != num_caches
            || key_scales.len() != num_caches
            || value_scales.len() != num_caches
            || declared as usize != num_caches
        {
            return Err(ContainerError::Malformed(format!(
                "entry counts disagree: keys {num_caches}, values {}, key_scales {}, \
                 value_scales {}, num_caches {declared}",
                view.num_rows(TENSOR_VALUES)?,
                key_scales.len(),
                value_scales.len(),
            )));
        }

        Ok(Self {
            num_caches,
            key_shape,
            value_shape,
            key_scales,
            value_scales,
        })
    }

    fn scale_at(&self, scales: &[f32], index: usize) -> Result<f32, ContainerError> {
        scales
            .get(index)
            .copied()
            .ok_or(ContainerError::IndexOutOfRange {
                index,
                len: self.num_caches,
            })
    }

    fn dequantize_entry(
        &self,
        index: usize,
        key_row: &[i8],
        value_row: &[i8],
    ) -> Result<CacheEntry, ContainerError> {
        let key_scale = self.scale_at(&self.key_scales, index)?;
        let value_scale = self.scale_at(&self.value_scales, index)?;
        Ok(CacheEntry::new(
            dequantize_row(key_row, key_scale, &self.key_shape)?,
            dequantize_row(value_row, value_scale, &self.value_shape)?,
        ))
    }
}
