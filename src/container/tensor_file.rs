//! Slice-capable access to a container artifact.
//!
//! A container is a safetensors file holding a handful of named tensors. The
//! file is memory-mapped read-only and only the header is parsed up front, so
//! a row or range read touches just the pages backing those rows. Callers that
//! need a whole tensor (the scale vectors, the `num_caches` scalar) read it in
//! full.
//!
//! The mmap is a scoped resource: it is dropped with the [`TensorFile`] on
//! every exit path.

use std::fs::File;
use std::path::PathBuf;

use memmap2::Mmap;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};

use crate::container::ContainerError;

/// An open, memory-mapped container artifact.
#[derive(Debug)]
pub struct TensorFile {
    mmap: Mmap,
    path: PathBuf,
}

impl TensorFile {
    /// Open a container read-only. A missing file is a not-found error.
    pub fn open(path: PathBuf) -> Result<Self, ContainerError> {
        if !path.exists() {
            return Err(ContainerError::NotFound(path));
        }
        let file = File::open(&path)?;
        // SAFETY: the file is opened read-only and never modified through
        // this mapping.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap, path })
    }

    /// Parse the header and expose named-tensor reads.
    pub fn view(&self) -> Result<ContainerView<'_>, ContainerError> {
        let tensors = SafeTensors::deserialize(&self.mmap)?;
        Ok(ContainerView { tensors })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Named-tensor reads against a parsed container.
pub struct ContainerView<'a> {
    tensors: SafeTensors<'a>,
}

impl ContainerView<'_> {
    /// Shape of one row of a stacked int8 tensor (the shape minus its leading
    /// dimension).
    pub fn row_shape(&self, name: &str) -> Result<Vec<usize>, ContainerError> {
        let view = self.tensor(name, Dtype::I8)?;
        Ok(view.shape()[1..].to_vec())
    }

    /// Leading dimension of a stacked tensor.
    pub fn num_rows(&self, name: &str) -> Result<usize, ContainerError> {
        let view = self.tensor(name, Dtype::I8)?;
        Ok(view.shape()[0])
    }

    /// Read one row of a stacked int8 tensor.
    pub fn read_row(&self, name: &str, index: usize) -> Result<Vec<i8>, ContainerError> {
        self.read_range(name, index, index)
    }

    /// Read rows `start..=end` of a stacked int8 tensor as one contiguous
    /// fetch.
    pub fn read_range(
        &self,
        name: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<i8>, ContainerError> {
        let view = self.tensor(name, Dtype::I8)?;
        let rows = view.shape()[0];
        if start > end || end >= rows {
            return Err(ContainerError::IndexOutOfRange {
                index: end,
                len: rows,
            });
        }
        let row_len: usize = view.shape()[1..].iter().product();
        let bytes = &view.data()[start * row_len..(end + 1) * row_len];
        Ok(bytemuck::cast_slice::<u8, i8>(bytes).to_vec())
    }

    /// Read a full f32 vector.
    ///
    /// Interior tensor offsets carry no alignment guarantee, so elements are
    /// decoded explicitly from little-endian bytes rather than cast in place.
    pub fn read_f32_vec(&self, name: &str) -> Result<Vec<f32>, ContainerError> {
        let view = self.tensor(name, Dtype::F32)?;
        let bytes = view.data();
        if bytes.len() % 4 != 0 {
            return Err(ContainerError::Malformed(format!(
                "tensor '{name}' has {} bytes, not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read an i32 scalar (rank-0 tensor).
    pub fn read_i32_scalar(&self, name: &str) -> Result<i32, ContainerError> {
        let view = self.tensor(name, Dtype::I32)?;
        let bytes = view.data();
        if bytes.len() != 4 {
            return Err(ContainerError::Malformed(format!(
                "tensor '{name}' has {} bytes, expected a 4-byte scalar",
                bytes.len()
            )));
        }
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn tensor(&self, name: &str, expected: Dtype) -> Result<TensorView<'_>, ContainerError> {
        let view = self.tensors.tensor(name)?;
        if view.dtype() != expected {
            return Err(ContainerError::Malformed(format!(
                "tensor '{name}' has dtype {:?}, expected {expected:?}",
                view.dtype()
            )));
        }
        if expected == Dtype::I8 && view.shape().is_empty() {
            return Err(ContainerError::Malformed(format!(
                "tensor '{name}' has no leading dimension"
            )));
        }
        Ok(view)
    }
}
