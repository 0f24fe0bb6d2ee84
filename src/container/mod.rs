//! Quantized cache container: one safetensors artifact per batch.
//!
//! - [`tensor_file`]: slice-capable access to a container (row / range reads)
//! - [`coalesce`]: merges sorted indices into maximal contiguous runs
//! - [`writer`]: assembles a batch of entries into one artifact
//! - [`reader`]: retrieves entries by index, naive or coalesced
//!
//! The module root holds the artifact naming conventions and lifecycle
//! management (deletion, enumeration).

pub mod coalesce;
pub mod reader;
pub mod tensor_file;
pub mod writer;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::cache::codec::CodecError;

/// Names of the tensors every container holds.
pub const TENSOR_KEYS: &str = "keys";
pub const TENSOR_VALUES: &str = "values";
pub const TENSOR_KEY_SCALES: &str = "key_scales";
pub const TENSOR_VALUE_SCALES: &str = "value_scales";
pub const TENSOR_NUM_CACHES: &str = "num_caches";

/// File extension container artifacts are discovered by.
pub const CONTAINER_EXTENSION: &str = "safetensors";

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container file not found: {0}")]
    NotFound(PathBuf),

    #[error("Cache index {index} out of range for container with {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Cannot save an empty cache batch")]
    EmptyBatch,

    #[error("Entry {index} has shape {actual:?}, batch uses {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Container format error: {0}")]
    Format(#[from] safetensors::tensor::SafeTensorError),

    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Delete a container artifact if present.
///
/// Returns whether a deletion occurred; a missing target is success, not an
/// error, so repeated calls are idempotent.
pub fn cleanup(storage_dir: &Path, filename: &str) -> Result<bool, ContainerError> {
    let path = storage_dir.join(filename);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "Deleted container artifact");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Enumerate container artifacts in the storage directory.
///
/// Matches on the file extension only; contents are not validated. Names are
/// sorted for deterministic output.
pub fn list(storage_dir: &Path) -> Result<Vec<String>, ContainerError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(storage_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(CONTAINER_EXTENSION) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_missing_is_false() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(!cleanup(tmp.path(), "absent.safetensors").unwrap());
    }

    #[test]
    fn test_list_filters_by_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.safetensors"), b"x").unwrap();
        std::fs::write(tmp.path().join("a.safetensors"), b"x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let names = list(tmp.path()).unwrap();
        assert_eq!(names, vec!["a.safetensors", "b.safetensors"]);
    }
}
