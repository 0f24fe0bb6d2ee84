//! Byte-keyed store integration.
//!
//! - [`kv`]: the `ByteStore` collaborator trait plus an in-memory reference
//!   implementation
//! - [`cache_store`]: maps opaque byte keys to `filename|offset` pointers into
//!   container artifacts

pub mod cache_store;
pub mod kv;

use thiserror::Error;

use crate::container::ContainerError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Batch has {keys} keys but {values} values")]
    LengthMismatch { keys: usize, values: usize },

    #[error("Unparsable cache pointer: {0:?}")]
    BadPointer(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}
