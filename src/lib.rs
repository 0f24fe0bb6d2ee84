//! kv-cache-store: quantized KV-cache persistence.
//!
//! Persists batches of paired key/value attention tensors as int8-quantized
//! safetensors containers and retrieves arbitrary subsets by index,
//! coalescing scattered indices into contiguous range reads:
//!   FP16 entries → per-entry int8 quantization → one container per batch
//!
//! An optional byte-keyed store integration maps opaque keys to
//! `filename|offset` pointers into those containers.

pub mod cache;
pub mod config;
pub mod container;
pub mod store;
