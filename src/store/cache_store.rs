//! Cache store: byte keys → container artifacts.
//!
//! Each `batch_put` quantizes its entries into one new container artifact and
//! records a `filename|offset` pointer per key in the byte store. `batch_get`
//! resolves the pointers, groups offsets by artifact, and issues one coalesced
//! load per artifact before scattering results back into request order.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cache::entry::CacheEntry;
use crate::config::Config;
use crate::container::reader::CacheReader;
use crate::container::writer::{CacheWriter, ContainerMetadata};
use crate::container::{self, CONTAINER_EXTENSION};
use crate::store::kv::ByteStore;
use crate::store::StoreError;

const ARTIFACT_PREFIX: &str = "kv_cache_";

/// A byte-keyed cache of quantized KV entries.
pub struct CacheStore<S: ByteStore> {
    store: S,
    writer: CacheWriter,
    reader: CacheReader,
    /// Id of the next artifact; seeded past existing artifacts so a restarted
    /// process does not clobber files.
    next_file_id: u64,
}

impl<S: ByteStore> CacheStore<S> {
    pub fn new(store: S, config: &Config) -> Result<Self, StoreError> {
        let writer = CacheWriter::from_config(config)?;
        let reader = CacheReader::from_config(config);
        let next_file_id = next_artifact_id(&container::list(writer.storage_dir())?);

        Ok(Self {
            store,
            writer,
            reader,
            next_file_id,
        })
    }

    /// Persist a batch of entries and point each key at its row.
    ///
    /// Keys and entries must have the same length; the batch must be
    /// non-empty (an artifact with zero rows is unrepresentable).
    pub fn batch_put(
        &mut self,
        keys: &[&[u8]],
        entries: &[CacheEntry],
    ) -> Result<ContainerMetadata, StoreError> {
        if keys.len() != entries.len() {
            return Err(StoreError::LengthMismatch {
                keys: keys.len(),
                values: entries.len(),
            });
        }

        let filename = format!("{ARTIFACT_PREFIX}{}.{CONTAINER_EXTENSION}", self.next_file_id);
        let metadata = self.writer.save(&filename, entries)?;
        self.next_file_id += 1;

        let pointers: Vec<String> = (0..keys.len())
            .map(|offset| format!("{filename}|{offset}"))
            .collect();
        let pointer_bytes: Vec<&[u8]> = pointers.iter().map(|p| p.as_bytes()).collect();
        self.store.batch_put(keys, &pointer_bytes)?;

        debug!(filename = %filename, num_caches = metadata.num_caches, "Stored cache batch");
        Ok(metadata)
    }

    /// Fetch the entries for `keys`, preserving request order.
    ///
    /// Missing keys yield `None`. Offsets into the same artifact are fetched
    /// with a single coalesced load.
    pub fn batch_get(&self, keys: &[&[u8]]) -> Result<Vec<Option<CacheEntry>>, StoreError> {
        let pointers = self.store.batch_get(keys)?;

        // filename → (result position, row offset) pairs
        let mut by_artifact: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();
        for (position, pointer) in pointers.iter().enumerate() {
            if let Some(bytes) = pointer {
                let (filename, offset) = parse_pointer(bytes)?;
                by_artifact.entry(filename).or_default().push((position, offset));
            }
        }

        let mut results: Vec<Option<CacheEntry>> = (0..keys.len()).map(|_| None).collect();
        for (filename, requests) in &by_artifact {
            let offsets: Vec<usize> = requests.iter().map(|&(_, offset)| offset).collect();
            let entries = self.reader.load_optimized(filename, &offsets)?;
            for (&(position, _), entry) in requests.iter().zip(entries) {
                results[position] = Some(entry);
            }
        }

        debug!(
            requested = keys.len(),
            artifacts = by_artifact.len(),
            "Fetched cache batch"
        );
        Ok(results)
    }

    /// Remove a key's pointer. The shared artifact is left in place.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        self.store.delete(key)
    }

    /// Delete an artifact by name; `false` when it was already absent.
    /// Pointers into it are not touched and will dangle.
    pub fn cleanup(&self, filename: &str) -> Result<bool, StoreError> {
        Ok(container::cleanup(self.writer.storage_dir(), filename)?)
    }

    /// Enumerate artifacts in the storage directory.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(container::list(self.writer.storage_dir())?)
    }
}

fn parse_pointer(bytes: &[u8]) -> Result<(String, usize), StoreError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| StoreError::BadPointer(String::from_utf8_lossy(bytes).into_owned()))?;
    let (filename, offset) = text
        .split_once('|')
        .ok_or_else(|| StoreError::BadPointer(text.to_string()))?;
    let offset = offset
        .parse::<usize>()
        .map_err(|_| StoreError::BadPointer(text.to_string()))?;
    Ok((filename.to_string(), offset))
}

/// First artifact id not used by an existing `kv_cache_<id>.safetensors`.
fn next_artifact_id(existing: &[String]) -> u64 {
    existing
        .iter()
        .filter_map(|name| {
            name.strip_prefix(ARTIFACT_PREFIX)?
                .strip_suffix(&format!(".{CONTAINER_EXTENSION}"))?
                .parse::<u64>()
                .ok()
        })
        .map(|id| id + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pointer() {
        let (file, offset) = parse_pointer(b"kv_cache_3.safetensors|7").unwrap();
        assert_eq!(file, "kv_cache_3.safetensors");
        assert_eq!(offset, 7);

        assert!(parse_pointer(b"no-separator").is_err());
        assert!(parse_pointer(b"file|not-a-number").is_err());
    }

    #[test]
    fn test_next_artifact_id() {
        assert_eq!(next_artifact_id(&[]), 0);

        let names = vec![
            "kv_cache_0.safetensors".to_string(),
            "kv_cache_12.safetensors".to_string(),
            "unrelated.safetensors".to_string(),
        ];
        assert_eq!(next_artifact_id(&names), 13);
    }
}
