//! Byte-keyed store collaborator seam.
//!
//! The persistent store wrapping the cache containers (RocksDB in the
//! original deployment) lives behind this trait. Batch operations have
//! default implementations in terms of the single-key ones; a backend with a
//! native multi-get can override them.

use std::collections::BTreeMap;

use crate::store::StoreError;

/// A byte-keyed store with batch operations.
pub trait ByteStore {
    /// Store a value under a key, replacing any previous value. Returns
    /// whether the write was applied.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError>;

    /// Fetch a value, `None` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a key. Returns whether a value was removed.
    fn delete(&mut self, key: &[u8]) -> Result<bool, StoreError>;

    /// Store several pairs. Mismatched lengths are an error; empty input is a
    /// no-op success.
    fn batch_put(&mut self, keys: &[&[u8]], values: &[&[u8]]) -> Result<bool, StoreError> {
        if keys.len() != values.len() {
            return Err(StoreError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        for (key, value) in keys.iter().zip(values) {
            self.put(key, value)?;
        }
        Ok(true)
    }

    /// Fetch several keys, preserving request order, `None` for misses.
    fn batch_get(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }
}

/// In-memory `ByteStore` backed by a `BTreeMap`.
///
/// The bundled reference implementation, used by tests and small embeddings;
/// production deployments plug a persistent backend in behind the trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ByteStore for MemoryStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let mut store = MemoryStore::new();
        assert!(store.put(b"k", b"v").unwrap());
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.delete(b"k").unwrap());
        assert!(!store.delete(b"k").unwrap());
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_put_length_mismatch() {
        let mut store = MemoryStore::new();
        let err = store
            .batch_put(&[b"a".as_slice(), b"b"], &[b"x".as_slice()])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::LengthMismatch { keys: 2, values: 1 }
        ));
    }

    #[test]
    fn test_batch_put_empty_is_noop_success() {
        let mut store = MemoryStore::new();
        assert!(store.batch_put(&[], &[]).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_batch_get_preserves_order() {
        let mut store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"c", b"3").unwrap();

        let got = store
            .batch_get(&[b"c".as_slice(), b"missing", b"a"])
            .unwrap();
        assert_eq!(
            got,
            vec![Some(b"3".to_vec()), None, Some(b"1".to_vec())]
        );
    }
}
