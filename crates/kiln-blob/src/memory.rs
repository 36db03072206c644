use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{BlobError, BlobResult};
use crate::name::{generate_name, validate_name, DEFAULT_EXTENSION};
use crate::traits::BlobStore;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs are held behind a `RwLock`;
/// bytes are cloned on read and write.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Remove a blob behind the store's back, as a user deleting a file would.
    pub fn remove_out_of_band(&self, name: &str) -> bool {
        self.blobs
            .write()
            .expect("lock poisoned")
            .remove(name)
            .is_some()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn save(&self, bytes: &[u8]) -> BlobResult<String> {
        let name = generate_name(DEFAULT_EXTENSION);
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(name.clone(), bytes.to_vec());
        Ok(name)
    }

    fn load(&self, name: &str) -> BlobResult<Vec<u8>> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(name)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }

    fn delete(&self, name: &str) -> BlobResult<()> {
        let mut map = self.blobs.write().expect("lock poisoned");
        map.remove(name)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> BlobResult<bool> {
        Ok(self.blobs.read().expect("lock poisoned").contains_key(name))
    }

    fn import(&self, name: &str, bytes: &[u8]) -> BlobResult<bool> {
        validate_name(name)?;
        let mut map = self.blobs.write().expect("lock poisoned");
        if map.contains_key(name) {
            return Ok(false);
        }
        map.insert(name.to_string(), bytes.to_vec());
        Ok(true)
    }

    fn list(&self) -> BlobResult<Vec<String>> {
        let map = self.blobs.read().expect("lock poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("blob_count", &self.len())
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let store = InMemoryBlobStore::new();
        let name = store.save(b"glaze test tile").unwrap();
        assert_eq!(store.load(&name).unwrap(), b"glaze test tile");
        assert_eq!(store.len(), 1);

        store.delete(&name).unwrap();
        assert!(store.is_empty());
        assert!(store.delete(&name).unwrap_err().is_not_found());
    }

    #[test]
    fn total_bytes() {
        let store = InMemoryBlobStore::new();
        store.save(b"12345").unwrap();
        store.save(b"123456789").unwrap();
        assert_eq!(store.total_bytes(), 14);
        assert!(format!("{store:?}").contains("total_bytes: 14"));
    }

    #[test]
    fn import_validates_and_dedups() {
        let store = InMemoryBlobStore::new();
        assert!(store.import("../x", b"y").is_err());
        let name = generate_name("jpg");
        assert!(store.import(&name, b"y").unwrap());
        assert!(!store.import(&name, b"z").unwrap());
        assert_eq!(store.load(&name).unwrap(), b"y");
    }

    #[test]
    fn list_is_sorted() {
        let store = InMemoryBlobStore::new();
        for _ in 0..5 {
            store.save(b"x").unwrap();
        }
        let names = store.list().unwrap();
        assert_eq!(names.len(), 5);
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn out_of_band_removal() {
        let store = InMemoryBlobStore::new();
        let name = store.save(b"x").unwrap();
        assert!(store.remove_out_of_band(&name));
        assert!(!store.exists(&name).unwrap());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryBlobStore::new();
        store.save(b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryBlobStore"));
        assert!(debug.contains("blob_count"));
    }
}
