use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use kiln_blob::{BlobError, BlobResult, BlobStore, InMemoryBlobStore};

/// In-memory blob store that can be told to fail saves or deletes.
#[derive(Debug, Default)]
pub(crate) struct FlakyBlobStore {
    pub inner: InMemoryBlobStore,
    pub fail_save: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyBlobStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

impl BlobStore for FlakyBlobStore {
    fn save(&self, bytes: &[u8]) -> BlobResult<String> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(BlobError::WriteFailed {
                name: "<new>".into(),
                source: io::Error::other("disk full"),
            });
        }
        self.inner.save(bytes)
    }

    fn load(&self, name: &str) -> BlobResult<Vec<u8>> {
        self.inner.load(name)
    }

    fn delete(&self, name: &str) -> BlobResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(BlobError::DeleteFailed {
                name: name.into(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"),
            });
        }
        self.inner.delete(name)
    }

    fn exists(&self, name: &str) -> BlobResult<bool> {
        self.inner.exists(name)
    }

    fn import(&self, name: &str, bytes: &[u8]) -> BlobResult<bool> {
        self.inner.import(name, bytes)
    }

    fn list(&self) -> BlobResult<Vec<String>> {
        self.inner.list()
    }
}
