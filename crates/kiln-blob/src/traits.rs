use crate::error::BlobResult;

/// Storage for opaque photo bytes, addressed by generated names.
///
/// All implementations must satisfy these invariants:
/// - `save` either stores the bytes under a new unique name and returns it,
///   or fails with `WriteFailed` having stored nothing.
/// - `load` and `delete` of an unknown name fail with `NotFound`.
/// - Concurrent reads are always safe.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a freshly generated name and return the name.
    fn save(&self, bytes: &[u8]) -> BlobResult<String>;

    /// Read the bytes stored under `name`.
    fn load(&self, name: &str) -> BlobResult<Vec<u8>>;

    /// Remove the blob stored under `name`.
    fn delete(&self, name: &str) -> BlobResult<()>;

    /// Check whether a blob exists under `name`.
    fn exists(&self, name: &str) -> BlobResult<bool>;

    /// Store `bytes` under a name generated by a peer store.
    ///
    /// Returns `false` without writing if the name is already present, so
    /// redelivered imports are no-ops.
    fn import(&self, name: &str, bytes: &[u8]) -> BlobResult<bool>;

    /// Names of every stored blob, sorted.
    fn list(&self) -> BlobResult<Vec<String>>;
}
