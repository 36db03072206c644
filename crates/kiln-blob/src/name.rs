use crate::error::{BlobError, BlobResult};

/// Extension used for generated names when none is configured.
pub const DEFAULT_EXTENSION: &str = "jpg";

const MAX_NAME_LEN: usize = 128;

/// Generate a fresh, unique blob name: `<uuid-v7>.<extension>`.
pub fn generate_name(extension: &str) -> String {
    let stem = uuid::Uuid::now_v7();
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Check that `name` is a plain file name safe to join onto a store root.
///
/// Rejects empty names, hidden names, path separators, and anything
/// outside `[A-Za-z0-9._-]`.
pub fn validate_name(name: &str) -> BlobResult<()> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(BlobError::InvalidName(name.to_string()))
    }
}

/// Whether `name` has the shape [`generate_name`] produces: a UUID stem
/// and an optional alphanumeric extension.
///
/// Listing uses this so that unrelated files sharing the directory are
/// never mistaken for blobs.
pub fn is_generated_name(name: &str) -> bool {
    let (stem, extension) = match name.split_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (name, None),
    };
    let extension_ok = extension
        .map(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(true);
    extension_ok && stem.len() == 36 && uuid::Uuid::parse_str(stem).is_ok()
}
