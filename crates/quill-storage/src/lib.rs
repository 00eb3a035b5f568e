pub mod local;

pub use local::LocalImageStore;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Pluggable image storage. Implementations take uploaded bytes and hand back
/// the public path the API serves them under; deletion is keyed by that same
/// public path so post rows can be cleaned up without knowing the backend.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist `data` under `filename` and return the public path.
    async fn save(&self, filename: &str, data: &[u8]) -> Result<String>;

    /// Remove the image behind a public path. A missing file is not an
    /// error; callers treat deletion as best-effort.
    async fn delete(&self, public_path: &str) -> Result<()>;
}

/// Upload filename in the form `{field}-{millis}{ext}`, keeping the original
/// file's extension.
pub fn unique_filename(field: &str, original: &str, now_millis: i64) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{field}-{now_millis}{ext}")
}
