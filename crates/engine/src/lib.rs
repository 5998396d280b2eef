//! Upload and download coordinators for archival vaults.
//!
//! [`Uploader`] performs a resumable multi-part upload: parts already stored
//! under a resumed upload are re-hashed locally and skipped when they still
//! match. [`Downloader`] fetches a retrieval job's output in parallel ranges
//! into a freshly created file. Both verify the whole archive's tree hash
//! before reporting success.
//!
//! Per-part failures are logged and never abort a transfer; the final
//! verification is what turns a missing or corrupt part into an error.

mod download;
mod error;
mod types;
mod upload;

#[cfg(test)]
mod mock;

use std::fs::File;
use std::sync::Arc;

use floe_transfer::{Range, SectionReader, compute_tree_hash};

pub use download::Downloader;
pub use error::EngineError;
pub use types::{DownloadInput, DownloadOutcome, UploadInput, UploadOutcome};
pub use upload::Uploader;

/// Tree hash of `range` of `file`, computed off the async runtime.
///
/// `None` when the range holds no bytes.
pub(crate) async fn hash_range(file: Arc<File>, range: Range) -> Result<Option<String>, EngineError> {
    let hash =
        tokio::task::spawn_blocking(move || compute_tree_hash(&mut SectionReader::new(&file, range)))
            .await??;
    Ok(hash)
}

/// Tree hash of the first `size` bytes of `file`.
pub(crate) async fn hash_file(file: Arc<File>, size: u64) -> Result<Option<String>, EngineError> {
    match Range::new(0, size) {
        Some(range) => hash_range(file, range).await,
        None => Ok(None),
    }
}
