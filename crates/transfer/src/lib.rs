//! Byte-range partitioning, tree hashing and bounded part dispatch.
//!
//! These are the building blocks shared by the upload and download
//! coordinators in `floe-engine`: an archive is cut into fixed-size
//! [`Range`]s by a [`RangeCursor`], each range is checksummed with the
//! hierarchical [`tree hash`](compute_tree_hash), and ranges are handed to a
//! bounded pool of workers by [`dispatch`].

mod dispatch;
mod range;
mod section;
mod tree_hash;

pub use dispatch::dispatch;
pub use range::{Range, RangeCursor};
pub use section::{SectionReader, read_exact_at, write_all_at};
pub use tree_hash::{TREE_HASH_CHUNK_SIZE, compute_tree_hash, tree_hash_bytes};

/// Default part size: 1 MiB.
///
/// The smallest part size the archival service accepts. Larger parts must be
/// 1 MiB times a power of two.
pub const DEFAULT_PART_SIZE: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid range: {0}")]
    InvalidRange(String),
}
