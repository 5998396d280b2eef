//! SHA-256 tree hash.
//!
//! The stream is cut into 1 MiB chunks counted from the start of the hashed
//! stream, each chunk is hashed into a leaf, and adjacent nodes are combined
//! pairwise (`sha256(left || right)`) level by level until one node remains.
//! An unpaired trailing node is promoted unchanged.

use std::io::{self, Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};

/// Leaf size of the tree hash: 1 MiB.
pub const TREE_HASH_CHUNK_SIZE: usize = 1024 * 1024;

type Node = [u8; 32];

/// Computes the hex tree hash of `reader` from its current position to EOF.
///
/// The reader is seeked back to where it started before returning. Returns
/// `Ok(None)` if the reader yields no bytes.
pub fn compute_tree_hash<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let start = reader.stream_position()?;
    let leaves = hash_leaves(reader);
    reader.seek(SeekFrom::Start(start))?;
    Ok(combine(leaves?).map(hex::encode))
}

/// Computes the hex tree hash of an in-memory buffer.
///
/// Returns `None` for an empty buffer.
pub fn tree_hash_bytes(data: &[u8]) -> Option<String> {
    let leaves: Vec<Node> = data
        .chunks(TREE_HASH_CHUNK_SIZE)
        .map(|chunk| Sha256::digest(chunk).into())
        .collect();
    combine(leaves).map(hex::encode)
}

fn hash_leaves<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<Node>> {
    let mut leaves = Vec::new();
    let mut buf = vec![0u8; TREE_HASH_CHUNK_SIZE];
    loop {
        let n = fill(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        leaves.push(Sha256::digest(&buf[..n]).into());
        if n < buf.len() {
            break;
        }
    }
    Ok(leaves)
}

// Reads until `buf` is full or EOF; a short `read` must not shift leaf boundaries.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn combine(mut level: Vec<Node>) -> Option<Node> {
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if let [left, right] = pair {
                    let mut hasher = Sha256::new();
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                } else {
                    // Odd node out is promoted unchanged.
                    pair[0]
                }
            })
            .collect();
    }
    level.pop()
}
