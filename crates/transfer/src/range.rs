use std::fmt;
use std::str::FromStr;

use crate::TransferError;

/// A half-open byte interval `[offset, offset + length)` of an archive.
///
/// The textual form uses inclusive endpoints, e.g. the first four bytes of
/// an archive are `0-3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Byte offset of the first byte.
    pub offset: u64,
    /// Number of bytes, always at least one.
    pub length: u64,
}

impl Range {
    /// Creates a range, returning `None` for an empty one.
    pub fn new(offset: u64, length: u64) -> Option<Self> {
        if length == 0 {
            return None;
        }
        offset.checked_add(length)?;
        Some(Self { offset, length })
    }

    /// Parses the inclusive `first-last` form.
    ///
    /// Returns `None` unless the text is exactly two non-negative integers
    /// separated by one `-` with `last >= first`. Malformed text is not an
    /// error so callers can tell "no such part" apart from a transport failure.
    pub fn parse(text: &str) -> Option<Self> {
        let (first, last) = text.split_once('-')?;
        if last.contains('-') {
            return None;
        }
        let first = parse_bound(first)?;
        let last = parse_bound(last)?;
        if last < first {
            return None;
        }
        Self::new(first, (last - first).checked_add(1)?)
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Inclusive offset of the last byte.
    pub fn last(&self) -> u64 {
        self.end() - 1
    }
}

// Only plain digits; `str::parse::<u64>` would also accept a leading `+`.
fn parse_bound(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.offset, self.last())
    }
}

impl FromStr for Range {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| TransferError::InvalidRange(s.to_string()))
    }
}

/// Walks `[0, total_size)` in steps of `part_size`.
///
/// The last range is truncated to the remaining bytes. The cursor only moves
/// forward: a yielded range is never produced again.
#[derive(Debug, Clone)]
pub struct RangeCursor {
    offset: u64,
    total_size: u64,
    part_size: u64,
}

impl RangeCursor {
    /// Creates a cursor at offset 0.
    ///
    /// A `part_size` of zero yields nothing.
    pub fn new(total_size: u64, part_size: u64) -> Self {
        Self {
            offset: 0,
            total_size,
            part_size,
        }
    }

    /// Next unattempted offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.offset)
    }
}

impl Iterator for RangeCursor {
    type Item = Range;

    fn next(&mut self) -> Option<Range> {
        if self.part_size == 0 || self.offset >= self.total_size {
            return None;
        }
        let offset = self.offset;
        let length = self.part_size.min(self.total_size - offset);
        self.offset += length;
        Range::new(offset, length)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.part_size == 0 {
            return (0, Some(0));
        }
        let n = self.remaining().div_ceil(self.part_size) as usize;
        (n, Some(n))
    }
}
