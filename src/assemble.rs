//! Buffer assembly: join a prefix of received fragments into one encoded buffer.

use bytes::Bytes;

/// Concatenate `fragments[0..=up_to]` in order, byte-exact.
///
/// An index past the end takes every fragment; an empty input yields an empty
/// buffer.
pub fn assemble<T: AsRef<[u8]>>(fragments: &[T], up_to: usize) -> Vec<u8> {
    let end = up_to.saturating_add(1).min(fragments.len());
    let prefix = &fragments[..end];

    let size = prefix.iter().map(|f| f.as_ref().len()).sum();
    let mut buffer = Vec::with_capacity(size);
    for fragment in prefix {
        buffer.extend_from_slice(fragment.as_ref());
    }
    buffer
}

/// Growing buffer for streamed bodies.
#[derive(Debug, Default)]
pub struct Accumulator {
    buffer: Vec<u8>,
    fragments: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment and return the whole buffer received so far.
    pub fn push(&mut self, fragment: &Bytes) -> &[u8] {
        self.buffer.extend_from_slice(fragment);
        self.fragments += 1;
        &self.buffer
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }
}
