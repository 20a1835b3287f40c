use rancor::Source;

use super::check_seek;
use crate::ser::{Positional, Seek, Writer};

impl Positional for Vec<u8> {
    #[inline]
    fn pos(&self) -> usize {
        self.len()
    }
}

impl<E> Writer<E> for Vec<u8> {
    #[inline]
    fn write(&mut self, bytes: &[u8]) -> Result<(), E> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A growable in-memory writer that supports [`Seek`].
///
/// Plain `Vec<u8>` is an append-only [`Writer`]; `VecWriter` additionally
/// keeps a cursor so finalization can go back and patch pointer slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VecWriter {
    bytes: Vec<u8>,
    pos: usize,
}

impl VecWriter {
    /// Creates an empty writer.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Returns the written bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of bytes written.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discards the written bytes and rewinds the cursor, keeping capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.pos = 0;
    }

    /// Consumes the writer and returns the written bytes.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl Positional for VecWriter {
    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }
}

impl<E> Writer<E> for VecWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), E> {
        let overlap = bytes.len().min(self.bytes.len() - self.pos);
        let (inside, outside) = bytes.split_at(overlap);
        self.bytes[self.pos..self.pos + overlap].copy_from_slice(inside);
        self.bytes.extend_from_slice(outside);
        self.pos += bytes.len();
        Ok(())
    }
}

impl<E: Source> Seek<E> for VecWriter {
    fn seek(&mut self, pos: usize) -> Result<(), E> {
        check_seek(pos, self.bytes.len())?;
        self.pos = pos;
        Ok(())
    }
}
