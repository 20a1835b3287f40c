use core::{fmt, ops::Deref};

use rancor::{fail, Source};

use super::check_seek;
use crate::ser::{Positional, Seek, Writer};

#[derive(Debug)]
struct BufferOverflow {
    write_len: usize,
    cap: usize,
    pos: usize,
}

impl fmt::Display for BufferOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overflowed buffer while writing {} bytes at position {} \
             (capacity is {})",
            self.write_len, self.pos, self.cap,
        )
    }
}

impl std::error::Error for BufferOverflow {}

/// Wraps a fixed byte buffer and equips it with [`Writer`] and [`Seek`].
///
/// Useful for finalizing small streams without allocating. Writes past the
/// end of the buffer fail with an overflow error.
///
/// # Examples
/// ```
/// use blockstream::{
///     rancor::Error,
///     ser::writer::Buffer,
///     DataWriter,
/// };
///
/// let mut stream = DataWriter::default();
/// stream.begin_block(4);
/// stream.write(7u32);
/// stream.end_block();
///
/// let mut bytes = [0u8; 64];
/// let mut buffer = Buffer::from(&mut bytes);
/// let finalized = stream.finalize::<_, Error>(&mut buffer).unwrap();
/// assert_eq!(buffer.len(), finalized.len());
/// ```
#[derive(Debug)]
pub struct Buffer<'a> {
    bytes: &'a mut [u8],
    pos: usize,
    len: usize,
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for Buffer<'a> {
    fn from(bytes: &'a mut [u8; N]) -> Self {
        Self::from(&mut bytes[..])
    }
}

impl<'a> From<&'a mut [u8]> for Buffer<'a> {
    fn from(bytes: &'a mut [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            len: 0,
        }
    }
}

impl Buffer<'_> {
    /// Returns the capacity of the underlying buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl Deref for Buffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..self.len]
    }
}

impl Positional for Buffer<'_> {
    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }
}

impl<E: Source> Writer<E> for Buffer<'_> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), E> {
        if bytes.len() > self.bytes.len() - self.pos {
            fail!(BufferOverflow {
                write_len: bytes.len(),
                cap: self.bytes.len(),
                pos: self.pos,
            });
        }

        let end = self.pos + bytes.len();
        self.bytes[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        self.len = self.len.max(end);
        Ok(())
    }
}

impl<E: Source> Seek<E> for Buffer<'_> {
    fn seek(&mut self, pos: usize) -> Result<(), E> {
        check_seek(pos, self.len)?;
        self.pos = pos;
        Ok(())
    }
}
