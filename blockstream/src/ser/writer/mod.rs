//! Writing backends for finalized streams.

mod alloc;
mod core;
mod std;

use ::core::fmt;

use rancor::{fail, Fallible, Source};

pub use self::{alloc::*, core::*, std::*};
use crate::format::{Format, Primitive};

/// A writer that knows its current position.
pub trait Positional {
    /// Returns the current position of the writer.
    fn pos(&self) -> usize;
}

impl<T> Positional for &T
where
    T: Positional + ?Sized,
{
    fn pos(&self) -> usize {
        T::pos(*self)
    }
}

impl<T> Positional for &mut T
where
    T: Positional + ?Sized,
{
    fn pos(&self) -> usize {
        T::pos(*self)
    }
}

/// A type that writes bytes to some output.
///
/// A type that is [`Write`](::std::io::Write) can be wrapped in an [`IoWriter`]
/// to equip it with `Writer`.
pub trait Writer<E = <Self as Fallible>::Error>: Positional {
    /// Attempts to write the given bytes at the current position.
    fn write(&mut self, bytes: &[u8]) -> Result<(), E>;
}

impl<T, E> Writer<E> for &mut T
where
    T: Writer<E> + ?Sized,
{
    fn write(&mut self, bytes: &[u8]) -> Result<(), E> {
        T::write(*self, bytes)
    }
}

/// A writer that can move back to an earlier position and overwrite bytes.
///
/// Seeking never extends the output: the target position must be at most the
/// number of bytes written so far.
pub trait Seek<E = <Self as Fallible>::Error>: Writer<E> {
    /// Moves the writer to the given absolute position.
    fn seek(&mut self, pos: usize) -> Result<(), E>;
}

impl<T, E> Seek<E> for &mut T
where
    T: Seek<E> + ?Sized,
{
    fn seek(&mut self, pos: usize) -> Result<(), E> {
        T::seek(*self, pos)
    }
}

#[derive(Debug)]
struct SeekOutOfRange {
    pos: usize,
    len: usize,
}

impl fmt::Display for SeekOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted to seek to position {} past the end of the written \
             output (length is {})",
            self.pos, self.len,
        )
    }
}

impl ::std::error::Error for SeekOutOfRange {}

fn check_seek<E: Source>(pos: usize, len: usize) -> Result<(), E> {
    if pos > len {
        fail!(SeekOutOfRange { pos, len });
    }
    Ok(())
}

/// Helper methods for [`Writer`].
pub trait WriterExt<E>: Writer<E> {
    /// Writes the given number of zero bytes as padding.
    fn pad(&mut self, padding: usize) -> Result<(), E> {
        const MAX_ZEROS: usize = 32;
        const ZEROS: [u8; MAX_ZEROS] = [0; MAX_ZEROS];

        let mut remaining = padding;
        while remaining > 0 {
            let chunk = remaining.min(MAX_ZEROS);
            self.write(&ZEROS[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Aligns the position of the writer to the given alignment.
    fn align(&mut self, align: usize) -> Result<usize, E> {
        let mask = align - 1;
        debug_assert_eq!(align & mask, 0);

        self.pad((align - (self.pos() & mask)) & mask)?;
        Ok(self.pos())
    }

    /// Writes a primitive in the byte order of `format`.
    fn write_primitive<P: Primitive>(
        &mut self,
        format: &Format,
        value: P,
    ) -> Result<(), E> {
        let mut bytes = [0u8; 8];
        let bytes = &mut bytes[..P::SIZE];
        format.encode(value, bytes);
        self.write(bytes)
    }

    /// Writes a pointer-width value in the layout of `format`.
    fn write_pointer(&mut self, format: &Format, value: u64) -> Result<(), E> {
        let mut bytes = [0u8; 8];
        let bytes = &mut bytes[..format.pointer_size()];
        format.encode_pointer(value, bytes);
        self.write(bytes)
    }
}

impl<T, E> WriterExt<E> for T where T: Writer<E> + ?Sized {}
