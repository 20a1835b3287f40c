use std::io;

use rancor::{ResultExt as _, Source};

use super::check_seek;
use crate::ser::{Positional, Seek, Writer};

/// Wraps a type that implements [`io::Write`](std::io::Write) and equips it
/// with [`Writer`]. If the inner type also implements
/// [`io::Seek`](std::io::Seek), the wrapper implements [`Seek`].
///
/// I/O errors are passed through unchanged as the source of the returned
/// error.
///
/// # Examples
/// ```
/// # use std::io::Cursor;
/// # use blockstream::ser::{Writer, Positional, writer::IoWriter};
/// use blockstream::rancor::Error;
///
/// let mut io_writer = IoWriter::new(Cursor::new(Vec::new()));
/// assert_eq!(io_writer.pos(), 0);
/// Writer::<Error>::write(&mut io_writer, &[0u8, 1u8, 2u8, 3u8]).unwrap();
/// assert_eq!(io_writer.pos(), 4);
/// let buf = io_writer.into_inner().into_inner();
/// assert_eq!(buf, vec![0u8, 1u8, 2u8, 3u8]);
/// ```
#[derive(Debug)]
pub struct IoWriter<W> {
    inner: W,
    pos: usize,
    len: usize,
}

impl<W> IoWriter<W> {
    /// Creates a new writer from an inner writer positioned at its start.
    #[inline]
    pub fn new(inner: W) -> Self {
        Self::with_pos(inner, 0)
    }

    /// Creates a new writer from an inner writer, and assumes that the
    /// underlying writer is currently at the given position.
    ///
    /// Positions reported by the wrapper are relative to the inner writer's
    /// start, and seeking below `pos` is allowed.
    #[inline]
    pub fn with_pos(inner: W, pos: usize) -> Self {
        Self {
            inner,
            pos,
            len: pos,
        }
    }

    /// Consumes the writer and returns the inner writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> Positional for IoWriter<W> {
    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }
}

impl<W: io::Write, E: Source> Writer<E> for IoWriter<W> {
    #[inline]
    fn write(&mut self, bytes: &[u8]) -> Result<(), E> {
        self.inner.write_all(bytes).into_error()?;
        self.pos += bytes.len();
        self.len = self.len.max(self.pos);
        Ok(())
    }
}

impl<W: io::Write + io::Seek, E: Source> Seek<E> for IoWriter<W> {
    fn seek(&mut self, pos: usize) -> Result<(), E> {
        check_seek(pos, self.len)?;
        self.inner
            .seek(io::SeekFrom::Start(pos as u64))
            .into_error()?;
        self.pos = pos;
        Ok(())
    }
}
