//! Convenience functions for writing and loading streams.

use core::fmt;

use rancor::{fail, Source};

use crate::{
    finalize::Finalized,
    format::Format,
    layout::{HEADER_SIZE, MAGIC, ROOT_SLOT},
    ser::{writer::VecWriter, Seek},
    stream::DataWriter,
};

/// Finalizes a stream into a new byte vector.
///
/// # Example
///
/// ```
/// use blockstream::{api::to_bytes, rancor::Error, DataWriter};
///
/// let mut stream = DataWriter::default();
/// stream.begin_block(4);
/// stream.write(31415926u32);
/// stream.end_block();
///
/// let (bytes, finalized) = to_bytes::<Error>(stream).unwrap();
/// assert_eq!(&bytes[..4], b"BSTM");
/// assert_eq!(finalized.relocations(), &[8]);
/// ```
pub fn to_bytes<E: Source>(
    stream: DataWriter,
) -> Result<(Vec<u8>, Finalized), E> {
    let (writer, finalized) = to_bytes_in::<_, E>(stream, VecWriter::new())?;
    Ok((writer.into_inner(), finalized))
}

/// Finalizes a stream into the given writer and returns it.
///
/// The stream starts at the writer's current position.
pub fn to_bytes_in<W, E>(
    stream: DataWriter,
    mut writer: W,
) -> Result<(W, Finalized), E>
where
    W: Seek<E>,
    E: Source,
{
    let finalized = stream.finalize::<_, E>(&mut writer)?;
    Ok((writer, finalized))
}

/// Reads the pointer stored at `slot` in a finalized stream.
///
/// # Panics
///
/// Panics if the slot extends past the end of `bytes`.
#[inline]
pub fn read_pointer(bytes: &[u8], slot: usize, format: &Format) -> u64 {
    format.decode_pointer(&bytes[slot..slot + format.pointer_size()])
}

#[derive(Debug)]
struct InvalidHeader {
    reason: &'static str,
}

impl fmt::Display for InvalidHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid stream header: {}", self.reason)
    }
}

impl std::error::Error for InvalidHeader {}

/// The decoded header of a finalized stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The format the stream was written in.
    pub format: Format,
    /// The offset of the root block, or 0 if the stream is empty.
    pub root: u64,
}

impl Header {
    /// Decodes the header at the start of `bytes`.
    pub fn read<E: Source>(bytes: &[u8]) -> Result<Self, E> {
        if bytes.len() < HEADER_SIZE {
            fail!(InvalidHeader {
                reason: "stream is shorter than its header",
            });
        }
        if bytes[..4] != MAGIC {
            fail!(InvalidHeader {
                reason: "magic bytes do not match",
            });
        }

        // Flags are a u32 in the stream's own byte order, and only the low
        // bits are used, so checking both orders finds the right one.
        let raw = [bytes[4], bytes[5], bytes[6], bytes[7]];
        let flags = if raw[0] != 0 || raw == [0; 4] {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        };
        if flags & !3 != 0 {
            fail!(InvalidHeader {
                reason: "unknown format flags",
            });
        }

        let format = Format::from_flags(flags);
        Ok(Self {
            format,
            root: read_pointer(bytes, ROOT_SLOT, &format),
        })
    }
}

/// Rebases every relocated pointer of a loaded stream by `base`.
///
/// Null pointers are never listed in the relocation table and are left
/// untouched.
///
/// # Panics
///
/// Panics if a relocation lies outside of `bytes`.
pub fn relocate(
    bytes: &mut [u8],
    relocations: &[u64],
    base: u64,
    format: &Format,
) {
    let size = format.pointer_size();
    for &relocation in relocations {
        let slot = &mut bytes[relocation as usize..relocation as usize + size];
        let value = format.decode_pointer(slot);
        format.encode_pointer(value + base, slot);
    }
}
