//! Linear placement of surviving blocks and the stream header.

use hashbrown::HashMap;

use crate::{
    block::DataBlock,
    format::Format,
    reference::StreamReference,
    ser::{Writer, WriterExt as _},
};

/// The magic bytes at the start of every stream.
pub const MAGIC: [u8; 4] = *b"BSTM";

/// The size of the stream header.
///
/// The header holds the magic, the format flags and a pointer to the root
/// block. No block is ever placed at offset 0, so a zero pointer always means
/// null.
pub const HEADER_SIZE: usize = 16;

/// The stream offset of the root pointer slot in the header.
pub const ROOT_SLOT: usize = 8;

/// The alignment of the start of every data unit.
pub const UNIT_ALIGNMENT: usize = 16;

/// Rounds `pos` up to a multiple of `align`, which must be a power of two.
#[inline]
pub const fn align_up(pos: u64, align: usize) -> u64 {
    let mask = align as u64 - 1;
    (pos + mask) & !mask
}

/// Writes a stream header whose root slot is zero.
pub fn write_header<W, E>(writer: &mut W, format: &Format) -> Result<(), E>
where
    W: Writer<E> + ?Sized,
{
    writer.write(&MAGIC)?;
    writer.write_primitive(format, format.flags())?;
    writer.pad(HEADER_SIZE - 8)
}

/// The stream offsets of the surviving blocks and markers.
#[derive(Clone, Debug)]
pub struct Layout {
    placements: Vec<(usize, u64)>,
    offsets: HashMap<StreamReference, u64>,
    markers: Vec<(StreamReference, u64)>,
    len: u64,
}

impl Default for Layout {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    /// Creates a layout with nothing placed after the header.
    pub fn new() -> Self {
        Self {
            placements: Vec::new(),
            offsets: HashMap::new(),
            markers: Vec::new(),
            len: HEADER_SIZE as u64,
        }
    }

    /// Places the `live` blocks of one data unit after everything placed so
    /// far, starting at the next multiple of [`UNIT_ALIGNMENT`].
    ///
    /// Returns the start offset of the unit and its length.
    pub fn place_unit(
        &mut self,
        blocks: &[DataBlock],
        live: &[usize],
    ) -> (u64, u64) {
        let start = align_up(self.len, UNIT_ALIGNMENT);
        let mut running = start;

        self.placements.reserve(live.len());
        for &index in live {
            let block = &blocks[index];
            let offset = align_up(running, block.alignment());
            self.placements.push((index, offset));
            self.offsets.insert(block.reference(), offset);
            for &(marker, at) in block.markers() {
                let marked = offset + at as u64;
                self.offsets.insert(marker, marked);
                self.markers.push((marker, marked));
            }
            running = offset + block.len() as u64;
        }

        self.len = running;
        (start, running - start)
    }

    /// Returns `(block index, stream offset)` for every placed block, in
    /// stream order.
    #[inline]
    pub fn placements(&self) -> &[(usize, u64)] {
        &self.placements
    }

    /// Returns the stream offset of a block or marker reference.
    #[inline]
    pub fn offset_of(&self, reference: StreamReference) -> Option<u64> {
        self.offsets.get(&reference).copied()
    }

    /// Returns every marker and its stream offset, in stream order.
    #[inline]
    pub fn markers(&self) -> &[(StreamReference, u64)] {
        &self.markers
    }

    /// Returns the total length of the stream, including the header.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns whether no blocks have been placed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Returns the offset table, consuming the layout.
    #[inline]
    pub fn into_offsets(self) -> HashMap<StreamReference, u64> {
        self.offsets
    }
}
