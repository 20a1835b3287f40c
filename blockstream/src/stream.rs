//! The block-building front end.

use core::fmt;

use hashbrown::HashMap;
use rancor::{fail, Source};
use tracing::trace;

use crate::{
    block::DataBlock,
    finalize::{emit, Finalized},
    format::{Format, Primitive},
    hash::BlockHash,
    reference::{ReferenceAllocator, StreamReference},
    ser::Seek,
};

#[derive(Debug)]
struct EmptyReference;

impl fmt::Display for EmptyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the empty reference cannot name a block or marker")
    }
}

impl std::error::Error for EmptyReference {}

#[derive(Debug)]
struct ForeignReference {
    reference: StreamReference,
}

impl fmt::Display for ForeignReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reference {} was not reserved by this writer",
            self.reference
        )
    }
}

impl std::error::Error for ForeignReference {}

#[derive(Debug)]
struct DuplicateBlock {
    reference: StreamReference,
}

impl fmt::Display for DuplicateBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reference {} already names a block", self.reference)
    }
}

impl std::error::Error for DuplicateBlock {}

#[derive(Debug)]
struct DuplicateMarker {
    reference: StreamReference,
}

impl fmt::Display for DuplicateMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reference {} already names a marker", self.reference)
    }
}

impl std::error::Error for DuplicateMarker {}

/// Builds a stream out of nested blocks and writes it out deduplicated.
///
/// Blocks are opened with [`begin_block`](Self::begin_block) and closed with
/// [`end_block`](Self::end_block) in strictly nested order. Writes always go
/// to the most recently opened block. The first block ever opened is the root
/// of the stream.
///
/// Blocks can be grouped into data units with
/// [`open_data_unit`](Self::open_data_unit). A block belongs to the innermost
/// unit open when it was begun, or to the default unit if none was. Blocks
/// are only collapsed with blocks of the same unit, and every unit is written
/// as one contiguous run starting on a 16-byte boundary.
///
/// A reference can be written as a pointer before the block it names has been
/// begun, or even reserved with [`reserve`](Self::reserve) and never begun at
/// all. [`finalize`](Self::finalize) collapses content-identical blocks,
/// places the survivors, patches every pointer and reports the references it
/// could not resolve.
///
/// # Panics
///
/// Writing with no open block, closing a block when none is open, writing a
/// value at an offset that is not a multiple of its size and finalizing with
/// open blocks are contract violations and panic.
///
/// # Examples
/// ```
/// use blockstream::{api::to_bytes, rancor::Error, DataWriter};
///
/// let mut stream = DataWriter::default();
/// stream.begin_block(4);
/// let first = stream.reserve();
/// let second = stream.reserve();
/// stream.write_reference(first);
/// stream.write_reference(second);
/// stream.end_block();
///
/// for leaf in [first, second] {
///     stream.begin_block_with::<Error>(leaf, 4).unwrap();
///     stream.write(42i32);
///     stream.end_block();
/// }
///
/// let (bytes, finalized) = to_bytes::<Error>(stream).unwrap();
/// assert_eq!(finalized.blocks_collapsed(), 1);
/// assert_eq!(finalized.offset_of(first), finalized.offset_of(second));
/// assert_eq!(bytes.len(), finalized.len());
/// ```
#[derive(Debug)]
pub struct DataWriter {
    format: Format,
    refs: ReferenceAllocator,
    blocks: Vec<DataBlock>,
    index: HashMap<StreamReference, usize>,
    markers: HashMap<StreamReference, usize>,
    stack: Vec<usize>,
    labels: HashMap<StreamReference, String>,
    units: Vec<BlockHash>,
    unit_index: HashMap<BlockHash, usize>,
    unit_stack: Vec<usize>,
    block_units: Vec<Option<usize>>,
}

impl Default for DataWriter {
    #[inline]
    fn default() -> Self {
        Self::new(Format::default())
    }
}

impl DataWriter {
    /// Creates an empty writer for the given format.
    pub fn new(format: Format) -> Self {
        Self {
            format,
            refs: ReferenceAllocator::new(),
            blocks: Vec::new(),
            index: HashMap::new(),
            markers: HashMap::new(),
            stack: Vec::new(),
            labels: HashMap::new(),
            units: Vec::new(),
            unit_index: HashMap::new(),
            unit_stack: Vec::new(),
            block_units: Vec::new(),
        }
    }

    /// Returns the format the stream is written in.
    #[inline]
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Returns a fresh reference that does not name anything yet.
    #[inline]
    pub fn reserve(&mut self) -> StreamReference {
        self.refs.allocate()
    }

    /// Opens a new block and returns its reference.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn begin_block(&mut self, alignment: usize) -> StreamReference {
        let reference = self.reserve();
        self.open(reference, alignment);
        reference
    }

    /// Opens a new block named by a previously reserved reference.
    ///
    /// Fails if `reference` is empty, was not reserved by this writer or
    /// already names a block or marker.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn begin_block_with<E: Source>(
        &mut self,
        reference: StreamReference,
        alignment: usize,
    ) -> Result<(), E> {
        self.check_unused::<E>(reference)?;
        self.open(reference, alignment);
        Ok(())
    }

    fn check_unused<E: Source>(
        &self,
        reference: StreamReference,
    ) -> Result<(), E> {
        if reference.is_empty() {
            fail!(EmptyReference);
        }
        if reference.id() as usize > self.refs.allocated() {
            fail!(ForeignReference { reference });
        }
        if self.index.contains_key(&reference) {
            fail!(DuplicateBlock { reference });
        }
        if self.markers.contains_key(&reference) {
            fail!(DuplicateMarker { reference });
        }
        Ok(())
    }

    fn open(&mut self, reference: StreamReference, alignment: usize) {
        let index = self.blocks.len();
        self.blocks.push(DataBlock::new(reference, alignment));
        self.block_units.push(self.unit_stack.last().copied());
        self.index.insert(reference, index);
        self.stack.push(index);
        trace!(%reference, alignment, depth = self.stack.len(), "begin block");
    }

    fn current(&mut self) -> &mut DataBlock {
        let Some(&index) = self.stack.last() else {
            panic!("attempted to write with no open block");
        };
        &mut self.blocks[index]
    }

    /// Writes a primitive to the current block.
    ///
    /// # Panics
    ///
    /// Panics if the block length is not a multiple of the primitive's size.
    #[inline]
    pub fn write<P: Primitive>(&mut self, value: P) {
        let format = self.format;
        self.current().write(&format, value);
    }

    /// Pads the current block to the primitive's size, then writes it.
    #[inline]
    pub fn write_aligned<P: Primitive>(&mut self, value: P) {
        self.align(P::SIZE);
        self.write(value);
    }

    /// Writes raw bytes to the current block.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.current().write_bytes(bytes);
    }

    /// Pads the current block with zeros to a multiple of `align`, and raises
    /// its alignment to at least `align`.
    #[inline]
    pub fn align(&mut self, align: usize) {
        assert!(
            align.is_power_of_two(),
            "alignment must be a power of two, got {align}"
        );
        self.current().pad_to(align);
    }

    /// Writes a pointer slot targeting `reference` to the current block.
    ///
    /// # Panics
    ///
    /// Panics if the block length is not a multiple of the pointer width.
    #[inline]
    pub fn write_reference(&mut self, reference: StreamReference) {
        let format = self.format;
        self.current().write_reference(&format, reference);
    }

    /// Writes a string: a pointer slot to its bytes followed by its length in
    /// bytes and in characters.
    pub fn write_string_reference(
        &mut self,
        reference: StreamReference,
        byte_len: u32,
        char_len: u32,
    ) {
        self.write_reference(reference);
        self.write(byte_len);
        self.write(char_len);
    }

    /// Makes `reference` resolve to the current position in the current
    /// block.
    ///
    /// Fails if `reference` is empty, was not reserved by this writer or
    /// already names a block or marker.
    pub fn mark<E: Source>(
        &mut self,
        reference: StreamReference,
    ) -> Result<(), E> {
        self.check_unused::<E>(reference)?;
        let Some(&index) = self.stack.last() else {
            panic!("attempted to mark with no open block");
        };
        self.blocks[index].mark(reference);
        self.markers.insert(reference, index);
        Ok(())
    }

    /// Closes the current block and returns its reference.
    ///
    /// # Panics
    ///
    /// Panics if no block is open.
    pub fn end_block(&mut self) -> StreamReference {
        let Some(index) = self.stack.pop() else {
            panic!("attempted to end a block with no open block");
        };
        let block = &self.blocks[index];
        trace!(
            reference = %block.reference(),
            len = block.len(),
            depth = self.stack.len(),
            "end block",
        );
        block.reference()
    }

    /// Returns the number of open blocks.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Opens the data unit identified by `signature` and returns its index.
    ///
    /// Opening a signature that was opened before reopens the same unit.
    /// Units nest: blocks begun until the matching
    /// [`close_data_unit`](Self::close_data_unit) belong to this unit.
    pub fn open_data_unit(&mut self, signature: BlockHash) -> usize {
        let index = *self.unit_index.entry(signature).or_insert_with(|| {
            self.units.push(signature);
            self.units.len() - 1
        });
        self.unit_stack.push(index);
        trace!(%signature, index, "open data unit");
        index
    }

    /// Closes the innermost data unit and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if no data unit is open.
    pub fn close_data_unit(&mut self) -> usize {
        let Some(index) = self.unit_stack.pop() else {
            panic!("attempted to close a data unit with no open data unit");
        };
        index
    }

    /// Returns the index of the data unit blocks are currently written to, or
    /// `None` for the default unit.
    #[inline]
    pub fn current_data_unit(&self) -> Option<usize> {
        self.unit_stack.last().copied()
    }

    /// Returns the signatures of every data unit opened so far, by index.
    #[inline]
    pub fn data_units(&self) -> &[BlockHash] {
        &self.units
    }

    /// Returns the number of blocks begun so far.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Attaches a human-readable name to `reference`, reported if it cannot
    /// be resolved.
    pub fn label(
        &mut self,
        reference: StreamReference,
        name: impl Into<String>,
    ) {
        self.labels.insert(reference, name.into());
    }

    /// Iterates over every labeled reference and its label, in no particular
    /// order.
    #[inline]
    pub fn labels(&self) -> impl Iterator<Item = (StreamReference, &str)> {
        self.labels.iter().map(|(r, label)| (*r, label.as_str()))
    }

    /// Returns the label attached to `reference`, if any.
    #[inline]
    pub fn label_of(&self, reference: StreamReference) -> Option<&str> {
        self.labels.get(&reference).map(String::as_str)
    }

    /// Deduplicates the blocks and writes the stream to `writer`, starting at
    /// its current position.
    ///
    /// Pointer offsets are relative to the start of the stream. Errors from
    /// the writer are returned unchanged; unresolved references are not
    /// errors and are reported in the result instead.
    ///
    /// # Panics
    ///
    /// Panics if any block or data unit is still open.
    pub fn finalize<W, E>(self, writer: &mut W) -> Result<Finalized, E>
    where
        W: Seek<E> + ?Sized,
        E: Source,
    {
        assert!(
            self.stack.is_empty(),
            "attempted to finalize with {} open block(s)",
            self.stack.len(),
        );
        assert!(
            self.unit_stack.is_empty(),
            "attempted to finalize with {} open data unit(s)",
            self.unit_stack.len(),
        );

        let units = self
            .block_units
            .iter()
            .map(|unit| unit.map(|index| self.units[index]))
            .collect::<Vec<_>>();
        emit(self.format, self.blocks, &units, &self.labels, writer)
    }
}
