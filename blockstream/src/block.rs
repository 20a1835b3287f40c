//! Unfinalized block bodies.

use hashbrown::HashMap;

use crate::{
    context::ContextTable,
    format::{Format, Primitive},
    hash::{BlockHash, BlockHasher},
    reference::StreamReference,
    ser::{Writer, WriterExt as _},
};

/// The kind of a single write into a block.
///
/// One tag is recorded per write and hashed together with the block bytes, so
/// blocks only collapse when they were built from the same sequence of
/// primitive, pointer and padding writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// A fixed-width primitive value.
    Primitive = 1,
    /// A pointer slot.
    Reference = 2,
    /// Zero padding inserted for alignment.
    Padding = 3,
    /// An opaque run of bytes.
    Bytes = 4,
}

/// The body of one logical object, array, string or compound value.
///
/// A block is append-only while it is being built. After that its bytes only
/// change when a pointer slot is redirected by
/// [`replace_reference`](DataBlock::replace_reference).
///
/// Pointer slots hold a placeholder until the stream is emitted: the id of the
/// reference they point at, or zero for [`StreamReference::EMPTY`]. Two blocks
/// that point at different targets therefore hash differently until those
/// targets are collapsed into one.
#[derive(Clone, Debug)]
pub struct DataBlock {
    reference: StreamReference,
    alignment: usize,
    data: Vec<u8>,
    tags: Vec<u8>,
    pointers: HashMap<StreamReference, Vec<usize>>,
    markers: Vec<(StreamReference, usize)>,
    hash: Option<BlockHash>,
}

impl DataBlock {
    /// Creates an empty block identified by `reference`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    pub fn new(reference: StreamReference, alignment: usize) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "block alignment must be a power of two, got {alignment}"
        );

        Self {
            reference,
            alignment,
            data: Vec::new(),
            tags: Vec::new(),
            pointers: HashMap::new(),
            markers: Vec::new(),
            hash: None,
        }
    }

    /// Returns the reference that identifies this block.
    #[inline]
    pub fn reference(&self) -> StreamReference {
        self.reference
    }

    /// Returns the alignment the block must be placed at.
    ///
    /// This is at least the width of the widest primitive or pointer written
    /// into the block.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Returns the block bytes, with placeholders in pointer slots.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the tag of every write, in order.
    #[inline]
    pub fn tags(&self) -> &[u8] {
        &self.tags
    }

    /// Returns the length of the block in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether nothing has been written to the block.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the markers recorded in this block and their block offsets.
    #[inline]
    pub fn markers(&self) -> &[(StreamReference, usize)] {
        &self.markers
    }

    /// Returns the block offsets of the pointer slots that target
    /// `reference`.
    #[inline]
    pub fn slots_of(&self, reference: StreamReference) -> &[usize] {
        self.pointers
            .get(&reference)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates over every reference this block points at.
    #[inline]
    pub fn targets(&self) -> impl Iterator<Item = StreamReference> + '_ {
        self.pointers.keys().copied()
    }

    /// Returns every pointer slot as `(block offset, target)`, sorted by
    /// offset.
    pub fn slots(&self) -> Vec<(usize, StreamReference)> {
        let mut slots = self
            .pointers
            .iter()
            .flat_map(|(&target, offsets)| {
                offsets.iter().map(move |&offset| (offset, target))
            })
            .collect::<Vec<_>>();
        slots.sort_unstable_by_key(|&(offset, _)| offset);
        slots
    }

    #[inline]
    fn append(&mut self, size: usize, tag: Tag) -> &mut [u8] {
        let start = self.data.len();
        self.data.resize(start + size, 0);
        self.tags.push(tag as u8);
        self.hash = None;
        &mut self.data[start..]
    }

    #[inline]
    fn require_aligned(&mut self, size: usize) {
        assert!(
            self.data.len() % size == 0,
            "misaligned write of {} bytes at offset {} of block {}",
            size,
            self.data.len(),
            self.reference,
        );
        self.alignment = self.alignment.max(size);
    }

    /// Appends a primitive in the byte order of `format`.
    ///
    /// # Panics
    ///
    /// Panics if the block length is not a multiple of the primitive's size.
    pub fn write<P: Primitive>(&mut self, format: &Format, value: P) {
        self.require_aligned(P::SIZE);
        format.encode(value, self.append(P::SIZE, Tag::Primitive));
    }

    /// Appends an opaque run of bytes. No alignment is required.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.append(bytes.len(), Tag::Bytes).copy_from_slice(bytes);
    }

    /// Pads the block with zeros up to a multiple of `align`.
    pub fn pad_to(&mut self, align: usize) {
        debug_assert!(align.is_power_of_two());
        let padding = (align - (self.data.len() & (align - 1))) & (align - 1);
        if padding > 0 {
            self.append(padding, Tag::Padding);
        }
        self.alignment = self.alignment.max(align);
    }

    /// Appends a pointer slot targeting `reference`.
    ///
    /// # Panics
    ///
    /// Panics if the block length is not a multiple of the pointer width.
    pub fn write_reference(
        &mut self,
        format: &Format,
        reference: StreamReference,
    ) {
        let size = format.pointer_size();
        self.require_aligned(size);

        let offset = self.data.len();
        let slot = self.append(size, Tag::Reference);
        format.encode_pointer(reference.id() as u64, slot);
        self.pointers.entry(reference).or_default().push(offset);
    }

    /// Records the current end of the block as the location of `reference`.
    pub fn mark(&mut self, reference: StreamReference) {
        self.markers.push((reference, self.data.len()));
    }

    /// Returns the content hash of the block bytes and tags.
    ///
    /// The hash is cached until the block changes.
    pub fn content_hash(&mut self) -> BlockHash {
        if let Some(hash) = self.hash {
            return hash;
        }

        let mut hasher = BlockHasher::new();
        hasher.update(&(self.data.len() as u64).to_le_bytes());
        hasher.update(&self.data);
        hasher.update(&self.tags);
        let hash = hasher.finish();
        self.hash = Some(hash);
        hash
    }

    /// Redirects every pointer slot targeting `old` to `new`.
    ///
    /// If the block itself is identified by `old`, it is renamed to `new`.
    /// Does nothing for slots if the block never pointed at `old`.
    pub fn replace_reference(
        &mut self,
        format: &Format,
        old: StreamReference,
        new: StreamReference,
    ) {
        if self.reference == old {
            self.reference = new;
        }

        let Some(offsets) = self.pointers.remove(&old) else {
            return;
        };

        let size = format.pointer_size();
        for &offset in &offsets {
            format.encode_pointer(
                new.id() as u64,
                &mut self.data[offset..offset + size],
            );
        }
        self.pointers.entry(new).or_default().extend(offsets);
        self.hash = None;
    }

    /// Applies every `old -> new` pair of `renames` to this block.
    pub fn replace_references(
        &mut self,
        format: &Format,
        renames: &HashMap<StreamReference, StreamReference>,
    ) {
        if let Some(&new) = renames.get(&self.reference) {
            self.reference = new;
        }

        let stale = self
            .targets()
            .filter(|target| renames.contains_key(target))
            .collect::<Vec<_>>();
        for old in stale {
            self.replace_reference(format, old, renames[&old]);
        }
    }

    /// Takes over what a content-identical duplicate needs from its survivor:
    /// the stricter alignment and the duplicate's markers.
    pub fn absorb(&mut self, duplicate: &DataBlock) {
        debug_assert_eq!(self.data, duplicate.data);
        self.alignment = self.alignment.max(duplicate.alignment);
        self.markers.extend_from_slice(&duplicate.markers);
    }

    /// Writes the block to `writer` at the writer's current position, which
    /// must be `base + offset` for the block's assigned stream `offset`.
    ///
    /// Pointer slots are written as zero. The stream location of every slot
    /// with a non-empty target is recorded in that target's context so the
    /// global resolve pass can patch it.
    pub fn write_final<W, E>(
        &self,
        writer: &mut W,
        offset: u64,
        format: &Format,
        contexts: &mut ContextTable,
    ) -> Result<(), E>
    where
        W: Writer<E> + ?Sized,
    {
        let size = format.pointer_size();
        let mut cursor = 0;
        for (slot, target) in self.slots() {
            writer.write(&self.data[cursor..slot])?;
            writer.pad(size)?;
            cursor = slot + size;

            if !target.is_empty() {
                contexts.entry(target).add(offset + slot as u64);
            }
        }
        writer.write(&self.data[cursor..])
    }
}
