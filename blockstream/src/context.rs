//! Global reference resolution.
//!
//! A [`StreamContext`] collects every location in the output where a pointer
//! to one reference was written, together with the final offset of that
//! reference once layout is known. Resolving a context seeks back to each
//! location and writes the offset.

use hashbrown::HashMap;

use crate::{
    format::Format,
    reference::StreamReference,
    ser::{Seek, WriterExt as _},
};

/// The patch locations of one reference and the offset they resolve to.
///
/// Patch locations and offsets are relative to the start of the stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamContext {
    offset: Option<u64>,
    patches: Vec<u64>,
}

impl StreamContext {
    /// Creates a context with no offset and no patches.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a location that must be patched with this context's offset.
    #[inline]
    pub fn add(&mut self, patch: u64) {
        self.patches.push(patch);
    }

    /// Returns the number of recorded patch locations.
    #[inline]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns whether no patch locations were recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Returns the recorded patch locations.
    #[inline]
    pub fn patches(&self) -> &[u64] {
        &self.patches
    }

    /// Returns the resolved offset, if known.
    #[inline]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Sets the resolved offset.
    #[inline]
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    /// Writes the resolved offset at every patch location of a stream that
    /// starts at position 0 of `writer`.
    ///
    /// Returns `Ok(false)` without writing anything if there are patch
    /// locations but no offset is known. The writer position is restored
    /// afterwards.
    #[inline]
    pub fn resolve<W, E>(
        &self,
        writer: &mut W,
        format: &Format,
    ) -> Result<bool, E>
    where
        W: Seek<E> + ?Sized,
    {
        self.resolve_from(writer, 0, format)
    }

    /// Like [`resolve`](Self::resolve), for a stream that starts at position
    /// `base` of `writer`.
    pub fn resolve_from<W, E>(
        &self,
        writer: &mut W,
        base: usize,
        format: &Format,
    ) -> Result<bool, E>
    where
        W: Seek<E> + ?Sized,
    {
        if self.patches.is_empty() {
            return Ok(true);
        }
        let Some(offset) = self.offset else {
            return Ok(false);
        };

        self.patch_all(writer, base, format, offset)?;
        Ok(true)
    }

    /// Writes a null pointer at every patch location.
    pub fn resolve_to_null<W, E>(
        &self,
        writer: &mut W,
        base: usize,
        format: &Format,
    ) -> Result<(), E>
    where
        W: Seek<E> + ?Sized,
    {
        if self.patches.is_empty() {
            return Ok(());
        }
        self.patch_all(writer, base, format, 0)
    }

    fn patch_all<W, E>(
        &self,
        writer: &mut W,
        base: usize,
        format: &Format,
        value: u64,
    ) -> Result<(), E>
    where
        W: Seek<E> + ?Sized,
    {
        let current = writer.pos();
        for &patch in &self.patches {
            writer.seek(base + patch as usize)?;
            writer.write_pointer(format, value)?;
        }
        writer.seek(current)
    }
}

/// An insertion-ordered table of [`StreamContext`]s keyed by reference.
#[derive(Clone, Debug, Default)]
pub struct ContextTable {
    entries: Vec<(StreamReference, StreamContext)>,
    index: HashMap<StreamReference, usize>,
}

impl ContextTable {
    /// Creates an empty table.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context for `reference`, creating it if needed.
    pub fn entry(&mut self, reference: StreamReference) -> &mut StreamContext {
        let index = *self.index.entry(reference).or_insert_with(|| {
            self.entries.push((reference, StreamContext::new()));
            self.entries.len() - 1
        });
        &mut self.entries[index].1
    }

    /// Returns the context for `reference`, if any.
    #[inline]
    pub fn get(&self, reference: StreamReference) -> Option<&StreamContext> {
        self.index.get(&reference).map(|&i| &self.entries[i].1)
    }

    /// Returns the number of references in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the table in insertion order.
    #[inline]
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (StreamReference, &StreamContext)> + '_ {
        self.entries.iter().map(|(r, c)| (*r, c))
    }

    /// Iterates mutably over the table in insertion order.
    #[inline]
    pub fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (StreamReference, &mut StreamContext)> + '_ {
        self.entries.iter_mut().map(|(r, c)| (*r, c))
    }

    /// Consumes the table and returns its entries in insertion order.
    #[inline]
    pub fn into_entries(self) -> Vec<(StreamReference, StreamContext)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use rancor::Panic;

    use super::*;
    use crate::{
        reference::ReferenceAllocator,
        ser::{writer::VecWriter, Positional, Writer},
    };

    fn zeros(len: usize) -> VecWriter {
        let mut writer = VecWriter::new();
        Writer::<Panic>::write(&mut writer, &vec![0; len]).unwrap();
        writer
    }

    #[test]
    fn resolve_patches_every_location() {
        let mut writer = zeros(12);
        let mut context = StreamContext::new();
        context.add(0);
        context.add(8);
        context.set_offset(0x20);

        let resolved = context
            .resolve::<_, Panic>(&mut writer, &Format::LITTLE_32)
            .unwrap();

        assert!(resolved);
        assert_eq!(
            writer.as_slice(),
            &[0x20, 0, 0, 0, 0, 0, 0, 0, 0x20, 0, 0, 0]
        );
        assert_eq!(writer.pos(), 12);
    }

    #[test]
    fn resolve_without_offset_reports_failure() {
        let mut writer = zeros(4);
        let mut context = StreamContext::new();
        context.add(0);

        let resolved = context
            .resolve::<_, Panic>(&mut writer, &Format::LITTLE_32)
            .unwrap();

        assert!(!resolved);
        assert_eq!(writer.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn resolve_to_null_clears_slots() {
        let mut writer = VecWriter::new();
        Writer::<Panic>::write(&mut writer, &[0xff; 16]).unwrap();
        let mut context = StreamContext::new();
        context.add(8);

        context
            .resolve_to_null::<_, Panic>(&mut writer, 0, &Format::BIG_64)
            .unwrap();

        assert_eq!(&writer.as_slice()[..8], &[0xff; 8]);
        assert_eq!(&writer.as_slice()[8..], &[0; 8]);
    }

    #[test]
    fn resolve_from_base() {
        let mut writer = zeros(8);
        let mut context = StreamContext::new();
        context.add(0);
        context.set_offset(7);

        context
            .resolve_from::<_, Panic>(&mut writer, 4, &Format::BIG_32)
            .unwrap();

        assert_eq!(writer.as_slice(), &[0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn table_keeps_first_use_order() {
        let mut refs = ReferenceAllocator::new();
        let (a, b) = (refs.allocate(), refs.allocate());

        let mut table = ContextTable::new();
        table.entry(b).add(4);
        table.entry(a).add(8);
        table.entry(b).add(12);

        let order: Vec<_> = table.iter().map(|(r, c)| (r, c.len())).collect();
        assert_eq!(order, vec![(b, 2), (a, 1)]);
        assert_eq!(table.get(a).map(StreamContext::patches), Some(&[8][..]));
    }
}
