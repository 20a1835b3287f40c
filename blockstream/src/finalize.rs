//! Emission of a deduplicated stream and its diagnostic tables.

use core::fmt;

use hashbrown::HashMap;
use rancor::{fail, Source};
use tracing::{debug, warn};

use crate::{
    block::DataBlock,
    context::{ContextTable, StreamContext},
    dedup::deduplicate,
    format::Format,
    hash::BlockHash,
    layout::{write_header, Layout, ROOT_SLOT},
    reference::StreamReference,
    ser::{Seek, Writer, WriterExt as _},
};

#[derive(Debug)]
struct StreamTooLarge {
    len: u64,
    max: u64,
}

impl fmt::Display for StreamTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream of {} bytes does not fit in the pointer width (maximum \
             offset is {})",
            self.len, self.max,
        )
    }
}

impl std::error::Error for StreamTooLarge {}

/// A reference that was pointed at but never given a location.
///
/// Every slot listed here was left null in the output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unresolved {
    /// The reference with no block or marker.
    pub reference: StreamReference,
    /// The stream offsets of the pointer slots that targeted it.
    pub slots: Vec<u64>,
    /// The label given to the reference while writing, if any.
    pub label: Option<String>,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved reference {}", self.reference)?;
        if let Some(label) = &self.label {
            write!(f, " ({label})")?;
        }
        write!(f, " from {} slot(s)", self.slots.len())
    }
}

/// A data unit as it was written to the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataUnit {
    /// The signature the unit was opened with, or `None` for the default
    /// unit.
    pub signature: Option<BlockHash>,
    /// The stream offset of the first byte of the unit.
    pub offset: u64,
    /// The length of the unit in bytes.
    pub len: u64,
}

/// The result of finalizing a stream.
///
/// Holds the tables that describe the bytes that were written: the offset of
/// every reference, the relocation table, the marker table and the references
/// that could not be resolved.
#[derive(Clone, Debug)]
pub struct Finalized {
    format: Format,
    len: usize,
    root: StreamReference,
    references: Vec<(StreamReference, StreamContext)>,
    unresolved: Vec<Unresolved>,
    markers: Vec<(StreamReference, u64)>,
    relocations: Vec<u64>,
    units: Vec<DataUnit>,
    offsets: HashMap<StreamReference, u64>,
    aliases: HashMap<StreamReference, StreamReference>,
    blocks_written: usize,
    blocks_collapsed: usize,
    rounds: usize,
}

impl Finalized {
    /// Returns the format the stream was written in.
    #[inline]
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Returns the number of bytes written, including the header.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether no blocks were written, leaving only the header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks_written == 0
    }

    /// Returns the reference of the root block, or
    /// [`StreamReference::EMPTY`] if the stream has no blocks.
    #[inline]
    pub fn root(&self) -> StreamReference {
        self.root
    }

    /// Returns every pointed-at reference with its patch locations and
    /// resolved offset, in the order the references were first pointed at.
    #[inline]
    pub fn references(&self) -> &[(StreamReference, StreamContext)] {
        &self.references
    }

    /// Returns the references that could not be resolved.
    #[inline]
    pub fn unresolved(&self) -> &[Unresolved] {
        &self.unresolved
    }

    /// Returns whether every pointer slot was resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Returns every marker and its stream offset, in stream order.
    #[inline]
    pub fn markers(&self) -> &[(StreamReference, u64)] {
        &self.markers
    }

    /// Returns the sorted stream offsets of every non-null pointer slot.
    ///
    /// A loader that maps the stream at some base address adds the base to
    /// the pointer stored at each of these offsets.
    #[inline]
    pub fn relocations(&self) -> &[u64] {
        &self.relocations
    }

    /// Returns every data unit that holds at least one block, in stream
    /// order.
    #[inline]
    pub fn units(&self) -> &[DataUnit] {
        &self.units
    }

    /// Returns the stream offset of a block or marker reference.
    ///
    /// References of collapsed blocks return the offset of the block that
    /// replaced them.
    pub fn offset_of(&self, reference: StreamReference) -> Option<u64> {
        let reference = self.alias_of(reference);
        self.offsets.get(&reference).copied()
    }

    /// Returns the reference of the block that replaced `reference`, or
    /// `reference` itself if it was not collapsed.
    #[inline]
    pub fn alias_of(&self, reference: StreamReference) -> StreamReference {
        self.aliases.get(&reference).copied().unwrap_or(reference)
    }

    /// Returns the number of blocks written.
    #[inline]
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Returns the number of blocks collapsed into another block.
    #[inline]
    pub fn blocks_collapsed(&self) -> usize {
        self.blocks_collapsed
    }

    /// Returns the largest number of deduplication rounds any data unit
    /// needed.
    #[inline]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Writes the relocation table: a `u32` entry count followed by every
    /// entry at pointer width, all in the stream's byte order.
    pub fn write_relocations<W, E>(&self, writer: &mut W) -> Result<(), E>
    where
        W: Writer<E> + ?Sized,
    {
        writer.write_primitive(&self.format, self.relocations.len() as u32)?;
        for &relocation in &self.relocations {
            writer.write_pointer(&self.format, relocation)?;
        }
        Ok(())
    }

    /// Writes the data unit table: a `u32` entry count followed by, for every
    /// unit, its 16-byte signature and its offset and length at pointer
    /// width. The default unit has an all-zero signature.
    pub fn write_units<W, E>(&self, writer: &mut W) -> Result<(), E>
    where
        W: Writer<E> + ?Sized,
    {
        writer.write_primitive(&self.format, self.units.len() as u32)?;
        for unit in &self.units {
            match &unit.signature {
                Some(signature) => writer.write(signature.as_bytes())?,
                None => writer.pad(16)?,
            }
            writer.write_pointer(&self.format, unit.offset)?;
            writer.write_pointer(&self.format, unit.len)?;
        }
        Ok(())
    }
}

// Groups block indices by data unit, with units in order of their first
// block.
fn group_units(
    units: &[Option<BlockHash>],
) -> Vec<(Option<BlockHash>, Vec<usize>)> {
    let mut groups = Vec::<(Option<BlockHash>, Vec<usize>)>::new();
    let mut index = HashMap::new();
    for (block, &unit) in units.iter().enumerate() {
        let group = *index.entry(unit).or_insert_with(|| {
            groups.push((unit, Vec::new()));
            groups.len() - 1
        });
        groups[group].1.push(block);
    }
    groups
}

/// Deduplicates, lays out and writes `blocks` to `writer` at its current
/// position. The first block is the root, and `units` holds the data unit of
/// every block.
pub(crate) fn emit<W, E>(
    format: Format,
    mut blocks: Vec<DataBlock>,
    units: &[Option<BlockHash>],
    labels: &HashMap<StreamReference, String>,
    writer: &mut W,
) -> Result<Finalized, E>
where
    W: Seek<E> + ?Sized,
    E: Source,
{
    debug_assert_eq!(blocks.len(), units.len());

    let mut layout = Layout::new();
    let mut data_units = Vec::new();
    let mut aliases = HashMap::new();
    let mut collapsed = 0;
    let mut rounds = 0;
    for (signature, indices) in group_units(units) {
        let collapse = deduplicate(&mut blocks, indices, &format);
        let (offset, len) = layout.place_unit(&blocks, &collapse.live);
        debug!(
            signature = ?signature,
            offset,
            len,
            collapsed = collapse.collapsed(),
            "placed data unit",
        );

        collapsed += collapse.collapsed();
        rounds = rounds.max(collapse.rounds);
        aliases.extend(collapse.aliases.iter().copied());
        data_units.push(DataUnit {
            signature,
            offset,
            len,
        });
    }

    let max = format.pointer_width.max_offset();
    if layout.len() > max {
        fail!(StreamTooLarge {
            len: layout.len(),
            max,
        });
    }

    let base = writer.pos();
    let mut contexts = ContextTable::new();

    write_header(writer, &format)?;
    let root = blocks
        .first()
        .map_or(StreamReference::EMPTY, DataBlock::reference);
    if !root.is_empty() {
        contexts.entry(root).add(ROOT_SLOT as u64);
    }

    for &(index, offset) in layout.placements() {
        let written = (writer.pos() - base) as u64;
        writer.pad((offset - written) as usize)?;
        blocks[index].write_final(writer, offset, &format, &mut contexts)?;
    }

    let mut relocations = Vec::new();
    let mut unresolved = Vec::new();
    for (reference, context) in contexts.iter_mut() {
        // Pointers across data units can still name a collapsed block.
        let target = aliases.get(&reference).copied().unwrap_or(reference);
        if let Some(offset) = layout.offset_of(target) {
            context.set_offset(offset);
        }
        if context.resolve_from(writer, base, &format)? {
            relocations.extend_from_slice(context.patches());
        } else {
            context.resolve_to_null(writer, base, &format)?;
            let label = labels.get(&reference).cloned();
            warn!(
                reference = %reference,
                slots = context.len(),
                label = label.as_deref().unwrap_or("<unlabeled>"),
                "unresolved reference",
            );
            unresolved.push(Unresolved {
                reference,
                slots: context.patches().to_vec(),
                label,
            });
        }
    }
    relocations.sort_unstable();

    debug!(
        blocks = layout.placements().len(),
        units = data_units.len(),
        collapsed,
        rounds,
        len = layout.len(),
        relocations = relocations.len(),
        "finalized stream",
    );

    let markers = layout.markers().to_vec();
    Ok(Finalized {
        format,
        len: layout.len() as usize,
        root,
        references: contexts.into_entries(),
        unresolved,
        markers,
        relocations,
        units: data_units,
        blocks_written: layout.placements().len(),
        blocks_collapsed: collapsed,
        rounds,
        aliases,
        offsets: layout.into_offsets(),
    })
}
