//! A deduplicated table of UTF-8 strings.

use hashbrown::HashMap;
use rancor::Source;

use crate::{hash::fnv1a32, reference::StreamReference, stream::DataWriter};

/// The magic number at the start of a written string table.
pub const STRING_TABLE_MAGIC: u32 = 0x36df_5de5;

/// Interns strings and writes them out as one table.
///
/// Each distinct string gets a [`StreamReference`] when it is added. Blocks
/// can point at that reference right away; it resolves to the first byte of
/// the string once the table is written. Strings are written NUL-terminated.
///
/// The written table is a main block followed by five payload blocks:
///
/// | Field          | Contents                                       |
/// |----------------|------------------------------------------------|
/// | `magic`        | `u32`, [`STRING_TABLE_MAGIC`]                  |
/// | `count`        | `u32`, the number of strings                   |
/// | `hashes`       | pointer to `count` FNV-1a hashes (`u32`)       |
/// | `offsets`      | pointer to `count` offsets into `strings`      |
/// | `char_lengths` | pointer to `count` lengths in characters       |
/// | `byte_lengths` | pointer to `count` lengths in bytes, no NUL    |
/// | `strings`      | pointer to the string bytes                    |
///
/// Entries are sorted by hash so a loader can binary search them.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    references: Vec<StreamReference>,
    index: HashMap<String, usize>,
}

impl StringTable {
    /// Creates an empty table.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a string and returns its index. Adding an equal string again
    /// returns the same index.
    pub fn add(&mut self, stream: &mut DataWriter, string: &str) -> usize {
        if let Some(&index) = self.index.get(string) {
            return index;
        }

        let index = self.strings.len();
        self.strings.push(string.to_owned());
        self.references.push(stream.reserve());
        self.index.insert(string.to_owned(), index);
        index
    }

    /// Returns the string at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> &str {
        &self.strings[index]
    }

    /// Returns the reference that resolves to the string at `index`.
    #[inline]
    pub fn reference_of(&self, index: usize) -> StreamReference {
        self.references[index]
    }

    /// Returns the length of the string at `index` in bytes.
    #[inline]
    pub fn byte_len(&self, index: usize) -> u32 {
        self.strings[index].len() as u32
    }

    /// Returns the length of the string at `index` in characters.
    #[inline]
    pub fn char_len(&self, index: usize) -> u32 {
        self.strings[index].chars().count() as u32
    }

    /// Returns the number of distinct strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns whether the table has no strings.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    fn sorted(&self) -> Vec<(u32, usize)> {
        let mut order = self
            .strings
            .iter()
            .enumerate()
            .map(|(i, s)| (fnv1a32(s.as_bytes()), i))
            .collect::<Vec<_>>();
        order.sort_unstable();
        order
    }

    /// Writes the table to `stream` and returns the reference of its main
    /// block.
    ///
    /// The table's blocks are nested in whatever block is currently open.
    pub fn write<E: Source>(
        &self,
        stream: &mut DataWriter,
    ) -> Result<StreamReference, E> {
        let order = self.sorted();

        let hashes = stream.reserve();
        let offsets = stream.reserve();
        let char_lengths = stream.reserve();
        let byte_lengths = stream.reserve();
        let strings = stream.reserve();

        let main = stream.begin_block(4);
        stream.write(STRING_TABLE_MAGIC);
        stream.write(self.len() as u32);
        for reference in [hashes, offsets, char_lengths, byte_lengths, strings]
        {
            stream.write_reference(reference);
        }
        stream.end_block();

        stream.begin_block_with::<E>(hashes, 4)?;
        for &(hash, _) in &order {
            stream.write(hash);
        }
        stream.end_block();

        stream.begin_block_with::<E>(offsets, 4)?;
        let mut offset = 0u32;
        for &(_, i) in &order {
            stream.write(offset);
            offset += self.byte_len(i) + 1;
        }
        stream.end_block();

        stream.begin_block_with::<E>(char_lengths, 4)?;
        for &(_, i) in &order {
            stream.write(self.char_len(i));
        }
        stream.end_block();

        stream.begin_block_with::<E>(byte_lengths, 4)?;
        for &(_, i) in &order {
            stream.write(self.byte_len(i));
        }
        stream.end_block();

        stream.begin_block_with::<E>(strings, 1)?;
        for &(_, i) in &order {
            stream.mark::<E>(self.references[i])?;
            stream.write_bytes(self.strings[i].as_bytes());
            stream.write_bytes(&[0]);
        }
        stream.end_block();

        Ok(main)
    }
}
