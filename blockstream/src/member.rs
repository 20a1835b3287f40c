//! Writing explicit value trees as streams.
//!
//! [`Member`] is a schema-free description of an object graph. Inheritance is
//! expressed by composition: a derived object is an [`Member::Object`] whose
//! first field is its base object, which ends up in a block of its own joined
//! to the derived object by a pointer.

use rancor::Source;

use crate::{
    finalize::Finalized,
    format::{Format, Primitive},
    reference::StreamReference,
    ser::{writer::VecWriter, Seek},
    stream::DataWriter,
    strings::StringTable,
};

/// A value in an object graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Member {
    /// A null pointer.
    Null,
    /// A `bool`, written as one byte.
    Bool(bool),
    /// An `i8`.
    I8(i8),
    /// A `u8`.
    U8(u8),
    /// An `i16`.
    I16(i16),
    /// A `u16`.
    U16(u16),
    /// An `i32`.
    I32(i32),
    /// A `u32`.
    U32(u32),
    /// An `i64`.
    I64(i64),
    /// A `u64`.
    U64(u64),
    /// An `f32`.
    F32(f32),
    /// An `f64`.
    F64(f64),
    /// A string, written as a pointer into the string table followed by its
    /// byte and character lengths.
    String(String),
    /// An array, written as a pointer to a block of its items followed by a
    /// `u32` item count. Empty arrays are a null pointer and a zero count.
    Array(Vec<Member>),
    /// An object, written as a pointer to a block of its fields in order.
    Object(Vec<(String, Member)>),
}

/// Writes [`Member`] trees into a [`DataWriter`], with strings collected in a
/// shared [`StringTable`].
///
/// Every pointer written for a string, array or object is labeled with the
/// path of the member it came from, like `root.items[2].name`.
///
/// # Example
///
/// ```
/// use blockstream::{member::{Member, MemberWriter}, rancor::Error};
///
/// let weapon = |name: &str| {
///     Member::Object(vec![
///         ("name".into(), Member::String(name.into())),
///         ("damage".into(), Member::U32(12)),
///     ])
/// };
/// let root = Member::Object(vec![
///     ("left".into(), weapon("épée")),
///     ("right".into(), weapon("épée")),
/// ]);
///
/// let mut writer = MemberWriter::default();
/// writer.write_root::<Error>(&root).unwrap();
/// let (_, finalized, strings) = writer.into_bytes::<Error>().unwrap();
///
/// // Both weapons collapse into one block.
/// assert_eq!(finalized.blocks_collapsed(), 1);
/// assert!(finalized.is_complete());
/// assert!(strings.is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemberWriter {
    stream: DataWriter,
    strings: StringTable,
}

impl MemberWriter {
    /// Creates a writer for the given format.
    pub fn new(format: Format) -> Self {
        Self {
            stream: DataWriter::new(format),
            strings: StringTable::new(),
        }
    }

    /// Returns the underlying stream.
    #[inline]
    pub fn stream(&self) -> &DataWriter {
        &self.stream
    }

    /// Returns the underlying stream mutably, for writing blocks by hand.
    #[inline]
    pub fn stream_mut(&mut self) -> &mut DataWriter {
        &mut self.stream
    }

    /// Returns the string table.
    #[inline]
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Writes `root` as the root block of the stream and returns its
    /// reference.
    ///
    /// The fields of an object root are written directly into the root
    /// block. Any other root is written as the root block's only value.
    ///
    /// # Panics
    ///
    /// Panics if a block has already been written to the stream.
    pub fn write_root<E: Source>(
        &mut self,
        root: &Member,
    ) -> Result<StreamReference, E> {
        assert_eq!(
            self.stream.block_count(),
            0,
            "the root must be the first block of the stream"
        );

        let reference = self.stream.begin_block(4);
        self.stream.label(reference, "root");
        match root {
            Member::Object(fields) => self.write_fields::<E>("root", fields)?,
            value => self.write_value::<E>("root", value)?,
        }
        self.stream.end_block();
        Ok(reference)
    }

    /// Writes the string table and finalizes the stream into `writer`.
    ///
    /// Returns the reference of the string table's main block alongside the
    /// finalized stream, or `None` if no strings were written. Its offset is
    /// available through [`Finalized::offset_of`].
    pub fn finish<W, E>(
        mut self,
        writer: &mut W,
    ) -> Result<(Finalized, Option<StreamReference>), E>
    where
        W: Seek<E> + ?Sized,
        E: Source,
    {
        let table = if self.strings.is_empty() {
            None
        } else {
            Some(self.strings.write::<E>(&mut self.stream)?)
        };
        let finalized = self.stream.finalize(writer)?;
        Ok((finalized, table))
    }

    /// Writes the string table and finalizes the stream into a new byte
    /// vector.
    pub fn into_bytes<E: Source>(
        self,
    ) -> Result<(Vec<u8>, Finalized, Option<StreamReference>), E> {
        let mut writer = VecWriter::new();
        let (finalized, table) = self.finish::<_, E>(&mut writer)?;
        Ok((writer.into_inner(), finalized, table))
    }

    fn write_fields<E: Source>(
        &mut self,
        path: &str,
        fields: &[(String, Member)],
    ) -> Result<(), E> {
        for (name, value) in fields {
            self.write_value::<E>(&format!("{path}.{name}"), value)?;
        }
        Ok(())
    }

    fn write_primitive<P: Primitive>(&mut self, value: P) {
        self.stream.write_aligned(value);
    }

    fn write_pointer(&mut self, reference: StreamReference) {
        let size = self.stream.format().pointer_size();
        self.stream.align(size);
        self.stream.write_reference(reference);
    }

    fn write_value<E: Source>(
        &mut self,
        path: &str,
        value: &Member,
    ) -> Result<(), E> {
        match value {
            Member::Null => self.write_pointer(StreamReference::EMPTY),
            Member::Bool(v) => self.write_primitive(*v),
            Member::I8(v) => self.write_primitive(*v),
            Member::U8(v) => self.write_primitive(*v),
            Member::I16(v) => self.write_primitive(*v),
            Member::U16(v) => self.write_primitive(*v),
            Member::I32(v) => self.write_primitive(*v),
            Member::U32(v) => self.write_primitive(*v),
            Member::I64(v) => self.write_primitive(*v),
            Member::U64(v) => self.write_primitive(*v),
            Member::F32(v) => self.write_primitive(*v),
            Member::F64(v) => self.write_primitive(*v),
            Member::String(s) => {
                let index = self.strings.add(&mut self.stream, s);
                let reference = self.strings.reference_of(index);
                let size = self.stream.format().pointer_size();
                self.stream.align(size);
                self.stream.write_string_reference(
                    reference,
                    self.strings.byte_len(index),
                    self.strings.char_len(index),
                );
                // Shared strings report the first path they were seen at.
                if self.stream.label_of(reference).is_none() {
                    self.stream.label(reference, path);
                }
            }
            Member::Array(items) if items.is_empty() => {
                self.write_pointer(StreamReference::EMPTY);
                self.stream.write(0u32);
            }
            Member::Array(items) => {
                let child = self.stream.reserve();
                self.write_pointer(child);
                self.stream.write(items.len() as u32);
                self.stream.label(child, path);

                self.stream.begin_block_with::<E>(child, 4)?;
                for (i, item) in items.iter().enumerate() {
                    self.write_value::<E>(&format!("{path}[{i}]"), item)?;
                }
                self.stream.end_block();
            }
            Member::Object(fields) => {
                let child = self.stream.reserve();
                self.write_pointer(child);
                self.stream.label(child, path);

                self.stream.begin_block_with::<E>(child, 4)?;
                self.write_fields::<E>(path, fields)?;
                self.stream.end_block();
            }
        }
        Ok(())
    }
}
