//! # blockstream
//!
//! blockstream writes object graphs as a single relocatable byte stream,
//! collapsing every piece of data that appears more than once.
//!
//! ## Design
//!
//! A stream is built out of blocks. Each object, array or compound value is
//! written into its own [`DataBlock`], and blocks point at each other through
//! [`StreamReference`]s. References are handed out before the block they name
//! has any content, so forward pointers and cycles are written the same way as
//! backward pointers.
//!
//! When the stream is finalized, blocks with identical content are collapsed
//! into one. Collapsing a block redirects every pointer to it, which can make
//! the blocks holding those pointers identical in turn, so collapsing runs to a
//! fixed point. The surviving blocks are then laid out one after another behind
//! a small header, every pointer is patched with the offset of its target, and
//! the offsets of all non-null pointers are collected into a relocation table.
//!
//! The output is meant to be loaded with a single read: a loader adds its base
//! address to every pointer listed in the relocation table and the data is
//! ready to use. Offset 0 always belongs to the header, so a zero pointer is
//! always null.
//!
//! Blocks can be grouped into data units. Collapsing never crosses a unit
//! boundary, and each unit is written as one contiguous, 16-byte aligned run
//! whose signature, offset and length are reported after finalizing.
//!
//! ## Features
//!
//! - `big_endian`: Writes big-endian streams by default
//! - `pointer_width_64`: Writes 64-bit pointers by default
//!
//! Both defaults can be overridden per stream with [`Format`].
//!
//! ## Examples
//!
//! See [`DataWriter`] for building streams block by block, and
//! [`member::MemberWriter`] for writing whole value trees.

pub mod api;
pub mod block;
pub mod context;
pub mod dedup;
mod finalize;
pub mod format;
pub mod hash;
pub mod layout;
pub mod member;
pub mod reference;
pub mod ser;
mod stream;
pub mod strings;
#[cfg(test)]
mod test;

pub use ::rancor;

#[doc(inline)]
pub use self::{
    block::DataBlock,
    context::StreamContext,
    finalize::{DataUnit, Finalized, Unresolved},
    format::{Endian, Format, PointerWidth, Primitive},
    reference::StreamReference,
    stream::DataWriter,
};
