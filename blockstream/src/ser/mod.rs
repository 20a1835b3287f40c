//! Output sinks for finalized streams.

pub mod writer;

#[doc(inline)]
pub use self::writer::{Positional, Seek, Writer, WriterExt};
