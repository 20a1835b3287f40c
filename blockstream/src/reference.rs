//! Logical pointer targets.

use core::fmt;

/// An opaque handle to a block of data that will exist somewhere in the final
/// stream.
///
/// References are handed out before their block has any content, so they can
/// be written as pointers ahead of the block they name. Two references are
/// equal if and only if their ids are equal.
///
/// [`StreamReference::EMPTY`] is the null reference. Pointer slots that target
/// it are written as `0` and never appear in the relocation table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamReference(u32);

impl StreamReference {
    /// The null reference.
    pub const EMPTY: Self = Self(0);

    /// Returns the raw id of the reference.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns whether this is the null reference.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for StreamReference {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for StreamReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for StreamReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "#empty")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Hands out unique references in increasing order.
///
/// Every [`DataWriter`](crate::DataWriter) owns one, so references are only
/// unique within the writer that created them.
#[derive(Debug)]
pub struct ReferenceAllocator {
    next: u32,
}

impl ReferenceAllocator {
    /// Creates an allocator whose first reference has id 1.
    #[inline]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns a fresh reference.
    ///
    /// # Panics
    ///
    /// Panics if the 32-bit id space is exhausted.
    #[inline]
    pub fn allocate(&mut self) -> StreamReference {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .unwrap_or_else(|| panic!("stream reference ids exhausted"));
        StreamReference(id)
    }

    /// Returns how many references have been handed out.
    #[inline]
    pub fn allocated(&self) -> usize {
        (self.next - 1) as usize
    }
}

impl Default for ReferenceAllocator {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_monotonic() {
        let mut refs = ReferenceAllocator::new();
        let a = refs.allocate();
        let b = refs.allocate();

        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert!(a < b);
        assert_eq!(refs.allocated(), 2);
    }

    #[test]
    fn empty_is_never_allocated() {
        let mut refs = ReferenceAllocator::new();
        for _ in 0..64 {
            assert!(!refs.allocate().is_empty());
        }
        assert!(StreamReference::EMPTY.is_empty());
        assert_eq!(StreamReference::default(), StreamReference::EMPTY);
    }

    #[test]
    fn display() {
        let mut refs = ReferenceAllocator::new();
        assert_eq!(refs.allocate().to_string(), "#1");
        assert_eq!(StreamReference::EMPTY.to_string(), "#empty");
    }
}
