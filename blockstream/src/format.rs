//! Byte order and pointer width of an emitted stream.
//!
//! A stream is written for one target runtime: all primitives use the
//! stream's [`Endian`] and every pointer slot is [`PointerWidth`] bytes wide.
//! The defaults are little-endian with 32-bit pointers and can be changed at
//! compile time with the `big_endian` and `pointer_width_64` features.

use core::mem::{size_of, transmute};

use rend::{
    f32_be, f32_le, f64_be, f64_le, i16_be, i16_le, i32_be, i32_le, i64_be,
    i64_le, u16_be, u16_le, u32_be, u32_le, u64_be, u64_le,
};

/// The byte order of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Default for Endian {
    #[inline]
    fn default() -> Self {
        if cfg!(feature = "big_endian") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// The width of a pointer slot in a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    /// 32-bit offsets.
    W32,
    /// 64-bit offsets.
    W64,
}

impl PointerWidth {
    /// Returns the size of a pointer slot in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Returns the largest offset a pointer slot can hold.
    #[inline]
    pub const fn max_offset(self) -> u64 {
        match self {
            Self::W32 => u32::MAX as u64,
            Self::W64 => u64::MAX,
        }
    }
}

impl Default for PointerWidth {
    #[inline]
    fn default() -> Self {
        if cfg!(feature = "pointer_width_64") {
            Self::W64
        } else {
            Self::W32
        }
    }
}

/// The binary layout parameters of a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Format {
    /// The byte order of primitives and pointers.
    pub endian: Endian,
    /// The width of pointer slots.
    pub pointer_width: PointerWidth,
}

impl Format {
    /// Little-endian with 32-bit pointers.
    pub const LITTLE_32: Self = Self::new(Endian::Little, PointerWidth::W32);
    /// Little-endian with 64-bit pointers.
    pub const LITTLE_64: Self = Self::new(Endian::Little, PointerWidth::W64);
    /// Big-endian with 32-bit pointers.
    pub const BIG_32: Self = Self::new(Endian::Big, PointerWidth::W32);
    /// Big-endian with 64-bit pointers.
    pub const BIG_64: Self = Self::new(Endian::Big, PointerWidth::W64);

    /// Creates a format from its parts.
    #[inline]
    pub const fn new(endian: Endian, pointer_width: PointerWidth) -> Self {
        Self {
            endian,
            pointer_width,
        }
    }

    /// Returns the size of a pointer slot in bytes.
    #[inline]
    pub const fn pointer_size(&self) -> usize {
        self.pointer_width.size()
    }

    /// Returns the format flags stored in a stream header.
    ///
    /// Bit 0 is set for big-endian streams and bit 1 for 64-bit pointers.
    #[inline]
    pub const fn flags(&self) -> u32 {
        let mut flags = 0;
        if matches!(self.endian, Endian::Big) {
            flags |= 1;
        }
        if matches!(self.pointer_width, PointerWidth::W64) {
            flags |= 2;
        }
        flags
    }

    /// Recovers a format from header flags.
    #[inline]
    pub const fn from_flags(flags: u32) -> Self {
        let endian = if flags & 1 != 0 {
            Endian::Big
        } else {
            Endian::Little
        };
        let pointer_width = if flags & 2 != 0 {
            PointerWidth::W64
        } else {
            PointerWidth::W32
        };
        Self::new(endian, pointer_width)
    }

    /// Encodes a primitive into `out`, which must be exactly `P::SIZE` bytes.
    #[inline]
    pub fn encode<P: Primitive>(&self, value: P, out: &mut [u8]) {
        value.encode(self.endian, out);
    }

    /// Decodes a primitive from `bytes`, which must be exactly `P::SIZE`
    /// bytes.
    #[inline]
    pub fn decode<P: Primitive>(&self, bytes: &[u8]) -> P {
        P::decode(self.endian, bytes)
    }

    /// Encodes a pointer value into `out`, which must be exactly
    /// [`pointer_size`](Self::pointer_size) bytes.
    ///
    /// The caller is responsible for `value` fitting in the pointer width.
    #[inline]
    pub fn encode_pointer(&self, value: u64, out: &mut [u8]) {
        match self.pointer_width {
            PointerWidth::W32 => {
                debug_assert!(value <= u32::MAX as u64);
                self.encode(value as u32, out)
            }
            PointerWidth::W64 => self.encode(value, out),
        }
    }

    /// Decodes a pointer value from `bytes`.
    #[inline]
    pub fn decode_pointer(&self, bytes: &[u8]) -> u64 {
        match self.pointer_width {
            PointerWidth::W32 => self.decode::<u32>(bytes) as u64,
            PointerWidth::W64 => self.decode::<u64>(bytes),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width value that can be written into a block.
///
/// Every primitive must be written at a block offset that is a multiple of
/// its size.
pub trait Primitive: Copy + sealed::Sealed {
    /// The encoded size and required alignment of the primitive.
    const SIZE: usize;

    /// Encodes the value into `out` with the given byte order.
    fn encode(self, endian: Endian, out: &mut [u8]);

    /// Decodes a value from `bytes` with the given byte order.
    fn decode(endian: Endian, bytes: &[u8]) -> Self;
}

macro_rules! impl_byte {
    ($ty:ty) => {
        impl sealed::Sealed for $ty {}

        impl Primitive for $ty {
            const SIZE: usize = 1;

            #[inline]
            fn encode(self, _: Endian, out: &mut [u8]) {
                out[0] = self as u8;
            }

            #[inline]
            fn decode(_: Endian, bytes: &[u8]) -> Self {
                bytes[0] as $ty
            }
        }
    };
}

impl_byte!(u8);
impl_byte!(i8);

impl sealed::Sealed for bool {}

impl Primitive for bool {
    const SIZE: usize = 1;

    #[inline]
    fn encode(self, _: Endian, out: &mut [u8]) {
        out[0] = self as u8;
    }

    #[inline]
    fn decode(_: Endian, bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

macro_rules! impl_endian {
    ($ty:ty, $le:ty, $be:ty) => {
        impl sealed::Sealed for $ty {}

        impl Primitive for $ty {
            const SIZE: usize = size_of::<$ty>();

            #[inline]
            fn encode(self, endian: Endian, out: &mut [u8]) {
                type Bytes = [u8; size_of::<$ty>()];

                // SAFETY: rend's endian types are plain containers with the
                // same size as their native type and no padding.
                let bytes = unsafe {
                    match endian {
                        Endian::Little => {
                            transmute::<$le, Bytes>(<$le>::from_native(self))
                        }
                        Endian::Big => {
                            transmute::<$be, Bytes>(<$be>::from_native(self))
                        }
                    }
                };
                out.copy_from_slice(&bytes);
            }

            #[inline]
            fn decode(endian: Endian, bytes: &[u8]) -> Self {
                type Bytes = [u8; size_of::<$ty>()];

                let mut raw: Bytes = [0; size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                // SAFETY: every bit pattern is a valid value of the endian
                // types, which have the same size as `raw`.
                unsafe {
                    match endian {
                        Endian::Little => {
                            transmute::<Bytes, $le>(raw).to_native()
                        }
                        Endian::Big => transmute::<Bytes, $be>(raw).to_native(),
                    }
                }
            }
        }
    };
}

impl_endian!(u16, u16_le, u16_be);
impl_endian!(i16, i16_le, i16_be);
impl_endian!(u32, u32_le, u32_be);
impl_endian!(i32, i32_le, i32_be);
impl_endian!(u64, u64_le, u64_be);
impl_endian!(i64, i64_le, i64_be);
impl_endian!(f32, f32_le, f32_be);
impl_endian!(f64, f64_le, f64_be);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order() {
        let mut out = [0u8; 4];

        Format::LITTLE_32.encode(0x0102_0304u32, &mut out);
        assert_eq!(out, [4, 3, 2, 1]);

        Format::BIG_32.encode(0x0102_0304u32, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(Format::BIG_32.decode::<u32>(&out), 0x0102_0304);
    }

    #[test]
    fn floats_keep_their_bits() {
        let mut out = [0u8; 8];
        Format::BIG_64.encode(-1.5f64, &mut out);
        assert_eq!(out, (-1.5f64).to_be_bytes());
        assert_eq!(Format::BIG_64.decode::<f64>(&out), -1.5);
    }

    #[test]
    fn pointers_follow_width() {
        let mut narrow = [0u8; 4];
        Format::LITTLE_32.encode_pointer(0x40, &mut narrow);
        assert_eq!(narrow, [0x40, 0, 0, 0]);

        let mut wide = [0u8; 8];
        Format::BIG_64.encode_pointer(0x40, &mut wide);
        assert_eq!(wide, [0, 0, 0, 0, 0, 0, 0, 0x40]);
        assert_eq!(Format::BIG_64.decode_pointer(&wide), 0x40);
    }

    #[test]
    fn flags_roundtrip() {
        for format in [
            Format::LITTLE_32,
            Format::LITTLE_64,
            Format::BIG_32,
            Format::BIG_64,
        ] {
            assert_eq!(Format::from_flags(format.flags()), format);
        }
    }
}
