//! Content hashing of blocks.

use core::fmt;

use md5::{Digest, Md5};

/// A 128-bit content digest of a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash([u8; 16]);

impl BlockHash {
    /// Returns the raw digest bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// An incremental MD5 hasher producing [`BlockHash`]es.
#[derive(Clone, Default)]
pub struct BlockHasher {
    inner: Md5,
}

impl BlockHasher {
    /// Creates an empty hasher.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes into the hasher.
    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.inner, bytes);
    }

    /// Consumes the hasher and returns the digest.
    #[inline]
    pub fn finish(self) -> BlockHash {
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&self.inner.finalize());
        BlockHash(digest)
    }
}

/// 32-bit FNV-1a, used to order string tables.
#[inline]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ b as u32).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_empty_input() {
        assert_eq!(
            BlockHasher::new().finish().to_string(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut split = BlockHasher::new();
        split.update(b"block");
        split.update(b"stream");

        let mut whole = BlockHasher::new();
        whole.update(b"blockstream");

        let hash = split.finish();
        assert_eq!(hash, whole.finish());
        assert_eq!(&hash.as_bytes()[..4], &[0xe7, 0xd2, 0x3b, 0xe4]);
    }

    #[test]
    fn fnv_known_values() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
    }
}
