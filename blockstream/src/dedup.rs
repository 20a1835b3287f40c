//! Fixed-point collapse of content-identical blocks.
//!
//! Collapsing a duplicate rewrites the pointer slots of every block that
//! pointed at it, which changes their content hashes and can expose new
//! duplicates. Rounds are repeated until one finds nothing to collapse.

use hashbrown::{hash_map::Entry, HashMap};
use tracing::debug;

use crate::{
    block::DataBlock, format::Format, hash::BlockHash,
    reference::StreamReference,
};

/// The outcome of [`deduplicate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collapse {
    /// Indices of the surviving blocks, in creation order.
    pub live: Vec<usize>,
    /// Every collapsed block reference paired with the reference of the block
    /// that finally replaced it, in collapse order.
    pub aliases: Vec<(StreamReference, StreamReference)>,
    /// The number of hashing rounds, including the final one that found
    /// nothing.
    pub rounds: usize,
}

impl Collapse {
    /// Returns the number of blocks that were collapsed into a survivor.
    #[inline]
    pub fn collapsed(&self) -> usize {
        self.aliases.len()
    }
}

/// Collapses content-identical blocks among those at `indices` until none
/// remain. `indices` must be in ascending order.
///
/// Blocks are visited in index order and the first block with a given hash
/// survives, so the result only depends on the order blocks were created in.
/// Survivors take over the stricter alignment and the markers of the blocks
/// they replace, and every surviving pointer slot that targeted a collapsed
/// block is redirected to its survivor. Blocks outside `indices` are left
/// untouched.
pub fn deduplicate(
    blocks: &mut [DataBlock],
    indices: Vec<usize>,
    format: &Format,
) -> Collapse {
    debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));

    let mut live = indices;
    let mut aliases = Vec::new();
    let mut rounds = 0;

    loop {
        rounds += 1;

        let mut seen = HashMap::<BlockHash, usize>::with_capacity(live.len());
        let mut duplicates = Vec::new();
        live.retain(|&index| {
            let hash = blocks[index].content_hash();
            match seen.entry(hash) {
                Entry::Vacant(entry) => {
                    entry.insert(index);
                    true
                }
                Entry::Occupied(entry) => {
                    duplicates.push((*entry.get(), index));
                    false
                }
            }
        });

        debug!(
            round = rounds,
            collapsed = duplicates.len(),
            live = live.len(),
            "deduplication round",
        );

        if duplicates.is_empty() {
            break;
        }

        let mut renames = HashMap::with_capacity(duplicates.len());
        for &(survivor, duplicate) in &duplicates {
            let (head, tail) = blocks.split_at_mut(duplicate);
            head[survivor].absorb(&tail[0]);

            let old = tail[0].reference();
            let new = head[survivor].reference();
            renames.insert(old, new);
            aliases.push((old, new));
        }

        for &index in &live {
            blocks[index].replace_references(format, &renames);
        }
    }

    Collapse {
        live,
        aliases: flatten(aliases),
        rounds,
    }
}

// A survivor of one round can be collapsed in a later round, so chains are
// followed to their final survivor.
fn flatten(
    aliases: Vec<(StreamReference, StreamReference)>,
) -> Vec<(StreamReference, StreamReference)> {
    let direct = aliases.iter().copied().collect::<HashMap<_, _>>();
    aliases
        .into_iter()
        .map(|(old, mut new)| {
            while let Some(&next) = direct.get(&new) {
                new = next;
            }
            (old, new)
        })
        .collect()
}
